//! Shared "fit pipeline" logic used by the CLI subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load/simulate -> bin -> estimate cursors -> build settings -> fit
//!
//! The subcommands can then focus on presentation and exports.

use log::{info, warn};

use crate::cli::{FitArgs, InputArgs, SimulationArgs};
use crate::data::{DecayImage, DecaySpec, simulate_decay, simulate_image};
use crate::domain::{FitInfo, GlobalFitParams};
use crate::error::AppError;
use crate::fit::{EngineConfig, FitEngine, FitReport, SolverConfig};
use crate::heuristics::{CursorEstimate, CursorStatus, estimate_cursors};
use crate::io::{TransientFile, read_transient_json};

/// Measurement to analyse.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub x_inc: f64,
    pub image: DecayImage,
    pub prompt: Option<Vec<f64>>,
    pub sigma: Option<Vec<f64>>,
}

/// All computed outputs of a single `flim fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub global: GlobalFitParams,
    pub cursors: CursorEstimate,
    pub image: DecayImage,
    pub report: FitReport,
}

pub fn simulation_spec(args: &SimulationArgs) -> DecaySpec {
    let mut spec = DecaySpec::new(args.sim_function, args.sim_params.clone(), args.bins, args.x_inc);
    spec.onset = args.onset;
    spec.prompt_sigma = (!args.no_prompt).then_some(args.prompt_sigma);
    spec.seed = args.seed;
    spec
}

/// Simulate a transient file (one pixel, or `width × height`).
pub fn simulate_input(args: &SimulationArgs, width: usize, height: usize) -> Result<TransientFile, AppError> {
    let spec = simulation_spec(args);
    let single = simulate_decay(&spec)?;
    let mut file = TransientFile::single(spec.x_inc, single.decay, single.prompt);
    if width * height > 1 {
        let image = simulate_image(&spec, width, height)?;
        file.decay = (0..image.pixel_count())
            .flat_map(|i| image.transient_at(i).to_vec())
            .collect();
        file.width = width;
        file.height = height;
    }
    Ok(file)
}

/// Read the input file, or simulate one.
pub fn load_input(args: &InputArgs, width: usize, height: usize) -> Result<LoadedInput, AppError> {
    let file = match &args.input {
        Some(path) => {
            info!("reading transient from {}", path.display());
            read_transient_json(path)?
        }
        None => {
            info!("simulating {}x{} image", width, height);
            simulate_input(&args.simulation, width, height)?
        }
    };
    Ok(LoadedInput {
        x_inc: file.x_inc,
        image: file.to_image()?,
        prompt: file.prompt,
        sigma: file.sigma,
    })
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(args: &FitArgs) -> Result<FitRun, AppError> {
    // 1) Load or simulate the data.
    let input = load_input(&args.input, args.width, args.height)?;

    // 2) Bin spatially.
    let engine = FitEngine::new(EngineConfig {
        threads: args.threads,
        solver: SolverConfig {
            max_iterations: args.max_iterations,
            ..SolverConfig::default()
        },
    })?;
    let image = engine.bin(&input.image, &args.binning)?;

    // 3) Propose cursors from the summed decay.
    let prompt = if args.ignore_prompt { None } else { input.prompt };
    let summed = image.summed();
    let cursors = estimate_cursors(input.x_inc, prompt.as_deref(), &summed, args.chi_square_target)?;
    match cursors.status {
        CursorStatus::NoSignal => warn!("summed decay has no usable signal; fitting the full histogram"),
        CursorStatus::Unconverged => warn!(
            "no data start met chi2 target {}; using bin {}",
            args.chi_square_target, cursors.data_start
        ),
        CursorStatus::Converged => {}
    }

    // 4) Build settings and the request.
    let global = crate::app::global_params_from_args(args, input.x_inc, image.bins(), prompt, &cursors)?;
    let mut request = FitInfo::from_global(&global, args.region);
    request.sigma = input.sigma;
    if let Some(pixel) = &args.pixel {
        match pixel.as_slice() {
            &[x, y] => request = request.with_pixel(x, y),
            _ => return Err(AppError::new(2, "--pixel expects x,y")),
        }
    }

    // 5) Fit.
    let report = engine.fit(&global, &request, &image, None)?;

    Ok(FitRun {
        global,
        cursors,
        image,
        report,
    })
}
