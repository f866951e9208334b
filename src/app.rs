//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads or simulates transients
//! - estimates cursors and runs the fit engine
//! - prints reports
//! - writes optional exports

use clap::Parser;
use log::{debug, info, warn};

use crate::cli::{Command, CursorArgs, FitArgs, SimulateArgs};
use crate::domain::{GlobalFitParams, TransientWindow};
use crate::error::AppError;
use crate::heuristics::{CursorEstimate, CursorStatus, DefaultEstimator, Estimator, estimate_cursors};
use crate::images::fitted_value_image;
use crate::math::normalized_irf;
use crate::io::{ReportFile, write_report_json, write_transient_json, write_value_image_csv};

pub mod pipeline;

/// Entry point for the `flim` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Cursors(args) => handle_cursors(args),
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_cursors(args: CursorArgs) -> Result<(), AppError> {
    let input = pipeline::load_input(&args.input, 1, 1)?;
    let decay = input.image.summed();
    let estimate = estimate_cursors(input.x_inc, input.prompt.as_deref(), &decay, args.chi_square_target)?;
    println!("{}", crate::report::format_cursor_summary(&estimate, input.x_inc));
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let run = pipeline::run_fit(&args)?;

    println!("{}", crate::report::format_cursor_summary(&run.cursors, run.global.x_inc));
    println!("{}", crate::report::format_fit_report(&run.report, &run.global));

    // Optional exports.
    if let Some(path) = &args.export {
        let file = ReportFile::new(run.global.clone(), Some(run.cursors), run.report.clone());
        write_report_json(path, &file)?;
        info!("wrote report to {}", path.display());
    }
    if let Some(path) = &args.export_image {
        let values = fitted_value_image(&run.report, run.image.width(), run.image.height(), args.image_value)?;
        write_value_image_csv(path, &values, run.image.width())?;
        info!("wrote {} image to {}", args.image_value.label(), path.display());
    }

    let summary = run.report.summary;
    if summary.fitted + summary.unconverged == 0 {
        return Err(if summary.skipped == summary.total() {
            AppError::new(3, "No unit had enough photons to fit.")
        } else {
            AppError::new(4, "No unit could be fitted.")
        });
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let file = pipeline::simulate_input(&args.simulation, 1, 1)?;
    write_transient_json(&args.output, &file)?;
    println!(
        "Wrote {} bins ({} ns/bin) to {}",
        file.decay.len(),
        file.x_inc,
        args.output.display()
    );
    Ok(())
}

/// Build image-wide fit settings from the CLI and the cursor estimate.
///
/// An explicit `--window` replaces the estimated decay window; the prompt is
/// only used when both the decay and the prompt window hold signal.
pub fn global_params_from_args(
    args: &FitArgs,
    x_inc: f64,
    bins: usize,
    prompt: Option<Vec<f64>>,
    cursors: &CursorEstimate,
) -> Result<GlobalFitParams, AppError> {
    let window = match args.window.as_deref() {
        Some(&[start, data, stop]) => TransientWindow::new(start, data, stop),
        Some(_) => {
            return Err(AppError::new(
                2,
                "--window expects transient_start,data_start,transient_stop",
            ));
        }
        None if cursors.status == CursorStatus::NoSignal => TransientWindow::full(bins),
        None => cursors.window(),
    };

    let mut global = DefaultEstimator.global_params(args.function, x_inc, bins);
    global.window = window;
    global.algorithm = args.algorithm;
    global.noise_model = args.noise;
    global.threshold = args.threshold;
    global.chi_square_target = args.chi_square_target;
    global.parameters = args.params.clone();

    let count = args.function.param_count();
    if let Some(&bad) = args.fixed.iter().find(|&&i| i >= count) {
        return Err(AppError::new(
            2,
            format!("--fixed index {bad} out of range for {count} parameters"),
        ));
    }
    global.free = (0..count).map(|i| !args.fixed.contains(&i)).collect();

    if let Some(prompt) = prompt {
        let window = cursors.prompt_window();
        if cursors.status == CursorStatus::NoSignal {
            debug!("decay has no signal; fitting without the prompt");
        } else if normalized_irf(&prompt, window, cursors.prompt_baseline).is_none() {
            warn!("prompt has no signal in bins {}..{}; fitting without it", window.start, window.stop);
        } else {
            global.prompt = Some(prompt);
            global.prompt_window = window;
            global.prompt_baseline = cursors.prompt_baseline;
        }
    }

    global.validate(bins)?;
    Ok(global)
}
