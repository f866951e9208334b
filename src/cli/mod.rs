//! Command-line parsing for the lifetime fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code; `app` maps the parsed arguments into `GlobalFitParams`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{FitAlgorithm, FitFunction, FitRegion, NoiseModel};
use crate::images::FittedValue;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "flim", version, about = "Fluorescence lifetime curve fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate prompt and decay cursors for a transient.
    Cursors(CursorArgs),
    /// Fit a transient or a synthetic image and print the results.
    Fit(FitArgs),
    /// Write a synthetic transient as JSON (input for `cursors` / `fit`).
    Simulate(SimulateArgs),
}

/// Where the data comes from: a JSON transient file, or a simulation.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Transient JSON written by `flim simulate` (simulates when absent).
    #[arg(short, long, value_name = "JSON")]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub simulation: SimulationArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SimulationArgs {
    /// Function used to simulate data.
    #[arg(long, value_enum, default_value_t = FitFunction::Single)]
    pub sim_function: FitFunction,

    /// True parameters in vector order, comma separated (e.g. `1000,2.5,2`).
    #[arg(long, value_delimiter = ',', default_value = "1000,2.5,2")]
    pub sim_params: Vec<f64>,

    /// Number of time bins.
    #[arg(long, default_value_t = 256)]
    pub bins: usize,

    /// Bin width (ns).
    #[arg(long, default_value_t = 0.048828125)]
    pub x_inc: f64,

    /// Bin where the excitation arrives.
    #[arg(long, default_value_t = 30)]
    pub onset: usize,

    /// Gaussian prompt width (bins).
    #[arg(long, default_value_t = 2.0)]
    pub prompt_sigma: f64,

    /// Simulate an ideal pulse without a recorded prompt.
    #[arg(long)]
    pub no_prompt: bool,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Args, Clone)]
pub struct CursorArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Reduced chi-square the trial fit must reach.
    #[arg(long, default_value_t = 1.5)]
    pub chi_square_target: f64,
}

/// Options for fitting.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Fitted model.
    #[arg(short, long, value_enum, default_value_t = FitFunction::Single)]
    pub function: FitFunction,

    #[arg(short, long, value_enum, default_value_t = FitAlgorithm::RldLma)]
    pub algorithm: FitAlgorithm,

    #[arg(long, value_enum, default_value_t = NoiseModel::PoissonData)]
    pub noise: NoiseModel,

    #[arg(long, value_enum, default_value_t = FitRegion::Summed)]
    pub region: FitRegion,

    /// Starting parameters (comma separated); estimated from the data when absent.
    #[arg(long, value_delimiter = ',')]
    pub params: Option<Vec<f64>>,

    /// Parameter indices to hold fixed at their starting value (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub fixed: Vec<usize>,

    /// Minimum photons for a unit to be fitted.
    #[arg(long, default_value_t = 100.0)]
    pub threshold: f64,

    #[arg(long, default_value_t = 1.5)]
    pub chi_square_target: f64,

    /// Override cursors as `transient_start,data_start,transient_stop`.
    #[arg(long, value_delimiter = ',')]
    pub window: Option<Vec<usize>>,

    /// Ignore the prompt even when one is available.
    #[arg(long)]
    pub ignore_prompt: bool,

    /// Image width for simulated `each` / `point` / `roi` fits.
    #[arg(long, default_value_t = 1)]
    pub width: usize,

    /// Image height for simulated fits.
    #[arg(long, default_value_t = 1)]
    pub height: usize,

    /// Pixel for `--region point`, as `x,y`.
    #[arg(long, value_delimiter = ',')]
    pub pixel: Option<Vec<usize>>,

    /// Spatial binning applied before fitting (none, 3x3, 5x5, 7x7).
    #[arg(long, default_value = "none")]
    pub binning: String,

    /// Worker threads for `each` fits (defaults to all cores).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Maximum LMA iterations.
    #[arg(long, default_value_t = 100)]
    pub max_iterations: usize,

    /// Export the fit report to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export a per-pixel value image to CSV (`each` fits).
    #[arg(long = "export-image", value_name = "CSV")]
    pub export_image: Option<PathBuf>,

    /// Value written by `--export-image`: `mean-lifetime`, `chi-square`,
    /// `fraction:<i>` or `param:<i>`.
    #[arg(long, default_value = "mean-lifetime", value_parser = parse_fitted_value)]
    pub image_value: FittedValue,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub simulation: SimulationArgs,

    /// Output JSON path.
    #[arg(short, long, value_name = "JSON")]
    pub output: PathBuf,
}

/// Parse `--image-value`.
pub fn parse_fitted_value(s: &str) -> Result<FittedValue, String> {
    let index = |v: &str| v.parse::<usize>().map_err(|e| format!("invalid index '{v}': {e}"));
    match s.split_once(':') {
        None if s == "mean-lifetime" => Ok(FittedValue::MeanLifetime),
        None if s == "chi-square" => Ok(FittedValue::ChiSquare),
        Some(("param", i)) => Ok(FittedValue::Parameter(index(i)?)),
        Some(("fraction", i)) => {
            let i = index(i)?;
            if i == 0 {
                return Err("fractions are numbered from 1".to_string());
            }
            Ok(FittedValue::FractionalIntensity(i - 1))
        }
        _ => Err(format!(
            "unknown value '{s}' (expected mean-lifetime, chi-square, fraction:<i>, param:<i>)"
        )),
    }
}
