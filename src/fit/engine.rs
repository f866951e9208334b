//! Region-aware fit orchestration.
//!
//! Responsibilities:
//!
//! - turn a `FitRegion` into fit units (summed image, ROIs, one pixel, every pixel)
//! - look up the fitter by name in the [`FitterRegistry`]
//! - run `Each` fits in parallel (rayon), honouring the cancellation token
//! - collect per-unit outcomes into a `FitReport`
//!
//! Implementation choices:
//! - the engine is an explicit context object; it owns its registries and an
//!   optional bounded thread pool, and holds no global state
//! - per-unit failures never abort a batch; only request-level errors
//!   (`InvalidInput`, `UnknownAlgorithm`) are returned as `Err`
//! - every `Each` task writes only its own slot of the collected vector

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::DecayImage;
use crate::domain::{FitAlgorithm, FitFunction, FitInfo, FitRegion, FitResult, GlobalFitParams};
use crate::error::FitError;
use crate::fit::fitter::{CurveFitter, FitProblem};
use crate::fit::lma::SolverConfig;
use crate::fit::registry::FitterRegistry;
use crate::math::normalized_irf;
use crate::models::InstrumentResponse;
use crate::preprocess::BinningRegistry;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Worker threads for `Each` fits; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    pub solver: SolverConfig,
}

/// Spatial unit a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitUnit {
    Summed,
    Roi(u32),
    Pixel { x: usize, y: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitOutcome {
    Fitted(FitResult),
    /// Iteration cap reached; best-effort parameters.
    Unconverged(FitResult),
    /// Below the photon threshold; not fitted.
    Skipped { photons: f64 },
    Failed { reason: String },
    Cancelled,
}

impl FitOutcome {
    /// Parameters of a fitted or unconverged unit.
    pub fn parameters(&self) -> Option<&[f64]> {
        self.result().map(|r| r.parameters.as_slice())
    }

    pub fn result(&self) -> Option<&FitResult> {
        match self {
            FitOutcome::Fitted(result) | FitOutcome::Unconverged(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub unit: FitUnit,
    pub outcome: FitOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitSummary {
    pub fitted: usize,
    pub unconverged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl FitSummary {
    pub fn from_units(units: &[UnitResult]) -> Self {
        let mut summary = Self::default();
        for unit in units {
            match unit.outcome {
                FitOutcome::Fitted(_) => summary.fitted += 1,
                FitOutcome::Unconverged(_) => summary.unconverged += 1,
                FitOutcome::Skipped { .. } => summary.skipped += 1,
                FitOutcome::Failed { .. } => summary.failed += 1,
                FitOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.fitted + self.unconverged + self.skipped + self.failed + self.cancelled
    }
}

/// Outcome of one `FitEngine::fit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub region: FitRegion,
    pub function: FitFunction,
    /// Row-major for `Each`, ascending label for `Roi`.
    pub units: Vec<UnitResult>,
    pub summary: FitSummary,
}

impl FitReport {
    fn new(region: FitRegion, function: FitFunction, units: Vec<UnitResult>) -> Self {
        let summary = FitSummary::from_units(&units);
        Self {
            region,
            function,
            units,
            summary,
        }
    }

    /// Outcome for a pixel of an `Each` or `Point` report.
    pub fn pixel(&self, x: usize, y: usize) -> Option<&FitOutcome> {
        self.units
            .iter()
            .find(|u| u.unit == FitUnit::Pixel { x, y })
            .map(|u| &u.outcome)
    }
}

pub struct FitEngine {
    fitters: FitterRegistry,
    binners: BinningRegistry,
    solver: SolverConfig,
    pool: Option<rayon::ThreadPool>,
}

impl FitEngine {
    /// Engine with the default fitter and binning registries.
    pub fn new(config: EngineConfig) -> Result<Self, FitError> {
        Self::with_registries(config, FitterRegistry::with_defaults(), BinningRegistry::with_defaults())
    }

    pub fn with_registries(
        config: EngineConfig,
        fitters: FitterRegistry,
        binners: BinningRegistry,
    ) -> Result<Self, FitError> {
        let pool = match config.threads {
            Some(0) => return Err(FitError::InvalidInput("thread count must be > 0".into())),
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| FitError::InvalidInput(format!("thread pool: {e}")))?,
            ),
            None => None,
        };
        Ok(Self {
            fitters,
            binners,
            solver: config.solver,
            pool,
        })
    }

    pub fn fitters(&self) -> &FitterRegistry {
        &self.fitters
    }

    pub fn binners(&self) -> &BinningRegistry {
        &self.binners
    }

    /// Apply a registered binning by name.
    pub fn bin(&self, image: &DecayImage, name: &str) -> Result<DecayImage, FitError> {
        self.binners.get(name)?.bin(image)
    }

    /// Fit a single transient.
    pub fn fit_transient(
        &self,
        global: &GlobalFitParams,
        info: &FitInfo,
        transient: &[f64],
    ) -> Result<FitResult, FitError> {
        global.validate(transient.len())?;
        let irf = prepare_irf(global)?;
        let fitter = self.fitters.create(info.algorithm.registry_name(), &self.solver)?;
        let problem = FitProblem::build(info, global.x_inc, irf.as_ref(), transient)?;
        fitter.fit(&problem, info.parameters.as_deref(), &info.free, &info.cancel)
    }

    /// Fit every unit of `info.region` in `image`.
    ///
    /// `previous` seeds each pixel of an `Each` fit when `info.refine_fit` is
    /// set.
    pub fn fit(
        &self,
        global: &GlobalFitParams,
        info: &FitInfo,
        image: &DecayImage,
        previous: Option<&FitReport>,
    ) -> Result<FitReport, FitError> {
        let bins = image.bins();
        global.validate(bins)?;
        info.validate(bins)?;
        let irf = prepare_irf(global)?;

        let refine = info.refine_fit && info.region == FitRegion::Each;
        let seeds = match previous {
            Some(report) if refine => Some(refine_seeds(report, info, image)?),
            _ => None,
        };
        // Refinement keeps the previous parameters, so skip the RLD re-seed.
        let algorithm = match (info.algorithm, &seeds) {
            (FitAlgorithm::RldLma, Some(_)) => FitAlgorithm::Lma,
            (algorithm, _) => algorithm,
        };
        let fitter = self.fitters.create(algorithm.registry_name(), &self.solver)?;
        let job = UnitJob {
            global,
            info,
            irf: irf.as_ref(),
            fitter: fitter.as_ref(),
        };

        info!(
            "fitting {:?} region of {}x{} image via {}",
            info.region,
            image.width(),
            image.height(),
            fitter.name()
        );

        let units = match info.region {
            FitRegion::Summed => vec![UnitResult {
                unit: FitUnit::Summed,
                outcome: job.run(&image.summed(), None),
            }],
            FitRegion::Roi => {
                let labels = image.roi_labels();
                if labels.is_empty() {
                    warn!("ROI fit requested but the image has no labelled pixels");
                }
                labels
                    .into_iter()
                    .map(|label| UnitResult {
                        unit: FitUnit::Roi(label),
                        outcome: job.run(&image.roi_sum(label), None),
                    })
                    .collect()
            }
            FitRegion::Point => {
                let (x, y) = info
                    .pixel
                    .ok_or_else(|| FitError::InvalidInput("point fit needs a pixel".into()))?;
                let transient = image.transient(x, y).ok_or_else(|| {
                    FitError::InvalidInput(format!(
                        "pixel ({x}, {y}) outside {}x{} image",
                        image.width(),
                        image.height()
                    ))
                })?;
                vec![UnitResult {
                    unit: FitUnit::Pixel { x, y },
                    outcome: job.run(transient, None),
                }]
            }
            FitRegion::Each => {
                let run = || {
                    (0..image.pixel_count())
                        .into_par_iter()
                        .map(|index| {
                            let (x, y) = image.coordinates(index);
                            let seed = seeds.as_ref().and_then(|s| s[index].as_deref());
                            UnitResult {
                                unit: FitUnit::Pixel { x, y },
                                outcome: job.run(image.transient_at(index), seed),
                            }
                        })
                        .collect::<Vec<_>>()
                };
                match &self.pool {
                    Some(pool) => pool.install(run),
                    None => run(),
                }
            }
        };

        let report = FitReport::new(info.region, info.function, units);
        debug!("fit summary: {:?}", report.summary);
        if report.summary.cancelled > 0 {
            info!(
                "fit cancelled: {} of {} units left unfitted",
                report.summary.cancelled,
                report.summary.total()
            );
        }
        Ok(report)
    }
}

impl std::fmt::Debug for FitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitEngine")
            .field("fitters", &self.fitters.names().collect::<Vec<_>>())
            .field("binners", &self.binners)
            .field("solver", &self.solver)
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

/// Shared, read-only state of one batch.
struct UnitJob<'a> {
    global: &'a GlobalFitParams,
    info: &'a FitInfo,
    irf: Option<&'a InstrumentResponse>,
    fitter: &'a dyn CurveFitter,
}

impl UnitJob<'_> {
    fn run(&self, transient: &[f64], seed: Option<&[f64]>) -> FitOutcome {
        if self.info.cancel.is_cancelled() {
            return FitOutcome::Cancelled;
        }
        let problem = match FitProblem::build(self.info, self.global.x_inc, self.irf, transient) {
            Ok(problem) => problem,
            Err(FitError::DegenerateInput { photons, .. }) => return FitOutcome::Skipped { photons },
            Err(err) => return FitOutcome::Failed { reason: err.to_string() },
        };
        let initial = seed.or(self.info.parameters.as_deref());
        match self.fitter.fit(&problem, initial, &self.info.free, &self.info.cancel) {
            Ok(result) => FitOutcome::Fitted(result),
            Err(FitError::ConvergenceFailure { best, .. }) => FitOutcome::Unconverged(*best),
            Err(FitError::Cancelled { .. }) => FitOutcome::Cancelled,
            Err(err) => FitOutcome::Failed { reason: err.to_string() },
        }
    }
}

/// Normalized instrument response for the prompt window, if any.
fn prepare_irf(global: &GlobalFitParams) -> Result<Option<InstrumentResponse>, FitError> {
    let Some(prompt) = &global.prompt else {
        return Ok(None);
    };
    let samples = normalized_irf(prompt, global.prompt_window, global.prompt_baseline)
        .ok_or_else(|| FitError::InvalidInput("prompt window holds no signal above baseline".into()))?;
    Ok(Some(InstrumentResponse {
        start: global.prompt_window.start,
        samples,
    }))
}

/// Per-pixel seeds from a previous `Each` report; fixed entries come from the
/// current request.
fn refine_seeds(
    previous: &FitReport,
    info: &FitInfo,
    image: &DecayImage,
) -> Result<Vec<Option<Vec<f64>>>, FitError> {
    if previous.units.len() != image.pixel_count() || previous.function != info.function {
        return Err(FitError::InvalidInput(
            "previous report does not match this image and function".into(),
        ));
    }
    Ok(previous
        .units
        .iter()
        .map(|unit| {
            let mut seed = unit.outcome.parameters()?.to_vec();
            if let Some(current) = &info.parameters {
                for (i, free) in info.free.iter().enumerate() {
                    if !free {
                        seed[i] = current[i];
                    }
                }
            }
            Some(seed)
        })
        .collect())
}
