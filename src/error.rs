use thiserror::Error;

use crate::domain::FitResult;

/// Application-level error carrying a process exit code.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match &err {
            FitError::InvalidInput(_) | FitError::UnknownAlgorithm(_) => 2,
            FitError::DegenerateInput { .. } => 3,
            FitError::ConvergenceFailure { .. } | FitError::Cancelled { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

/// Errors produced by the cursor estimator and the fit engine.
#[derive(Error, Debug, Clone)]
pub enum FitError {
    /// Malformed, empty or inconsistent input. Not retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Too few photons in the fit window to attempt a fit.
    #[error("insufficient signal: {photons} photons in window (threshold {threshold})")]
    DegenerateInput { photons: f64, threshold: f64 },

    /// Iteration cap reached without meeting the tolerance.
    ///
    /// Carries the best parameters found; callers may retry with another seed
    /// or algorithm.
    #[error("fit did not converge after {iterations} iterations")]
    ConvergenceFailure {
        iterations: usize,
        best: Box<FitResult>,
    },

    /// The cancellation flag was raised while fitting.
    #[error("fit cancelled")]
    Cancelled { partial: Option<Box<FitResult>> },

    /// No fitter registered under the requested name.
    #[error("unknown fit algorithm: {0}")]
    UnknownAlgorithm(String),
}

impl FitError {
    /// Errors that invalidate the whole request rather than one unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FitError::InvalidInput(_) | FitError::UnknownAlgorithm(_))
    }
}
