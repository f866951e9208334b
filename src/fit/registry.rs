//! Name → fitter lookup.
//!
//! The engine never matches on algorithm variants directly; it asks the
//! registry for a fitter by name. New algorithms are added by registering a
//! factory before the engine is built.

use std::collections::BTreeMap;

use crate::error::FitError;
use crate::fit::fitter::{CurveFitter, LmaFitter, RldFitter};
use crate::fit::lma::SolverConfig;

/// Builds a fitter for the given solver settings.
pub type FitterFactory = fn(&SolverConfig) -> Box<dyn CurveFitter>;

#[derive(Debug, Clone, Default)]
pub struct FitterRegistry {
    factories: BTreeMap<String, FitterFactory>,
}

impl FitterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `rld`, `lma` and `rld-lma`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("rld", |_| Box::new(RldFitter));
        registry.register("lma", |config| {
            Box::new(LmaFitter {
                config: *config,
                seed_from_rld: false,
            })
        });
        registry.register("rld-lma", |config| {
            Box::new(LmaFitter {
                config: *config,
                seed_from_rld: true,
            })
        });
        registry
    }

    /// Add (or replace) a factory.
    pub fn register(&mut self, name: impl Into<String>, factory: FitterFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str, config: &SolverConfig) -> Result<Box<dyn CurveFitter>, FitError> {
        self.factories
            .get(name)
            .map(|factory| factory(config))
            .ok_or_else(|| FitError::UnknownAlgorithm(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitAlgorithm;

    #[test]
    fn defaults_cover_every_algorithm() {
        let registry = FitterRegistry::with_defaults();
        for algorithm in [FitAlgorithm::Rld, FitAlgorithm::Lma, FitAlgorithm::RldLma] {
            let fitter = registry
                .create(algorithm.registry_name(), &SolverConfig::default())
                .unwrap();
            assert_eq!(fitter.name(), algorithm.registry_name());
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = FitterRegistry::with_defaults();
        assert!(matches!(
            registry.create("simplex", &SolverConfig::default()),
            Err(FitError::UnknownAlgorithm(name)) if name == "simplex"
        ));
    }
}
