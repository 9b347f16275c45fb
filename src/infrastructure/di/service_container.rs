//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{DivergenceTimeEstimator, PenalizedLikelihood, PipelineService};
use crate::config::Settings;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Effective run settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Divergence-time estimator used by `run`
    pub estimator: Arc<dyn DivergenceTimeEstimator>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(PenalizedLikelihood::new()),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        estimator: Arc<dyn DivergenceTimeEstimator>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            fs,
            estimator,
        }
    }

    pub fn pipeline(&self) -> PipelineService {
        PipelineService::new(self.fs.clone(), self.estimator.clone())
    }
}
