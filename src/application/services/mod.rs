//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem) and on the
//! estimator seam, but are themselves concrete structs, not traits.

pub mod estimator;
mod export;
pub mod plot;
mod pipeline;

pub use estimator::{DivergenceTimeEstimator, PenalizedLikelihood};
pub use export::{ExportService, NEXUS_TREE_NAME};
pub use pipeline::{PipelineService, Prepared, RunOutputs, RunSummary};
pub use plot::{PlotFormat, PlotOptions, PlotService};
