//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{DomainError, ErrorKind, NodeId};

/// Failures of the divergence-time fit.
///
/// These are distinct from validation errors: the input was well formed but
/// no acceptable timetree could be produced from it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("no calibrations given, the time scale is not identifiable")]
    NoCalibrations,

    #[error("edge above node {node} has no length")]
    MissingEdgeLength { node: NodeId },

    #[error("no calibration gives a positive maximum age, the time scale is not identifiable")]
    Unbounded,

    #[error("node {node} has no feasible age: lower bound {lower} exceeds upper bound {upper}")]
    Infeasible { node: NodeId, lower: f64, upper: f64 },

    #[error(
        "no convergence after {iterations} sweeps (last relative change {last_change:e}, objective {objective})"
    )]
    NotConverged {
        iterations: usize,
        last_change: f64,
        objective: f64,
    },

    #[error("invalid estimator parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid result: {0}")]
    InvalidResult(String),
}

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Estimation(#[from] EstimationError),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Domain(e) => e.kind(),
            ApplicationError::Estimation(_) => ErrorKind::Estimation,
            ApplicationError::Config { .. } => ErrorKind::Config,
            ApplicationError::OperationFailed { .. } => ErrorKind::Io,
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
