//! CLI-level errors (wraps infrastructure errors)

use std::io;

use thiserror::Error;

use crate::application::{ApplicationError, EstimationError};
use crate::domain::{DomainError, ErrorKind};
use crate::exitcode;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

impl From<DomainError> for CliError {
    fn from(e: DomainError) -> Self {
        ApplicationError::from(e).into()
    }
}

impl From<EstimationError> for CliError {
    fn from(e: EstimationError) -> Self {
        ApplicationError::from(e).into()
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Stage the error belongs to; None for argument errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CliError::Infra(e) => Some(e.kind()),
            CliError::InvalidArgs(_) => None,
        }
    }

    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) => exitcode::USAGE,
            CliError::Infra(e) => match e.kind() {
                ErrorKind::Parse | ErrorKind::Validation => exitcode::DATAERR,
                ErrorKind::Config => exitcode::CONFIG,
                ErrorKind::Estimation => exitcode::SOFTWARE,
                ErrorKind::Io => io_exit_code(e),
            },
        }
    }
}

/// Missing inputs get NOINPUT, failed writes CANTCREAT, anything else IOERR.
fn io_exit_code(e: &InfraError) -> i32 {
    let (context, source): (&str, Option<&io::Error>) = match e {
        InfraError::Io { context, source } => (context, Some(source)),
        InfraError::Application(ApplicationError::OperationFailed { context, source }) => {
            (context, source.downcast_ref::<io::Error>())
        }
        InfraError::Application(_) => ("", None),
    };
    if context.starts_with("write") || context.starts_with("create") {
        exitcode::CANTCREAT
    } else if source.is_some_and(|s| s.kind() == io::ErrorKind::NotFound) {
        exitcode::NOINPUT
    } else {
        exitcode::IOERR
    }
}
