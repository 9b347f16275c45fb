//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Coarse classification used for exit codes and the stage prefix shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Config,
    Validation,
    Estimation,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Config => "config",
            ErrorKind::Validation => "validation",
            ErrorKind::Estimation => "estimation",
            ErrorKind::Io => "io",
        };
        write!(f, "{}", s)
    }
}

/// Domain errors represent malformed trees and invalid calibration input.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("cannot parse {source_name} at byte {position}: {message}")]
    Parse {
        source_name: String,
        position: usize,
        message: String,
    },

    #[error("unknown taxon '{taxon}' in {context}")]
    UnknownTaxon { taxon: String, context: String },

    #[error("invalid taxon set for {context}: {message}")]
    InvalidTaxonSet { context: String, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl DomainError {
    pub fn parse(source_name: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            position,
            message: message.into(),
        }
    }

    pub fn unknown_taxon(taxon: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnknownTaxon {
            taxon: taxon.into(),
            context: context.into(),
        }
    }

    pub fn taxon_set(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTaxonSet {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Parse { .. } => ErrorKind::Parse,
            DomainError::UnknownTaxon { .. } | DomainError::InvalidTaxonSet { .. } => ErrorKind::Config,
            DomainError::Validation(_) => ErrorKind::Validation,
        }
    }
}

/// Calibration-table and plot-parameter invariant violations.
///
/// Positions are 1-based, matching the order in which anchors were declared.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("calibration columns differ in length: {column} has {actual} entries, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("calibration #{position}: {field} age {value} must be finite and non-negative")]
    InvalidAge {
        position: usize,
        field: &'static str,
        value: f64,
    },

    #[error("calibration #{position}: min age {min} exceeds max age {max}")]
    MinExceedsMax { position: usize, min: f64, max: f64 },

    #[error("calibration #{position}: node {node} is already calibrated by #{first}")]
    DuplicateNode {
        position: usize,
        first: usize,
        node: usize,
    },

    #[error("calibration #{position}: node {node} is not an internal node")]
    NotInternal { position: usize, node: usize },

    #[error("invalid {name}: {message}")]
    Parameter { name: &'static str, message: String },
}
