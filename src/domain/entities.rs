//! Domain entities: estimator parameters and the estimated timetree

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::arena::{NodeId, PhyloTree};
use crate::domain::error::ValidationError;

/// Substitution-rate model used by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateModel {
    /// One rate for the whole tree
    Strict,
    /// One rate per edge, autocorrelated between parent and child edges
    #[default]
    Relaxed,
}

impl fmt::Display for RateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateModel::Strict => write!(f, "strict"),
            RateModel::Relaxed => write!(f, "relaxed"),
        }
    }
}

impl FromStr for RateModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "clock" => Ok(RateModel::Strict),
            "relaxed" | "correlated" => Ok(RateModel::Relaxed),
            other => Err(format!(
                "unknown rate model '{}', expected 'strict' or 'relaxed'",
                other
            )),
        }
    }
}

/// Tuning knobs for the divergence-time estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorParams {
    /// Rate smoothing λ, must be positive
    pub smoothing: f64,
    pub model: RateModel,
    /// Maximum number of coordinate-ascent sweeps
    pub max_iterations: usize,
    /// Relative change of the penalized log-likelihood that counts as converged
    pub tolerance: f64,
    /// Weight of a soft-bound violation, measured in bound widths
    pub soft_bound_weight: f64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            smoothing: 1.0,
            model: RateModel::Relaxed,
            max_iterations: 1000,
            tolerance: 1e-8,
            soft_bound_weight: 1000.0,
        }
    }
}

impl EstimatorParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.smoothing.is_finite() || self.smoothing <= 0.0 {
            return Err(ValidationError::Parameter {
                name: "smoothing",
                message: format!("must be finite and positive, got {}", self.smoothing),
            });
        }
        if self.max_iterations == 0 {
            return Err(ValidationError::Parameter {
                name: "max_iterations",
                message: "must be at least 1".to_string(),
            });
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ValidationError::Parameter {
                name: "tolerance",
                message: format!("must be finite and positive, got {}", self.tolerance),
            });
        }
        if !self.soft_bound_weight.is_finite() || self.soft_bound_weight < 0.0 {
            return Err(ValidationError::Parameter {
                name: "soft_bound_weight",
                message: format!(
                    "must be finite and non-negative, got {}",
                    self.soft_bound_weight
                ),
            });
        }
        Ok(())
    }
}

/// Summary of a finished fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub model: RateModel,
    pub smoothing: f64,
    pub log_likelihood: f64,
    pub penalized_log_likelihood: f64,
    /// Coordinate-ascent sweeps until convergence
    pub iterations: usize,
}

impl fmt::Display for FitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model={} lambda={} logL={:.6} penalized={:.6} sweeps={}",
            self.model,
            self.smoothing,
            self.log_likelihood,
            self.penalized_log_likelihood,
            self.iterations
        )
    }
}

/// A time-scaled, ultrametric tree.
///
/// `tree` has the topology and tip labels of the input phylogram, its edge
/// lengths are durations. Ages and rates are keyed by node number; the rate
/// of an edge is stored under the node the edge leads to.
#[derive(Debug, Clone)]
pub struct Timetree {
    pub tree: PhyloTree,
    pub ages: BTreeMap<NodeId, f64>,
    pub rates: BTreeMap<NodeId, f64>,
    pub report: FitReport,
}

impl Timetree {
    pub fn age(&self, node: NodeId) -> Option<f64> {
        self.ages.get(&node).copied()
    }

    /// Age of the root, the largest age in the tree.
    pub fn root_age(&self) -> f64 {
        self.ages.values().copied().fold(0.0, f64::max)
    }
}

/// Expand `~`, `$VAR` and `${VAR}` in a path-like string.
///
/// Returns the input unchanged when a variable cannot be resolved.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
