//! Divergence-time estimation.
//!
//! The pipeline only talks to [`DivergenceTimeEstimator`]; the shipped
//! implementation is [`PenalizedLikelihood`], a relaxed-clock fit in the
//! manner of r8s: a Poisson likelihood of the phylogram edge lengths given
//! node ages and edge rates, penalized by rate changes between adjacent edges.

pub mod golden_section;
mod model;

use std::collections::BTreeMap;

use tracing::{debug, instrument, trace};

use crate::application::EstimationError;
use crate::domain::{
    CalibrationTable, EstimatorParams, FitReport, NodeId, PhyloTree, RateModel, Timetree,
};

use model::{Problem, State};

/// Relative tolerance used when checking the finished tree.
const RESULT_TOLERANCE: f64 = 1e-9;

/// Turns a rooted phylogram plus calibrations into a timetree.
pub trait DivergenceTimeEstimator: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    fn estimate(
        &self,
        tree: &PhyloTree,
        table: &CalibrationTable,
        params: &EstimatorParams,
    ) -> Result<Timetree, EstimationError>;
}

/// Penalized-likelihood fit by block coordinate ascent.
///
/// Each sweep maximizes every internal node age in preorder, then the rates:
/// the strict clock uses its closed-form rate, the relaxed model optimizes
/// each edge rate in turn. Each one-dimensional step is a golden section
/// search on the coordinate's feasible interval and is only accepted if it
/// improves the objective, so the objective never decreases between sweeps.
#[derive(Debug, Clone, Default)]
pub struct PenalizedLikelihood {
    line_search: golden_section::Config,
}

impl PenalizedLikelihood {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep(&self, problem: &Problem, state: &mut State) {
        for pos in problem.internal() {
            let current = state.ages[pos];
            let before = problem.local_age_objective(state, pos, current);
            let best = golden_section::maximize(
                |age| problem.local_age_objective(state, pos, age),
                problem.age_interval(state, pos),
                &self.line_search,
            );
            if best.value > before {
                state.ages[pos] = best.x;
            }
        }

        match problem.model {
            RateModel::Strict => {
                let rate = problem.clock_rate(state);
                for pos in problem.edges().collect::<Vec<_>>() {
                    state.rates[pos] = rate;
                }
            }
            RateModel::Relaxed => {
                for pos in problem.edges().collect::<Vec<_>>() {
                    let current = state.rates[pos];
                    let before = problem.local_rate_objective(state, pos, current);
                    let best = golden_section::maximize(
                        |rate| problem.local_rate_objective(state, pos, rate),
                        problem.rate_interval(state, pos),
                        &self.line_search,
                    );
                    if best.value > before {
                        state.rates[pos] = best.x;
                    }
                }
            }
        }
    }
}

impl DivergenceTimeEstimator for PenalizedLikelihood {
    fn name(&self) -> &'static str {
        "penalized-likelihood"
    }

    #[instrument(level = "debug", skip_all, fields(model = %params.model, lambda = params.smoothing))]
    fn estimate(
        &self,
        tree: &PhyloTree,
        table: &CalibrationTable,
        params: &EstimatorParams,
    ) -> Result<Timetree, EstimationError> {
        params
            .validate()
            .map_err(|e| EstimationError::InvalidParameters(e.to_string()))?;
        let problem = Problem::new(tree, table, params)?;
        let mut state = problem.initial_state()?;

        let mut objective = problem.objective(&state);
        if !objective.is_finite() {
            return Err(EstimationError::InvalidResult(format!(
                "objective at the starting point is {}",
                objective
            )));
        }
        debug!("starting objective {:.6}", objective);

        let mut last_change = f64::INFINITY;
        for iteration in 1..=params.max_iterations {
            self.sweep(&problem, &mut state);
            let next = problem.objective(&state);
            if !next.is_finite() {
                return Err(EstimationError::InvalidResult(format!(
                    "objective became {} in sweep {}",
                    next, iteration
                )));
            }
            last_change = (next - objective).abs() / objective.abs().max(1.0);
            trace!(iteration, objective = next, change = last_change, "sweep");
            objective = next;

            if last_change < params.tolerance {
                debug!("converged after {} sweeps", iteration);
                let report = FitReport {
                    model: params.model,
                    smoothing: params.smoothing,
                    log_likelihood: problem.log_likelihood(&state),
                    penalized_log_likelihood: objective,
                    iterations: iteration,
                };
                return build_timetree(tree, &problem, &state, report);
            }
        }

        Err(EstimationError::NotConverged {
            iterations: params.max_iterations,
            last_change,
            objective,
        })
    }
}

/// Copy the input tree with durations as edge lengths and check the result.
fn build_timetree(
    tree: &PhyloTree,
    problem: &Problem,
    state: &State,
    report: FitReport,
) -> Result<Timetree, EstimationError> {
    let numbering = tree.numbering();
    let mut timed = tree.clone();
    let mut ages = BTreeMap::new();
    let mut rates = BTreeMap::new();

    for pos in 0..problem.len() {
        let id = NodeId(pos + 1);
        let idx = numbering
            .index(id)
            .ok_or_else(|| EstimationError::InvalidResult(format!("node {} vanished", id)))?;
        let age = state.ages[pos];
        if !age.is_finite() || age < 0.0 {
            return Err(EstimationError::InvalidResult(format!(
                "node {} has age {}",
                id, age
            )));
        }
        ages.insert(id, age);

        let duration = problem.parent[pos].map(|p| state.ages[p] - age);
        if let Some(node) = timed.get_node_mut(idx) {
            node.data.length = duration;
        }
        if duration.is_some() {
            rates.insert(id, state.rates[pos]);
        }
    }

    check_result(&timed, problem, state)?;
    Ok(Timetree {
        tree: timed,
        ages,
        rates,
        report,
    })
}

fn check_result(timed: &PhyloTree, problem: &Problem, state: &State) -> Result<(), EstimationError> {
    let root_age = state.ages[problem.root()];
    let slack = RESULT_TOLERANCE * root_age.max(1.0);
    for tip in timed.tips() {
        let depth = timed.distance_from_root(tip);
        if (depth - root_age).abs() > slack {
            return Err(EstimationError::InvalidResult(format!(
                "tree is not ultrametric: tip {:?} at depth {} but root age {}",
                timed.label(tip),
                depth,
                root_age
            )));
        }
    }
    for pos in problem.internal() {
        let age = state.ages[pos];
        if age < problem.lower[pos] - slack || age > problem.upper[pos] + slack {
            return Err(EstimationError::InvalidResult(format!(
                "node {} at age {} violates its hard bounds [{}, {}]",
                pos + 1,
                age,
                problem.lower[pos],
                problem.upper[pos]
            )));
        }
    }
    Ok(())
}
