//! Penalized-likelihood objective on a flattened rooted tree.
//!
//! Nodes are addressed by position `id - 1`, so tips occupy `0..tip_count`,
//! the root sits at `tip_count` and internal positions ascend in preorder.
//! The rate of an edge is stored at the position of the node the edge leads to.

use crate::application::EstimationError;
use crate::domain::{CalibrationTable, EstimatorParams, NodeId, PhyloTree, RateModel};

/// Smallest rate considered during the line search.
pub(super) const RATE_FLOOR: f64 = 1e-12;

/// Minimal parent-child age gap, as a fraction of the largest calibration age.
const MIN_DURATION_FRACTION: f64 = 1e-6;

/// Uncalibrated roots may not be older than this multiple of the oldest calibration.
const ROOT_CAP_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct SoftBound {
    min: f64,
    max: f64,
    width: f64,
}

impl SoftBound {
    fn violation(&self, age: f64) -> f64 {
        if age < self.min {
            self.min - age
        } else if age > self.max {
            age - self.max
        } else {
            0.0
        }
    }
}

/// Immutable description of the fitting problem.
#[derive(Debug, Clone)]
pub(super) struct Problem {
    pub tip_count: usize,
    pub parent: Vec<Option<usize>>,
    pub children: Vec<Vec<usize>>,
    /// Phylogram length of the edge above each node, 0 for the root
    pub length: Vec<f64>,
    /// Hard age bounds; the root's upper bound is always finite
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub soft: Vec<Option<SoftBound>>,
    /// Largest calibration age, sets the time scale
    pub oldest_age: f64,
    /// Minimal age difference between a parent and its child
    pub min_duration: f64,
    pub model: RateModel,
    pub smoothing: f64,
    pub soft_weight: f64,
}

/// Current ages and rates.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct State {
    pub ages: Vec<f64>,
    pub rates: Vec<f64>,
}

impl Problem {
    pub fn new(
        tree: &PhyloTree,
        table: &CalibrationTable,
        params: &EstimatorParams,
    ) -> Result<Self, EstimationError> {
        if table.is_empty() {
            return Err(EstimationError::NoCalibrations);
        }
        let oldest = table
            .oldest_max_age()
            .filter(|&age| age > 0.0)
            .ok_or(EstimationError::Unbounded)?;

        let numbering = tree.numbering();
        let n = numbering.len();
        let tip_count = numbering.tip_count();
        if tip_count < 2 {
            return Err(EstimationError::InvalidResult(format!(
                "tree needs at least two tips, got {}",
                tip_count
            )));
        }
        let root = tip_count;

        let mut parent = vec![None; n];
        let mut children = vec![Vec::new(); n];
        let mut length = vec![0.0; n];
        for pos in 0..n {
            let id = NodeId(pos + 1);
            let idx = numbering.index(id).ok_or_else(|| {
                EstimationError::InvalidResult(format!("node {} is not in the tree", id))
            })?;
            children[pos] = tree
                .children(idx)
                .iter()
                .filter_map(|&c| numbering.id(c))
                .map(|c| c.0 - 1)
                .collect();
            parent[pos] = tree.parent(idx).and_then(|p| numbering.id(p)).map(|p| p.0 - 1);
            if pos != root {
                length[pos] = tree
                    .length(idx)
                    .ok_or(EstimationError::MissingEdgeLength { node: id })?;
            }
        }

        let mut lower = vec![0.0; n];
        let mut upper = vec![f64::INFINITY; n];
        let mut soft = vec![None; n];
        for record in table {
            let pos = record.node.0 - 1;
            if record.soft {
                soft[pos] = Some(SoftBound {
                    min: record.min_age,
                    max: record.max_age,
                    width: (record.max_age - record.min_age).max(oldest * MIN_DURATION_FRACTION),
                });
            } else {
                lower[pos] = record.min_age;
                upper[pos] = record.max_age;
            }
        }
        upper[root] = upper[root].min(ROOT_CAP_FACTOR * oldest);

        Ok(Self {
            tip_count,
            parent,
            children,
            length,
            lower,
            upper,
            soft,
            oldest_age: oldest,
            min_duration: oldest * MIN_DURATION_FRACTION,
            model: params.model,
            smoothing: params.smoothing,
            soft_weight: params.soft_bound_weight,
        })
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn root(&self) -> usize {
        self.tip_count
    }

    /// Internal positions in preorder, root first.
    pub fn internal(&self) -> std::ops::Range<usize> {
        self.tip_count..self.len()
    }

    /// All positions with an edge above them.
    pub fn edges(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&pos| pos != self.root())
    }

    fn is_basal(&self, pos: usize) -> bool {
        self.parent[pos] == Some(self.root())
    }

    /// Feasible age ranges implied by hard bounds and topology.
    ///
    /// Lower bounds propagate upward from the tips, upper bounds downward from
    /// the root; each parent is at least `min_duration` older than its children.
    pub fn feasible_ranges(&self) -> Result<(Vec<f64>, Vec<f64>), EstimationError> {
        let n = self.len();
        let mut lo = vec![0.0; n];
        let mut hi = vec![0.0; n];
        for pos in self.internal().rev() {
            let from_children = self.children[pos]
                .iter()
                .map(|&c| lo[c] + self.min_duration)
                .fold(0.0, f64::max);
            lo[pos] = self.lower[pos].max(from_children);
        }
        for pos in self.internal() {
            let from_parent = self.parent[pos]
                .map(|p| hi[p] - self.min_duration)
                .unwrap_or(f64::INFINITY);
            hi[pos] = self.upper[pos].min(from_parent);
            if lo[pos] > hi[pos] {
                return Err(EstimationError::Infeasible {
                    node: NodeId(pos + 1),
                    lower: lo[pos],
                    upper: hi[pos],
                });
            }
        }
        Ok((lo, hi))
    }

    /// Starting point: ages proportional to mean phylogram depth, clamped into
    /// the feasible ranges, and the strict-clock rate on every edge.
    pub fn initial_state(&self) -> Result<State, EstimationError> {
        let (lo, hi) = self.feasible_ranges()?;
        let depth = self.mean_depths();
        let root = self.root();

        let target = match self.soft[root] {
            _ if self.upper[root].is_finite() && self.lower[root] > 0.0 => {
                0.5 * (self.lower[root] + self.upper[root])
            }
            Some(bound) => 0.5 * (bound.min + bound.max),
            None => self.oldest_age,
        };
        let root_age = target.clamp(lo[root], hi[root]);

        let mut ages = vec![0.0; self.len()];
        for pos in self.internal() {
            ages[pos] = match self.parent[pos] {
                None => root_age,
                Some(p) => {
                    let proposed = root_age * depth[pos] / depth[root];
                    let ceiling = hi[pos].min(ages[p] - self.min_duration);
                    proposed.clamp(lo[pos], ceiling.max(lo[pos]))
                }
            };
        }

        let mut state = State {
            ages,
            rates: vec![0.0; self.len()],
        };
        let rate = self.clock_rate(&state);
        for pos in self.edges().collect::<Vec<_>>() {
            state.rates[pos] = rate;
        }
        Ok(state)
    }

    /// Mean root-ward depth in substitutions, falling back to edge counts for
    /// trees whose lengths are all zero.
    fn mean_depths(&self) -> Vec<f64> {
        let mut depth = vec![0.0; self.len()];
        let mut levels = vec![0.0; self.len()];
        for pos in self.internal().rev() {
            let kids = &self.children[pos];
            let count = kids.len().max(1) as f64;
            depth[pos] = kids.iter().map(|&c| depth[c] + self.length[c]).sum::<f64>() / count;
            levels[pos] = kids.iter().map(|&c| levels[c] + 1.0).sum::<f64>() / count;
        }
        if depth[self.root()] > 0.0 {
            depth
        } else {
            levels
        }
    }

    pub fn duration(&self, state: &State, pos: usize) -> f64 {
        self.parent[pos]
            .map(|p| state.ages[p] - state.ages[pos])
            .unwrap_or(0.0)
    }

    /// Closed-form rate of a strict clock: total length over total duration.
    pub fn clock_rate(&self, state: &State) -> f64 {
        let (length, time) = self.edges().fold((0.0, 0.0), |acc, pos| {
            (acc.0 + self.length[pos], acc.1 + self.duration(state, pos))
        });
        if time > 0.0 {
            (length / time).max(RATE_FLOOR)
        } else {
            RATE_FLOOR
        }
    }

    pub fn log_likelihood(&self, state: &State) -> f64 {
        self.edges()
            .map(|pos| {
                edge_log_likelihood(self.length[pos], state.rates[pos], self.duration(state, pos))
            })
            .sum()
    }

    pub fn rate_penalty(&self, rates: &[f64]) -> f64 {
        if self.model == RateModel::Strict {
            return 0.0;
        }
        let root = self.root();
        let basal = &self.children[root];
        let mean = basal.iter().map(|&b| rates[b]).sum::<f64>() / basal.len().max(1) as f64;
        let spread: f64 = basal.iter().map(|&b| (rates[b] - mean).powi(2)).sum();
        let inherited: f64 = self
            .edges()
            .filter(|&pos| !self.is_basal(pos))
            .filter_map(|pos| self.parent[pos].map(|p| (rates[pos] - rates[p]).powi(2)))
            .sum();
        self.smoothing * (spread + inherited)
    }

    fn soft_penalty_at(&self, pos: usize, age: f64) -> f64 {
        self.soft[pos]
            .map(|bound| self.soft_weight * (bound.violation(age) / bound.width).powi(2))
            .unwrap_or(0.0)
    }

    pub fn soft_penalty(&self, state: &State) -> f64 {
        self.internal()
            .map(|pos| self.soft_penalty_at(pos, state.ages[pos]))
            .sum()
    }

    /// Penalized log-likelihood, the quantity being maximized.
    pub fn objective(&self, state: &State) -> f64 {
        self.log_likelihood(state) - self.rate_penalty(&state.rates) - self.soft_penalty(state)
    }

    /// Feasible interval for one node age with everything else held fixed.
    pub fn age_interval(&self, state: &State, pos: usize) -> [f64; 2] {
        let above_children = self.children[pos]
            .iter()
            .map(|&c| state.ages[c] + self.min_duration)
            .fold(0.0, f64::max);
        let below_parent = self.parent[pos]
            .map(|p| state.ages[p] - self.min_duration)
            .unwrap_or(f64::INFINITY);
        [
            self.lower[pos].max(above_children),
            self.upper[pos].min(below_parent),
        ]
    }

    /// Terms of the objective that depend on the age of `pos`.
    pub fn local_age_objective(&self, state: &State, pos: usize, age: f64) -> f64 {
        let below: f64 = self.children[pos]
            .iter()
            .map(|&c| edge_log_likelihood(self.length[c], state.rates[c], age - state.ages[c]))
            .sum();
        let above = self.parent[pos]
            .map(|p| edge_log_likelihood(self.length[pos], state.rates[pos], state.ages[p] - age))
            .unwrap_or(0.0);
        below + above - self.soft_penalty_at(pos, age)
    }

    /// Search interval for one edge rate: every term's own optimum lies inside.
    pub fn rate_interval(&self, state: &State, pos: usize) -> [f64; 2] {
        let duration = self.duration(state, pos);
        let own = if duration > 0.0 {
            self.length[pos] / duration
        } else {
            0.0
        };
        let neighbours = self
            .neighbour_edges(pos)
            .map(|e| state.rates[e])
            .fold(0.0, f64::max);
        let widest = own.max(neighbours).max(state.rates[pos]);
        [RATE_FLOOR, 2.0 * widest + RATE_FLOOR]
    }

    fn neighbour_edges(&self, pos: usize) -> impl Iterator<Item = usize> + '_ {
        let upward: Vec<usize> = if self.is_basal(pos) {
            self.children[self.root()]
                .iter()
                .copied()
                .filter(|&b| b != pos)
                .collect()
        } else {
            self.parent[pos].into_iter().collect()
        };
        upward.into_iter().chain(self.children[pos].iter().copied())
    }

    /// Terms of the objective that depend on the rate of the edge above `pos`.
    pub fn local_rate_objective(&self, state: &State, pos: usize, rate: f64) -> f64 {
        let likelihood =
            edge_log_likelihood(self.length[pos], rate, self.duration(state, pos));
        let rate_of = |e: usize| if e == pos { rate } else { state.rates[e] };

        let upward = if self.is_basal(pos) {
            let basal = &self.children[self.root()];
            let mean = basal.iter().map(|&b| rate_of(b)).sum::<f64>() / basal.len() as f64;
            basal.iter().map(|&b| (rate_of(b) - mean).powi(2)).sum::<f64>()
        } else {
            self.parent[pos]
                .map(|p| (rate - state.rates[p]).powi(2))
                .unwrap_or(0.0)
        };
        let downward: f64 = self.children[pos]
            .iter()
            .map(|&c| (state.rates[c] - rate).powi(2))
            .sum();

        likelihood - self.smoothing * (upward + downward)
    }
}

/// Poisson log-likelihood of observing `length` substitutions on an edge of
/// the given rate and duration, dropping the constant term.
pub(super) fn edge_log_likelihood(length: f64, rate: f64, duration: f64) -> f64 {
    let expected = rate * duration;
    if length > 0.0 {
        if expected <= 0.0 {
            return f64::NEG_INFINITY;
        }
        length * expected.ln() - expected
    } else {
        -expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Anchor, CalibrationSpec, NodeId};
    use crate::domain::newick::parse_newick;
    use approx::assert_relative_eq;

    fn problem(newick: &str, specs: &[CalibrationSpec], model: RateModel) -> Problem {
        let tree = parse_newick(newick, "t").unwrap();
        let table = CalibrationTable::build(&tree, specs).unwrap();
        let params = EstimatorParams {
            model,
            ..Default::default()
        };
        Problem::new(&tree, &table, &params).unwrap()
    }

    #[test]
    fn given_zero_length_when_computing_edge_likelihood_then_only_exposure_counts() {
        assert_relative_eq!(edge_log_likelihood(0.0, 0.5, 4.0), -2.0);
        assert_relative_eq!(edge_log_likelihood(2.0, 0.5, 4.0), 2.0 * 2.0_f64.ln() - 2.0);
        assert_eq!(edge_log_likelihood(1.0, 0.5, 0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn given_tree_when_building_problem_then_positions_follow_node_numbers() {
        let p = problem(
            "((A:1,B:1):1,C:2);",
            &[CalibrationSpec::hard(Anchor::Root, 10.0, 20.0)],
            RateModel::Relaxed,
        );

        assert_eq!(p.root(), 3);
        assert_eq!(p.parent[4], Some(3));
        assert_eq!(p.children[3], vec![4, 2]);
        assert_eq!(p.length[4], 1.0);
        assert_eq!(p.upper[3], 20.0);
        assert_relative_eq!(p.min_duration, 20.0 * MIN_DURATION_FRACTION);
    }

    #[test]
    fn given_uncalibrated_root_when_building_problem_then_root_is_capped() {
        let p = problem(
            "((A:1,B:1):1,C:2);",
            &[CalibrationSpec::hard(
                Anchor::Mrca(vec!["A".into(), "B".into()]),
                5.0,
                8.0,
            )],
            RateModel::Relaxed,
        );

        assert_eq!(p.upper[p.root()], 80.0);
        let (lo, hi) = p.feasible_ranges().unwrap();
        assert_eq!(lo[4], 5.0);
        assert_relative_eq!(lo[3], 5.0 + p.min_duration);
        assert_eq!(hi[4], 8.0);
    }

    #[test]
    fn given_child_older_than_parent_bound_when_checking_ranges_then_infeasible() {
        let p = problem(
            "((A:1,B:1):1,C:2);",
            &[
                CalibrationSpec::hard(Anchor::Root, 10.0, 20.0),
                CalibrationSpec::hard(Anchor::Mrca(vec!["A".into(), "B".into()]), 30.0, 40.0),
            ],
            RateModel::Relaxed,
        );

        match p.feasible_ranges() {
            Err(EstimationError::Infeasible { node, lower, upper }) => {
                // (A,B) must be older than 30, so the root cannot fit under 20
                assert_eq!(node, NodeId(4));
                assert!(lower > 30.0);
                assert_eq!(upper, 20.0);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn given_initial_state_then_ages_respect_order_and_bounds() {
        let p = problem(
            "((A:1,B:1):1,C:2);",
            &[CalibrationSpec::hard(Anchor::Root, 10.0, 20.0)],
            RateModel::Strict,
        );

        let state = p.initial_state().unwrap();

        assert_eq!(state.ages[3], 15.0);
        // mean depth of (A,B) is half of the root's
        assert_relative_eq!(state.ages[4], 7.5);
        // 5 substitutions over 7.5 + 7.5 + 7.5 + 15 time units
        assert_relative_eq!(state.rates[0], 5.0 / 37.5);
        assert_eq!(state.rates[3], 0.0);
        assert!(p.objective(&state).is_finite());
    }

    #[test]
    fn given_equal_rates_when_penalizing_then_relaxed_penalty_is_zero() {
        let p = problem(
            "((A:1,B:1):1,C:2);",
            &[CalibrationSpec::hard(Anchor::Root, 10.0, 20.0)],
            RateModel::Relaxed,
        );

        assert_eq!(p.rate_penalty(&[0.1, 0.1, 0.1, 0.0, 0.1]), 0.0);
        // basal edges 4 and 2 differ by 0.2 around mean 0.2; child edges 0,1 inherit from 4
        let penalty = p.rate_penalty(&[0.1, 0.1, 0.3, 0.0, 0.1]);
        assert_relative_eq!(penalty, 0.02 + 0.0 + 0.0);
    }

    #[test]
    fn given_soft_bound_when_outside_then_penalty_grows_with_violation() {
        let p = problem(
            "((A:1,B:1):1,C:2);",
            &[
                CalibrationSpec::hard(Anchor::Root, 10.0, 20.0),
                CalibrationSpec::soft(Anchor::Mrca(vec!["A".into(), "B".into()]), 4.0, 6.0),
            ],
            RateModel::Relaxed,
        );

        assert_eq!(p.soft_penalty_at(4, 5.0), 0.0);
        assert_relative_eq!(p.soft_penalty_at(4, 7.0), 1000.0 * 0.25);
        assert_relative_eq!(p.soft_penalty_at(4, 2.0), 1000.0);
    }
}
