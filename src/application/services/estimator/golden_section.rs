//! Golden section search for one-dimensional maximization.
//!
//! The objective must be unimodal on the bracket. Both bracket ends are
//! evaluated as well, so an optimum sitting on a bound is returned exactly.
//! Non-finite objective values count as worse than any finite value.

/// The inverse golden ratio: 1/φ = φ - 1
const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Configuration for the golden section search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    x_abs_tol: f64,
    x_rel_tol: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 200,
            x_abs_tol: 1e-12,
            x_rel_tol: 1e-10,
        }
    }
}

impl Config {
    fn is_converged(&self, left: f64, right: f64) -> bool {
        right - left <= self.x_abs_tol + self.x_rel_tol * left.abs().max(right.abs())
    }
}

/// Best point found by a search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Maximum {
    pub x: f64,
    pub value: f64,
    pub iterations: usize,
}

impl Maximum {
    fn consider(&mut self, x: f64, value: f64) {
        if score(value) > score(self.value) {
            self.x = x;
            self.value = value;
        }
    }
}

fn score(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

/// Finds the maximum of `objective` on `bracket`.
///
/// Reversed bounds are swapped.
pub fn maximize<F>(mut objective: F, bracket: [f64; 2], config: &Config) -> Maximum
where
    F: FnMut(f64) -> f64,
{
    let [a, b] = bracket;
    let (mut left, mut right) = if a <= b { (a, b) } else { (b, a) };

    let mut best = Maximum {
        x: left,
        value: objective(left),
        iterations: 0,
    };
    if right == left {
        return best;
    }
    best.consider(right, objective(right));

    let mut inner_left = right - INV_PHI * (right - left);
    let mut inner_right = left + INV_PHI * (right - left);
    let mut f_left = objective(inner_left);
    let mut f_right = objective(inner_right);

    for iter in 1..=config.max_iters {
        best.iterations = iter;
        if config.is_converged(left, right) {
            break;
        }
        if score(f_left) >= score(f_right) {
            // maximum lies in [left, inner_right]
            right = inner_right;
            inner_right = inner_left;
            f_right = f_left;
            inner_left = right - INV_PHI * (right - left);
            f_left = objective(inner_left);
        } else {
            left = inner_left;
            inner_left = inner_right;
            f_left = f_right;
            inner_right = left + INV_PHI * (right - left);
            f_right = objective(inner_right);
        }
    }

    best.consider(inner_left, f_left);
    best.consider(inner_right, f_right);
    best
}
