//! Reversed time axis: positions grow from the root, labels count back from the present.

/// Upper bound on ticks per axis; finer intervals are rejected.
pub const MAX_TICKS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Distance from the root in time units
    pub position: f64,
    /// Age shown on the label
    pub age: f64,
}

impl Tick {
    pub fn label(&self) -> String {
        format_age(self.age)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxisTicks {
    pub minor: Vec<Tick>,
    pub major: Vec<Tick>,
}

/// Ticks at `root_age - k * interval` for `k = 0, 1, ...` while the position is not negative.
pub fn ticks_for(root_age: f64, interval: f64) -> Vec<Tick> {
    let slack = root_age.abs() * 1e-12;
    let mut ticks = Vec::new();
    for k in 0..=MAX_TICKS {
        let age = k as f64 * interval;
        let position = root_age - age;
        if position < -slack {
            break;
        }
        ticks.push(Tick {
            position: position.max(0.0),
            age,
        });
    }
    ticks
}

pub fn axis_ticks(root_age: f64, minor_interval: f64, major_interval: f64) -> AxisTicks {
    AxisTicks {
        minor: ticks_for(root_age, minor_interval),
        major: ticks_for(root_age, major_interval),
    }
}

/// Age label rounded to six decimals, trailing zeros dropped.
pub fn format_age(age: f64) -> String {
    let text = format!("{:.6}", age);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
