//! ICS geologic periods used for the time scale band.

use super::figure::Color;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Period {
    pub name: &'static str,
    /// Age of the upper (younger) boundary, Ma
    pub start: f64,
    /// Age of the lower (older) boundary, Ma
    pub end: f64,
    pub color: Color,
}

const fn period(name: &'static str, start: f64, end: f64, color: Color) -> Period {
    Period {
        name,
        start,
        end,
        color,
    }
}

/// Phanerozoic periods, youngest first (ICS chart 2023/09 boundaries and colours).
pub const PERIODS: [Period; 12] = [
    period("Quaternary", 0.0, 2.58, Color(249, 249, 127)),
    period("Neogene", 2.58, 23.03, Color(255, 230, 25)),
    period("Paleogene", 23.03, 66.0, Color(253, 154, 82)),
    period("Cretaceous", 66.0, 145.0, Color(127, 198, 78)),
    period("Jurassic", 145.0, 201.4, Color(52, 178, 201)),
    period("Triassic", 201.4, 251.902, Color(129, 43, 146)),
    period("Permian", 251.902, 298.9, Color(240, 64, 40)),
    period("Carboniferous", 298.9, 358.9, Color(103, 165, 153)),
    period("Devonian", 358.9, 419.2, Color(203, 140, 55)),
    period("Silurian", 419.2, 443.8, Color(179, 225, 182)),
    period("Ordovician", 443.8, 485.4, Color(0, 146, 112)),
    period("Cambrian", 485.4, 538.8, Color(127, 160, 86)),
];

/// Periods overlapping `[0, root_age]`, with the oldest one clipped at `root_age`.
pub fn bands(root_age: f64) -> Vec<Period> {
    PERIODS
        .iter()
        .filter(|p| p.start < root_age)
        .map(|p| Period {
            end: p.end.min(root_age),
            ..*p
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn given_root_in_cretaceous_when_banding_then_oldest_band_is_clipped() {
        let bands = bands(100.0);

        let names: Vec<&str> = bands.iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Quaternary", "Neogene", "Paleogene", "Cretaceous"]);
        assert_relative_eq!(bands[3].end, 100.0);
        assert_relative_eq!(bands[2].end, 66.0);
    }

    #[test]
    fn given_periods_when_listed_then_boundaries_are_contiguous() {
        for pair in PERIODS.windows(2) {
            assert_relative_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn given_zero_root_age_when_banding_then_empty() {
        assert!(bands(0.0).is_empty());
    }
}
