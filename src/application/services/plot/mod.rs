//! Axis-scaled timetree plots
//!
//! The timetree is drawn as a rectangular phylogram with the root on the left
//! and the tips at the present on the right. The time axis below the tree is
//! reversed: tick labels show ages counting back from the present.

pub mod axis;
mod figure;
pub mod geoscale;
mod layout;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{DomainError, Timetree, ValidationError};
use crate::infrastructure::traits::FileSystem;

pub use figure::{Color, Figure, Shape, TextAnchor};
pub use layout::Layout;

use axis::{axis_ticks, MAX_TICKS};
use figure::text_width;

const MARGIN: f64 = 24.0;
const TIP_FONT: f64 = 9.0;
const AXIS_FONT: f64 = 8.0;
const BAND_FONT: f64 = 7.0;
const BAND_HEIGHT: f64 = 14.0;
const AXIS_AREA: f64 = 40.0;

/// Plot parameters; intervals are in the time unit of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotOptions {
    pub minor_interval: f64,
    pub major_interval: f64,
    /// Page width in points
    pub width: f64,
    /// Page height in points
    pub height: f64,
    pub axis_label: String,
    pub geoscale: bool,
}

impl Default for PlotOptions {
    /// A4 landscape.
    fn default() -> Self {
        Self {
            minor_interval: 5.0,
            major_interval: 25.0,
            width: 842.0,
            height: 595.0,
            axis_label: "Time (Ma)".to_string(),
            geoscale: true,
        }
    }
}

impl PlotOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("minor_interval", self.minor_interval),
            ("major_interval", self.major_interval),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::Parameter {
                    name,
                    message: format!("must be positive and finite, got {}", value),
                });
            }
        }
        if self.major_interval < self.minor_interval {
            return Err(ValidationError::Parameter {
                name: "major_interval",
                message: format!(
                    "{} is smaller than minor_interval {}",
                    self.major_interval, self.minor_interval
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotFormat {
    Pdf,
    Svg,
}

impl PlotFormat {
    pub fn from_path(path: &Path) -> ApplicationResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(PlotFormat::Pdf),
            Some("svg") => Ok(PlotFormat::Svg),
            _ => Err(ApplicationError::config(format!(
                "unsupported plot format for {}, expected .pdf or .svg",
                path.display()
            ))),
        }
    }
}

/// Lays out a timetree and draws it on one page.
#[instrument(level = "debug", skip_all, fields(tips = timetree.tree.tip_count()))]
pub fn render(timetree: &Timetree, options: &PlotOptions) -> Result<Figure, ValidationError> {
    options.validate()?;
    let layout = Layout::of(&timetree.tree);
    let root_age = layout.root_age;
    if !root_age.is_finite() || root_age <= 0.0 {
        return Err(ValidationError::Parameter {
            name: "root_age",
            message: format!("cannot scale an axis to root age {}", root_age),
        });
    }
    if root_age / options.minor_interval > MAX_TICKS as f64 {
        return Err(ValidationError::Parameter {
            name: "minor_interval",
            message: format!(
                "{} yields more than {} ticks over {}",
                options.minor_interval, MAX_TICKS, root_age
            ),
        });
    }

    let label_width = layout
        .tips()
        .filter_map(|t| t.label.as_deref())
        .map(|l| text_width(l, TIP_FONT))
        .fold(0.0, f64::max);
    let left = MARGIN;
    let right = (options.width - MARGIN - label_width - 6.0).max(left + 1.0);
    let top = MARGIN;
    let axis_y = options.height - AXIS_AREA;
    let band_space = if options.geoscale { BAND_HEIGHT + 6.0 } else { 6.0 };
    let bottom = (axis_y - band_space).max(top + 1.0);

    let sx = |pos: f64| left + pos / root_age * (right - left);
    let row_step = (bottom - top) / (layout.tip_count.saturating_sub(1).max(1)) as f64;
    let sy = |row: f64| top + row * row_step;

    let mut fig = Figure::new(options.width, options.height);

    for node in &layout.nodes {
        let y = sy(node.row);
        if let Some((parent_x, _)) = node.parent.and_then(|p| layout.position(p)) {
            fig.line((sx(parent_x), y), (sx(node.x), y), 1.0, Color::BLACK);
        }
        if node.is_tip {
            if let Some(label) = &node.label {
                fig.text((sx(node.x) + 4.0, y + 3.0), label.clone(), TIP_FONT, TextAnchor::Start);
            }
        }
    }
    for (idx, node) in timetree.tree.iter().filter(|(_, n)| !n.is_tip()) {
        let rows: Vec<f64> = node
            .children
            .iter()
            .filter_map(|c| layout.position(*c))
            .map(|(_, row)| row)
            .collect();
        if let (Some((x, _)), Some(lo), Some(hi)) = (
            layout.position(idx),
            rows.iter().copied().reduce(f64::min),
            rows.iter().copied().reduce(f64::max),
        ) {
            fig.line((sx(x), sy(lo)), (sx(x), sy(hi)), 1.0, Color::BLACK);
        }
    }

    if options.geoscale {
        let band_top = axis_y - BAND_HEIGHT;
        for period in geoscale::bands(root_age) {
            let x0 = sx(root_age - period.end);
            let x1 = sx(root_age - period.start);
            fig.rect(x0, band_top, x1 - x0, BAND_HEIGHT, period.color);
            if x1 - x0 > text_width(period.name, BAND_FONT) + 2.0 {
                fig.text(
                    ((x0 + x1) / 2.0, band_top + BAND_HEIGHT - 4.0),
                    period.name,
                    BAND_FONT,
                    TextAnchor::Middle,
                );
            }
        }
    }

    let ticks = axis_ticks(root_age, options.minor_interval, options.major_interval);
    fig.line((sx(0.0), axis_y), (sx(root_age), axis_y), 0.8, Color::BLACK);
    for tick in &ticks.minor {
        let x = sx(tick.position);
        fig.line((x, axis_y), (x, axis_y + 3.0), 0.5, Color::GREY);
    }
    for tick in &ticks.major {
        let x = sx(tick.position);
        fig.line((x, axis_y), (x, axis_y + 6.0), 0.8, Color::BLACK);
        fig.text((x, axis_y + 15.0), tick.label(), AXIS_FONT, TextAnchor::Middle);
    }
    fig.text(
        ((sx(0.0) + sx(root_age)) / 2.0, axis_y + 30.0),
        options.axis_label.clone(),
        TIP_FONT,
        TextAnchor::Middle,
    );

    debug!(
        shapes = fig.shapes.len(),
        minor = ticks.minor.len(),
        major = ticks.major.len(),
        "rendered timetree figure"
    );
    Ok(fig)
}

/// Renders timetrees to PDF or SVG files.
pub struct PlotService {
    fs: Arc<dyn FileSystem>,
}

impl PlotService {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    #[instrument(level = "debug", skip(self, timetree, options))]
    pub fn plot(&self, timetree: &Timetree, path: &Path, options: &PlotOptions) -> ApplicationResult<()> {
        let format = PlotFormat::from_path(path)?;
        let figure = render(timetree, options).map_err(DomainError::from)?;
        let bytes = match format {
            PlotFormat::Pdf => figure.to_pdf(),
            PlotFormat::Svg => figure.to_svg().into_bytes(),
        };
        self.fs
            .ensure_parent(path)
            .with_path_context("create directory for", path)?;
        self.fs
            .write_atomic(path, &bytes)
            .with_path_context("write plot", path)?;
        info!("wrote {:?} plot to {}", format, path.display());
        Ok(())
    }
}
