//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/timetree/timetree.toml` (`[estimator]` and `[plot]` only)
//! 3. Run file: the TOML file passed to `timetree run`
//! 4. Environment variables: `TIMETREE_*` prefix, `__` between nesting levels
//! 5. CLI flags (`Settings::apply_overrides`)

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::services::PlotOptions;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{expand_env_vars, Anchor, CalibrationSpec, EstimatorParams, RateModel};

const ENV_PREFIX: &str = "TIMETREE";

/// Where the timetree files go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputSettings {
    /// Common path prefix; `.tree`, `.nex` and `.pdf` are appended
    pub stem: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newick: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nexus: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            stem: PathBuf::from("timetree"),
            newick: None,
            nexus: None,
            plot: None,
        }
    }
}

impl OutputSettings {
    pub fn newick_path(&self) -> PathBuf {
        self.newick.clone().unwrap_or_else(|| self.stem_with("tree"))
    }

    pub fn nexus_path(&self) -> PathBuf {
        self.nexus.clone().unwrap_or_else(|| self.stem_with("nex"))
    }

    pub fn plot_path(&self) -> PathBuf {
        self.plot.clone().unwrap_or_else(|| self.stem_with("pdf"))
    }

    /// Appends rather than replaces, so `run.v2` becomes `run.v2.tree`.
    fn stem_with(&self, ext: &str) -> PathBuf {
        let mut name: OsString = self.stem.clone().into_os_string();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }
}

/// One `[[calibration]]` entry of a run file.
///
/// Exactly one of `anchor = "root"` or `taxa = [...]` must be given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CalibrationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxa: Option<Vec<String>>,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub soft: bool,
}

impl CalibrationEntry {
    /// `position` is 1-based.
    pub fn to_spec(&self, position: usize) -> ApplicationResult<CalibrationSpec> {
        let anchor = match (&self.anchor, &self.taxa) {
            (Some(anchor), None) if anchor.eq_ignore_ascii_case("root") => Anchor::Root,
            (Some(anchor), None) => {
                return Err(ApplicationError::config(format!(
                    "calibration #{}: unknown anchor '{}', expected \"root\" or a taxa list",
                    position, anchor
                )))
            }
            (None, Some(taxa)) => Anchor::Mrca(taxa.clone()),
            (Some(_), Some(_)) => {
                return Err(ApplicationError::config(format!(
                    "calibration #{}: give either anchor or taxa, not both",
                    position
                )))
            }
            (None, None) => {
                return Err(ApplicationError::config(format!(
                    "calibration #{}: missing anchor or taxa",
                    position
                )))
            }
        };
        Ok(CalibrationSpec {
            anchor,
            min_age: self.min,
            max_age: self.max,
            soft: self.soft,
        })
    }
}

/// Raw estimator section; `None` means "not specified, inherit".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawEstimator {
    pub smoothing: Option<f64>,
    pub model: Option<RateModel>,
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub soft_bound_weight: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawPlot {
    pub minor_interval: Option<f64>,
    pub major_interval: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub axis_label: Option<String>,
    pub geoscale: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawOutput {
    pub stem: Option<PathBuf>,
    pub newick: Option<PathBuf>,
    pub nexus: Option<PathBuf>,
    pub plot: Option<PathBuf>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub tree: Option<PathBuf>,
    pub outgroup: Option<Vec<String>>,
    pub output: RawOutput,
    pub estimator: RawEstimator,
    pub plot: RawPlot,
    #[serde(rename = "calibration")]
    pub calibrations: Option<Vec<CalibrationEntry>>,
}

impl RawSettings {
    fn has_run_fields(&self) -> bool {
        self.tree.is_some()
            || self.outgroup.is_some()
            || self.calibrations.is_some()
            || self.output.stem.is_some()
            || self.output.newick.is_some()
            || self.output.nexus.is_some()
            || self.output.plot.is_some()
    }
}

/// CLI flags that override every other layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub model: Option<RateModel>,
    pub smoothing: Option<f64>,
    pub stem: Option<PathBuf>,
}

/// Effective run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Phylogram to date (Newick or Nexus)
    pub tree: PathBuf,
    /// Taxa the tree is rooted on, required for a run
    pub outgroup: Vec<String>,
    pub output: OutputSettings,
    pub estimator: EstimatorParams,
    pub plot: PlotOptions,
    #[serde(rename = "calibration")]
    pub calibrations: Vec<CalibrationEntry>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tree: PathBuf::new(),
            outgroup: Vec::new(),
            output: OutputSettings::default(),
            estimator: EstimatorParams::default(),
            plot: PlotOptions::default(),
            calibrations: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

/// Get the XDG config directory for timetree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "timetree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("timetree.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> ApplicationResult<RawSettings> {
    let content = std::fs::read_to_string(path).with_path_context("read config", path)?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// Without a run file only the defaults, the global config and the
    /// environment apply (used by `timetree config show`).
    pub fn load(run_file: Option<&Path>) -> ApplicationResult<Self> {
        let global = global_config_path().filter(|p| p.exists());
        Self::load_layers(global.as_deref(), run_file, None)
    }

    /// Layered load with explicit sources.
    ///
    /// `env` replaces the process environment when given.
    pub fn load_layers(
        global: Option<&Path>,
        run_file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> ApplicationResult<Self> {
        let mut current = Self::default();

        if let Some(global_path) = global {
            let raw = load_raw_settings(global_path)?;
            if raw.has_run_fields() {
                warn!(
                    "{}: only [estimator] and [plot] are read from the global config",
                    global_path.display()
                );
            }
            current = current.apply_global(&raw);
        }

        if let Some(run_file) = run_file {
            let raw = load_raw_settings(run_file)?;
            if raw.tree.is_none() {
                return Err(ApplicationError::config(format!(
                    "{}: missing required key 'tree'",
                    run_file.display()
                )));
            }
            current = current.merge_with(&raw);
            current.base_dir = match run_file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
        }

        current = current.apply_env_overrides(env)?;
        current.expand_paths();
        current.resolve_paths();
        debug!(tree = %current.tree.display(), calibrations = current.calibrations.len(), "settings loaded");
        Ok(current)
    }

    /// Apply the global config onto defaults. Run-specific keys are ignored.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            estimator: merge_estimator(&self.estimator, &global.estimator),
            plot: merge_plot(&self.plot, &global.plot),
            ..self.clone()
        }
    }

    /// Merge a run file onto self (base). Calibrations are replaced, never appended.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            tree: overlay.tree.clone().unwrap_or_else(|| self.tree.clone()),
            outgroup: overlay
                .outgroup
                .clone()
                .unwrap_or_else(|| self.outgroup.clone()),
            output: OutputSettings {
                stem: overlay
                    .output
                    .stem
                    .clone()
                    .unwrap_or_else(|| self.output.stem.clone()),
                newick: overlay.output.newick.clone().or_else(|| self.output.newick.clone()),
                nexus: overlay.output.nexus.clone().or_else(|| self.output.nexus.clone()),
                plot: overlay.output.plot.clone().or_else(|| self.output.plot.clone()),
            },
            estimator: merge_estimator(&self.estimator, &overlay.estimator),
            plot: merge_plot(&self.plot, &overlay.plot),
            calibrations: overlay
                .calibrations
                .clone()
                .unwrap_or_else(|| self.calibrations.clone()),
            base_dir: self.base_dir.clone(),
        }
    }

    /// Apply TIMETREE_* environment variables as explicit overrides.
    ///
    /// Keys nest with `__`: `TIMETREE_ESTIMATOR__SMOOTHING`, `TIMETREE_PLOT__GEOSCALE`.
    /// `TIMETREE_OUTGROUP` takes a comma separated list.
    fn apply_env_overrides(
        mut self,
        source: Option<config::Map<String, String>>,
    ) -> ApplicationResult<Self> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("outgroup")
                    .source(source),
            )
            .build()
            .map_err(config_err)?;

        if let Some(val) = optional(config.get_string("tree"))? {
            self.tree = PathBuf::from(val);
        }
        if let Some(val) = optional(config.get::<Vec<String>>("outgroup"))? {
            self.outgroup = val;
        }
        if let Some(val) = optional(config.get_string("output.stem"))? {
            self.output.stem = PathBuf::from(val);
        }

        let est = &mut self.estimator;
        if let Some(val) = optional(config.get_float("estimator.smoothing"))? {
            est.smoothing = val;
        }
        if let Some(val) = optional(config.get_string("estimator.model"))? {
            est.model = val.parse().map_err(ApplicationError::config)?;
        }
        if let Some(val) = optional(config.get::<usize>("estimator.max_iterations"))? {
            est.max_iterations = val;
        }
        if let Some(val) = optional(config.get_float("estimator.tolerance"))? {
            est.tolerance = val;
        }
        if let Some(val) = optional(config.get_float("estimator.soft_bound_weight"))? {
            est.soft_bound_weight = val;
        }

        let plot = &mut self.plot;
        if let Some(val) = optional(config.get_float("plot.minor_interval"))? {
            plot.minor_interval = val;
        }
        if let Some(val) = optional(config.get_float("plot.major_interval"))? {
            plot.major_interval = val;
        }
        if let Some(val) = optional(config.get_float("plot.width"))? {
            plot.width = val;
        }
        if let Some(val) = optional(config.get_float("plot.height"))? {
            plot.height = val;
        }
        if let Some(val) = optional(config.get_string("plot.axis_label"))? {
            plot.axis_label = val;
        }
        if let Some(val) = optional(config.get_bool("plot.geoscale"))? {
            plot.geoscale = val;
        }

        Ok(self)
    }

    /// Apply CLI flags. A stem given here is taken relative to the working directory.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(model) = overrides.model {
            self.estimator.model = model;
        }
        if let Some(smoothing) = overrides.smoothing {
            self.estimator.smoothing = smoothing;
        }
        if let Some(stem) = &overrides.stem {
            self.output.stem = PathBuf::from(expand_env_vars(&stem.to_string_lossy()));
        }
    }

    /// Expand `~`, `$VAR` and `${VAR}` in path fields.
    fn expand_paths(&mut self) {
        let expand = |p: &Path| PathBuf::from(expand_env_vars(&p.to_string_lossy()));
        if !self.tree.as_os_str().is_empty() {
            self.tree = expand(&self.tree);
        }
        self.output.stem = expand(&self.output.stem);
        for path in [
            &mut self.output.newick,
            &mut self.output.nexus,
            &mut self.output.plot,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand(path);
        }
    }

    /// Resolve relative paths against `base_dir`.
    fn resolve_paths(&mut self) {
        let base = self.base_dir.clone();
        let resolve = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };
        if !self.tree.as_os_str().is_empty() {
            self.tree = resolve(&self.tree);
        }
        self.output.stem = resolve(&self.output.stem);
        for path in [
            &mut self.output.newick,
            &mut self.output.nexus,
            &mut self.output.plot,
        ]
        .into_iter()
        .flatten()
        {
            *path = resolve(path);
        }
    }

    /// Calibration entries as domain specs, in declaration order.
    pub fn calibration_specs(&self) -> ApplicationResult<Vec<CalibrationSpec>> {
        self.calibrations
            .iter()
            .enumerate()
            .map(|(i, entry)| entry.to_spec(i + 1))
            .collect()
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> ApplicationResult<String> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template run file.
    pub fn template() -> String {
        r#"# timetree run file
#
# Layers (by precedence, lowest to highest):
#   Global: ~/.config/timetree/timetree.toml  ([estimator] and [plot] defaults only)
#   Run:    this file
#   Env:    TIMETREE_* variables, e.g. TIMETREE_ESTIMATOR__SMOOTHING=10
#   CLI:    timetree run --model/--smoothing/--stem
#
# Relative paths are resolved against the directory of this file.

# Phylogram in Newick or Nexus format (required)
tree = "phylogram.tree"

# Taxa to root on; leave empty to keep the input rooting
outgroup = ["Sp_0"]

[output]
# Writes <stem>.tree, <stem>.nex and <stem>.pdf
stem = "out/timetree"
# newick = "out/dated.tree"
# nexus = "out/dated.nex"
# plot = "out/dated.svg"

[estimator]
# model = "relaxed"          # "strict" | "relaxed"
# smoothing = 1.0            # rate-change penalty (lambda), relaxed model only
# max_iterations = 1000
# tolerance = 1e-8
# soft_bound_weight = 1000.0

[plot]
# minor_interval = 5.0
# major_interval = 25.0
# width = 842.0
# height = 595.0
# axis_label = "Time (Ma)"
# geoscale = true

[[calibration]]
anchor = "root"
min = 100.0
max = 160.0

[[calibration]]
taxa = ["Sp_A", "Sp_B"]
min = 6.3
max = 13.3
soft = false
"#
        .to_string()
    }
}

fn merge_estimator(base: &EstimatorParams, overlay: &RawEstimator) -> EstimatorParams {
    EstimatorParams {
        smoothing: overlay.smoothing.unwrap_or(base.smoothing),
        model: overlay.model.unwrap_or(base.model),
        max_iterations: overlay.max_iterations.unwrap_or(base.max_iterations),
        tolerance: overlay.tolerance.unwrap_or(base.tolerance),
        soft_bound_weight: overlay.soft_bound_weight.unwrap_or(base.soft_bound_weight),
    }
}

fn merge_plot(base: &PlotOptions, overlay: &RawPlot) -> PlotOptions {
    PlotOptions {
        minor_interval: overlay.minor_interval.unwrap_or(base.minor_interval),
        major_interval: overlay.major_interval.unwrap_or(base.major_interval),
        width: overlay.width.unwrap_or(base.width),
        height: overlay.height.unwrap_or(base.height),
        axis_label: overlay
            .axis_label
            .clone()
            .unwrap_or_else(|| base.axis_label.clone()),
        geoscale: overlay.geoscale.unwrap_or(base.geoscale),
    }
}

/// Absent keys are `None`; present but malformed values are errors.
fn optional<T>(result: Result<T, ConfigError>) -> ApplicationResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(config_err(e)),
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn no_env() -> Option<config::Map<String, String>> {
        Some(config::Map::new())
    }

    #[test]
    fn given_no_layers_when_loading_then_uses_defaults() {
        let settings = Settings::load_layers(None, None, no_env()).unwrap();

        assert_eq!(settings.estimator, EstimatorParams::default());
        assert_eq!(settings.plot, PlotOptions::default());
        assert_eq!(settings.output.newick_path(), PathBuf::from("./timetree.tree"));
        assert!(settings.calibrations.is_empty());
    }

    #[test]
    fn given_stem_when_deriving_outputs_then_extensions_are_appended() {
        let output = OutputSettings {
            stem: PathBuf::from("out/run.v2"),
            plot: Some(PathBuf::from("fig.svg")),
            ..OutputSettings::default()
        };

        assert_eq!(output.newick_path(), PathBuf::from("out/run.v2.tree"));
        assert_eq!(output.nexus_path(), PathBuf::from("out/run.v2.nex"));
        assert_eq!(output.plot_path(), PathBuf::from("fig.svg"));
    }

    #[rstest]
    #[case(Some("root"), None, true)]
    #[case(Some("ROOT"), None, true)]
    #[case(None, Some(vec!["A", "B"]), true)]
    #[case(Some("crown"), None, false)]
    #[case(Some("root"), Some(vec!["A", "B"]), false)]
    #[case(None, None, false)]
    fn given_entry_when_converting_then_exactly_one_anchor_form_is_accepted(
        #[case] anchor: Option<&str>,
        #[case] taxa: Option<Vec<&str>>,
        #[case] ok: bool,
    ) {
        let entry = CalibrationEntry {
            anchor: anchor.map(str::to_string),
            taxa: taxa.map(|t| t.into_iter().map(str::to_string).collect()),
            min: 1.0,
            max: 2.0,
            soft: false,
        };

        let result = entry.to_spec(3);

        assert_eq!(result.is_ok(), ok);
        if let Err(e) = result {
            assert!(e.to_string().contains("calibration #3"));
        }
    }

    #[test]
    fn given_global_with_run_keys_when_applying_then_only_estimator_and_plot_apply() {
        let raw: RawSettings = toml::from_str(
            r#"
tree = "ignored.tree"
[estimator]
smoothing = 10.0
[plot]
geoscale = false
"#,
        )
        .unwrap();

        let settings = Settings::default().apply_global(&raw);

        assert_eq!(settings.tree, PathBuf::new());
        assert_relative_eq!(settings.estimator.smoothing, 10.0);
        assert!(!settings.plot.geoscale);
    }

    #[test]
    fn given_env_map_when_overriding_then_nested_keys_apply() {
        let env: config::Map<String, String> = [
            ("TIMETREE_ESTIMATOR__SMOOTHING", "2.5"),
            ("TIMETREE_ESTIMATOR__MODEL", "strict"),
            ("TIMETREE_PLOT__GEOSCALE", "false"),
            ("TIMETREE_OUTGROUP", "Sp_0,Sp_1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = Settings::default().apply_env_overrides(Some(env)).unwrap();

        assert_relative_eq!(settings.estimator.smoothing, 2.5);
        assert_eq!(settings.estimator.model, RateModel::Strict);
        assert!(!settings.plot.geoscale);
        assert_eq!(settings.outgroup, vec!["Sp_0", "Sp_1"]);
    }

    #[test]
    fn given_bad_env_model_when_overriding_then_config_error() {
        let env: config::Map<String, String> = [("TIMETREE_ESTIMATOR__MODEL", "bayesian")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let err = Settings::default().apply_env_overrides(Some(env)).unwrap_err();

        assert!(err.to_string().contains("bayesian"));
    }

    #[test]
    fn given_tilde_in_tree_when_loading_then_expands_to_home() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run.toml");
        fs::write(&run, "tree = \"~/data/phylogram.tree\"\n").unwrap();

        let settings = Settings::load_layers(None, Some(&run), no_env()).unwrap();

        let home = std::env::var("HOME").expect("HOME should be set");
        assert!(settings.tree.starts_with(&home));
        // relative stem resolved next to the run file
        assert_eq!(settings.output.stem, dir.path().join("timetree"));
    }

    #[test]
    fn given_run_file_without_tree_when_loading_then_config_error() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("run.toml");
        fs::write(&run, "outgroup = [\"Sp_0\"]\n").unwrap();

        let err = Settings::load_layers(None, Some(&run), no_env()).unwrap_err();

        assert!(matches!(err, ApplicationError::Config { .. }));
        assert!(err.to_string().contains("tree"));
    }

    #[test]
    fn given_settings_when_rendering_toml_then_it_parses_back() {
        let mut settings = Settings::default();
        settings.tree = PathBuf::from("/data/phylogram.tree");
        settings.calibrations = vec![CalibrationEntry {
            anchor: Some("root".into()),
            taxa: None,
            min: 100.0,
            max: 160.0,
            soft: false,
        }];

        let text = settings.to_toml().unwrap();
        let back: RawSettings = toml::from_str(&text).unwrap();

        assert_eq!(back.tree, Some(PathBuf::from("/data/phylogram.tree")));
        assert_eq!(back.calibrations.map(|c| c.len()), Some(1));
        assert_eq!(back.estimator.model, Some(RateModel::Relaxed));
    }

    #[test]
    fn given_template_when_parsed_then_it_is_a_valid_run_file() {
        let raw: RawSettings = toml::from_str(&Settings::template()).unwrap();

        assert_eq!(raw.tree, Some(PathBuf::from("phylogram.tree")));
        assert_eq!(raw.calibrations.map(|c| c.len()), Some(2));
    }
}
