//! Layered settings: defaults < global < run file < environment < CLI flags.

use std::path::PathBuf;

use approx::assert_relative_eq;
use tempfile::TempDir;

use timetree::config::{Overrides, Settings};
use timetree::domain::RateModel;
use timetree::util::testing::write_fixture;

fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn given_all_layers_when_loading_then_later_layers_win() {
    let dir = TempDir::new().unwrap();
    let global = write_fixture(
        dir.path(),
        "global.toml",
        r#"
[estimator]
smoothing = 5.0
tolerance = 1e-6
model = "strict"

[plot]
geoscale = false
minor_interval = 2.0
"#,
    );
    let run = write_fixture(
        dir.path(),
        "project/run.toml",
        r#"tree = "data/phylogram.tree"

[estimator]
smoothing = 7.0

[plot]
minor_interval = 1.0
"#,
    );

    let mut settings = Settings::load_layers(
        Some(&global),
        Some(&run),
        env(&[("TIMETREE_ESTIMATOR__SMOOTHING", "9")]),
    )
    .unwrap();

    // env beats run file beats global
    assert_relative_eq!(settings.estimator.smoothing, 9.0);
    // run file beats global
    assert_relative_eq!(settings.plot.minor_interval, 1.0);
    // global beats defaults where nothing later speaks
    assert_relative_eq!(settings.estimator.tolerance, 1e-6);
    assert_eq!(settings.estimator.model, RateModel::Strict);
    assert!(!settings.plot.geoscale);
    assert_eq!(settings.estimator.max_iterations, 1000);

    settings.apply_overrides(&Overrides {
        model: Some(RateModel::Relaxed),
        smoothing: Some(11.0),
        stem: None,
    });
    assert_relative_eq!(settings.estimator.smoothing, 11.0);
    assert_eq!(settings.estimator.model, RateModel::Relaxed);
}

#[test]
fn given_relative_paths_when_loading_then_resolved_against_run_file_directory() {
    let dir = TempDir::new().unwrap();
    let run = write_fixture(
        dir.path(),
        "project/run.toml",
        r#"tree = "data/phylogram.tree"

[output]
stem = "out/dated"
plot = "figures/dated.svg"
"#,
    );

    let settings = Settings::load_layers(None, Some(&run), env(&[])).unwrap();

    let project = dir.path().join("project");
    assert_eq!(settings.tree, project.join("data/phylogram.tree"));
    assert_eq!(settings.output.newick_path(), project.join("out/dated.tree"));
    assert_eq!(settings.output.nexus_path(), project.join("out/dated.nex"));
    assert_eq!(settings.output.plot_path(), project.join("figures/dated.svg"));
}

#[test]
fn given_global_without_run_file_when_loading_then_run_keys_stay_default() {
    let dir = TempDir::new().unwrap();
    let global = write_fixture(
        dir.path(),
        "global.toml",
        "tree = \"/elsewhere/tree.nwk\"\n[plot]\nwidth = 600.0\n",
    );

    let settings = Settings::load_layers(Some(&global), None, env(&[])).unwrap();

    assert_eq!(settings.tree, PathBuf::new());
    assert_relative_eq!(settings.plot.width, 600.0);
}

#[test]
fn given_unknown_calibration_key_when_loading_then_config_error_names_file() {
    let dir = TempDir::new().unwrap();
    let run = write_fixture(
        dir.path(),
        "run.toml",
        "tree = \"t.tree\"\n[[calibration]]\nanchor = \"root\"\nmin = 1.0\nmax = 2.0\nmaxx = 3.0\n",
    );

    let err = Settings::load_layers(None, Some(&run), env(&[])).unwrap_err();

    assert!(err.to_string().contains("run.toml"));
    assert!(err.to_string().contains("maxx"));
}

#[test]
fn given_missing_run_file_when_loading_then_io_error_names_path() {
    let dir = TempDir::new().unwrap();
    let run = dir.path().join("absent.toml");

    let err = Settings::load_layers(None, Some(&run), env(&[])).unwrap_err();

    assert!(err.to_string().contains("absent.toml"));
}
