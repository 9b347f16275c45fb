//! End-to-end runs of the five-taxon example through the service pipeline.

use std::path::Path;

use approx::assert_relative_eq;
use tempfile::TempDir;

use timetree::application::services::Prepared;
use timetree::application::ApplicationError;
use timetree::config::Settings;
use timetree::domain::{
    parse_newick, parse_nexus, Anchor, ErrorKind, PhyloTree, RateModel,
};
use timetree::infrastructure::di::ServiceContainer;
use timetree::util::testing::{five_tip_fixture, init_test_setup, write_fixture};

fn load(run: &Path) -> Settings {
    Settings::load_layers(None, Some(run), Some(config::Map::new())).unwrap()
}

fn ingroup() -> Vec<String> {
    ["Sp_A", "Sp_B", "Sp_C", "Sp_D"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn assert_ultrametric(tree: &PhyloTree) {
    let height = tree.height();
    for tip in tree.tips() {
        assert_relative_eq!(tree.distance_from_root(tip), height, max_relative = 1e-6);
    }
}

#[test]
fn given_five_taxon_example_when_running_then_ages_respect_bounds_and_order() {
    init_test_setup();
    let dir = TempDir::new().unwrap();
    let run = five_tip_fixture(dir.path());
    let settings = load(&run);
    let container = ServiceContainer::new(settings);

    let summary = container.pipeline().run(&container.settings).unwrap();

    let timetree = &summary.timetree;
    for record in &summary.table {
        let age = timetree.age(record.node).unwrap();
        let slack = 1e-6 * record.max_age.max(1.0);
        assert!(
            age >= record.min_age - slack && age <= record.max_age + slack,
            "{} age {} outside [{}, {}]",
            record.anchor,
            age,
            record.min_age,
            record.max_age
        );
    }
    let age_of = |anchor: &Anchor| {
        let record = summary
            .table
            .iter()
            .find(|r| &r.anchor == anchor)
            .unwrap();
        timetree.age(record.node).unwrap()
    };
    let root = age_of(&Anchor::Root);
    let crown = age_of(&Anchor::Mrca(ingroup()));
    let ab = age_of(&Anchor::Mrca(vec!["Sp_A".into(), "Sp_B".into()]));
    let cd = age_of(&Anchor::Mrca(vec!["Sp_C".into(), "Sp_D".into()]));
    assert!(crown <= root);
    assert!(crown >= ab && crown >= cd);
    assert_relative_eq!(timetree.root_age(), root, max_relative = 1e-9);
    assert_ultrametric(&timetree.tree);
}

#[test]
fn given_five_taxon_example_when_running_then_topology_and_labels_are_kept() {
    let dir = TempDir::new().unwrap();
    let run = five_tip_fixture(dir.path());
    let settings = load(&run);
    let container = ServiceContainer::new(settings);
    let pipeline = container.pipeline();
    let Prepared { tree: rooted, .. } = pipeline.prepare(&container.settings).unwrap();

    let summary = pipeline.run(&container.settings).unwrap();

    assert!(summary.timetree.tree.same_topology(&rooted));
    let mut labels = summary.timetree.tree.tip_labels();
    labels.sort();
    assert_eq!(labels, vec!["Sp_0", "Sp_A", "Sp_B", "Sp_C", "Sp_D"]);
}

#[test]
fn given_written_outputs_when_reading_back_then_newick_and_nexus_round_trip() {
    let dir = TempDir::new().unwrap();
    let run = five_tip_fixture(dir.path());
    let container = ServiceContainer::new(load(&run));

    let summary = container.pipeline().run(&container.settings).unwrap();

    let newick = std::fs::read_to_string(&summary.outputs.newick).unwrap();
    let nexus = std::fs::read_to_string(&summary.outputs.nexus).unwrap();
    let from_newick = parse_newick(&newick, "out.tree").unwrap();
    let from_nexus = parse_nexus(&nexus, "out.nex").unwrap();
    assert!(from_newick.same_topology(&summary.timetree.tree));
    assert!(from_nexus.same_topology(&summary.timetree.tree));
    assert_relative_eq!(from_newick.height(), summary.timetree.root_age(), max_relative = 1e-12);
    assert_relative_eq!(from_nexus.height(), summary.timetree.root_age(), max_relative = 1e-12);
    assert!(summary.outputs.plot.ends_with("out/timetree.pdf"));
    assert!(std::fs::read(&summary.outputs.plot).unwrap().starts_with(b"%PDF"));
}

#[test]
fn given_strict_override_when_running_then_report_names_strict_model() {
    let dir = TempDir::new().unwrap();
    let run = five_tip_fixture(dir.path());
    let mut settings = load(&run);
    settings.apply_overrides(&timetree::config::Overrides {
        model: Some(RateModel::Strict),
        smoothing: None,
        stem: Some(dir.path().join("strict").join("tt")),
    });
    let container = ServiceContainer::new(settings);

    let summary = container.pipeline().run(&container.settings).unwrap();

    assert_eq!(summary.timetree.report.model, RateModel::Strict);
    let rates: Vec<f64> = summary.timetree.rates.values().copied().collect();
    for rate in &rates {
        assert_relative_eq!(*rate, rates[0], max_relative = 1e-12);
    }
    assert!(dir.path().join("strict").join("tt.tree").exists());
}

#[test]
fn given_unknown_anchor_taxon_when_running_then_config_error_and_no_outputs() {
    let dir = TempDir::new().unwrap();
    five_tip_fixture(dir.path());
    let run = write_fixture(
        dir.path(),
        "bad.toml",
        r#"tree = "phylogram.tree"
outgroup = ["Sp_0"]

[[calibration]]
taxa = ["Sp_A", "Sp_X"]
min = 1.0
max = 2.0
"#,
    );
    let container = ServiceContainer::new(load(&run));

    let err = container.pipeline().run(&container.settings).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("Sp_X"));
    assert!(!dir.path().join("timetree.tree").exists());
}

#[test]
fn given_crossed_bounds_when_running_then_validation_error_names_position() {
    let dir = TempDir::new().unwrap();
    five_tip_fixture(dir.path());
    let run = write_fixture(
        dir.path(),
        "crossed.toml",
        r#"tree = "phylogram.tree"
outgroup = ["Sp_0"]

[[calibration]]
anchor = "root"
min = 100.0
max = 160.0

[[calibration]]
taxa = ["Sp_A", "Sp_B"]
min = 13.3
max = 6.3
"#,
    );
    let container = ServiceContainer::new(load(&run));

    let err = container.pipeline().run(&container.settings).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("#2"));
}

#[test]
fn given_output_under_regular_file_when_running_then_io_error_and_no_partial_files() {
    let dir = TempDir::new().unwrap();
    let run = five_tip_fixture(dir.path());
    let blocker = write_fixture(dir.path(), "blocker", "");
    let mut settings = load(&run);
    settings.output.stem = blocker.join("timetree");
    let container = ServiceContainer::new(settings);

    let err = container.pipeline().run(&container.settings).unwrap_err();

    assert!(matches!(err, ApplicationError::OperationFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::Io);
    let mut leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    leftovers.sort();
    assert_eq!(leftovers, vec!["blocker", "phylogram.tree", "run.toml"]);
}
