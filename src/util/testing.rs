//! Test support: one-time logging setup and the five-taxon fixture.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

static TEST_SETUP: Once = Once::new();

/// Phylogram of the five-taxon example, rooted arbitrarily; `Sp_0` is the outgroup.
pub const FIVE_TIP_PHYLOGRAM: &str =
    "((Sp_A:0.05,Sp_B:0.06):0.1,((Sp_C:0.04,Sp_D:0.03):0.12,Sp_0:0.5):0.02);";

/// Run file for [`FIVE_TIP_PHYLOGRAM`]: root 100-160, (Sp_A,Sp_B) 6.3-13.3,
/// (Sp_C,Sp_D) 4.25-8.87, ingroup 23-36.5, all hard.
pub const FIVE_TIP_RUN_FILE: &str = r#"tree = "phylogram.tree"
outgroup = ["Sp_0"]

[output]
stem = "out/timetree"

[estimator]
max_iterations = 5000

[plot]
minor_interval = 5.0
major_interval = 25.0

[[calibration]]
anchor = "root"
min = 100.0
max = 160.0

[[calibration]]
taxa = ["Sp_A", "Sp_B"]
min = 6.3
max = 13.3

[[calibration]]
taxa = ["Sp_C", "Sp_D"]
min = 4.25
max = 8.87

[[calibration]]
taxa = ["Sp_A", "Sp_B", "Sp_C", "Sp_D"]
min = 23.0
max = 36.5
"#;

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "timetree=debug");
        }
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Write `content` to `dir/name` and return the path.
pub fn write_fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&path, content) {
        panic!("cannot write fixture {}: {}", path.display(), e);
    }
    path
}

/// Lay out the five-taxon phylogram and its run file in `dir`; returns the run file path.
pub fn five_tip_fixture(dir: &Path) -> PathBuf {
    write_fixture(dir, "phylogram.tree", FIVE_TIP_PHYLOGRAM);
    write_fixture(dir, "run.toml", FIVE_TIP_RUN_FILE)
}
