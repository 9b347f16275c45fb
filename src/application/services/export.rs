//! Timetree export to Newick and Nexus.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::{write_newick, write_nexus, Timetree};
use crate::infrastructure::traits::FileSystem;

/// Name of the tree inside exported Nexus files.
pub const NEXUS_TREE_NAME: &str = "timetree";

/// Writes timetrees through the filesystem boundary, one atomic write per file.
pub struct ExportService {
    fs: Arc<dyn FileSystem>,
}

impl ExportService {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    #[instrument(level = "debug", skip(self, timetree))]
    pub fn export_newick(&self, timetree: &Timetree, path: &Path) -> ApplicationResult<()> {
        let mut text = write_newick(&timetree.tree);
        text.push('\n');
        self.write(path, text.as_bytes(), "write newick")?;
        info!("wrote newick timetree to {}", path.display());
        Ok(())
    }

    #[instrument(level = "debug", skip(self, timetree))]
    pub fn export_nexus(&self, timetree: &Timetree, path: &Path) -> ApplicationResult<()> {
        let header = format!(
            "written by timetree {} on {}; {}",
            env!("CARGO_PKG_VERSION"),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            timetree.report
        );
        let text = write_nexus(&timetree.tree, NEXUS_TREE_NAME, Some(&header));
        self.write(path, text.as_bytes(), "write nexus")?;
        info!("wrote nexus timetree to {}", path.display());
        Ok(())
    }

    fn write(&self, path: &Path, content: &[u8], action: &str) -> ApplicationResult<()> {
        self.fs
            .ensure_parent(path)
            .with_path_context("create directory for", path)?;
        self.fs
            .write_atomic(path, content)
            .with_path_context(action, path)
    }
}
