//! I/O boundary traits for testability
//!
//! These traits abstract external I/O operations, allowing services
//! to be tested with mock implementations.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace `path` with `content` in one step.
    ///
    /// Either the complete new content is visible under `path` or, on any
    /// failure, nothing was written there.
    fn write_atomic(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    /// Create directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create parent directories if needed.
    fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    /// Writes to a temporary file next to `path`, then renames it into place.
    /// The temporary file is removed when dropped on an error path.
    fn write_atomic(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn given_existing_file_when_writing_atomically_then_content_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.tree");
        std::fs::write(&path, "old").unwrap();

        RealFileSystem.write_atomic(&path, b"(A:1,B:1);").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "(A:1,B:1);");
        // only the target remains, no temporary leftovers
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn given_missing_directory_when_writing_atomically_then_error_and_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.tree");

        let result = RealFileSystem.write_atomic(&path, b"x");

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn given_nested_path_when_ensuring_parent_then_directories_exist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("plot.svg");

        RealFileSystem.ensure_parent(&path).unwrap();

        assert!(dir.path().join("a").join("b").is_dir());
        assert!(!path.exists());
    }
}
