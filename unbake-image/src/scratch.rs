//! Scratch directory for archive extraction.

use std::path::Path;

/// Temporary extraction directory, removed when dropped.
///
/// Removal happens on every exit path, including early returns and errors,
/// so nothing extracted outlives one analysis.
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    /// Creates a fresh `unbake-*` directory under the system temp dir.
    pub fn new() -> crate::Result<Self> {
        let dir = tempfile::Builder::new().prefix("unbake-").tempdir()?;
        tracing::debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory now, reporting any error instead of ignoring it.
    pub fn close(self) -> crate::Result<()> {
        self.dir.close()?;
        Ok(())
    }
}
