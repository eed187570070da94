//! Scoped temp workspace for per-set archives.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::package::verify_bundle;
use crate::utils::errors::Result;

/// Owns the intermediates of one run.
///
/// [`TempWorkspace::cleanup`] deletes them once the final bundle has been
/// verified. Anything still tracked when the guard drops (an error path) is
/// removed as well, so intermediates never outlive the run.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: PathBuf,
    tracked: Vec<PathBuf>,
}

impl TempWorkspace {
    /// Open `dir`, creating it if absent.
    pub fn create(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tracked: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register an intermediate file for removal.
    pub fn track(&mut self, path: PathBuf) {
        self.tracked.push(path);
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }

    /// Verify `bundle` exists and is non-empty, then delete every tracked
    /// intermediate. Returns how many files were removed.
    pub fn cleanup(&mut self, bundle: &Path) -> Result<usize> {
        verify_bundle(bundle)?;

        let mut removed = 0;
        while let Some(path) = self.tracked.pop() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.tracked.push(path);
                    return Err(e.into());
                }
            }
        }
        Ok(removed)
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        for path in self.tracked.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(file = %path.display(), "Removed leftover intermediate"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove intermediate"),
            }
        }
    }
}
