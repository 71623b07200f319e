//! Per-operation scratch space for temporary artifacts.
//!
//! Every composed treatment creates its intermediates inside its own
//! scratch directory. The directory is removed when the operation completes
//! (successfully or not), unless debug retention was requested, in which
//! case it is persisted and its location logged.

use std::path::{Path, PathBuf};

use crate::Result;

pub struct Scratch {
    dir: Option<tempfile::TempDir>,
    keep: bool,
}

impl Scratch {
    pub fn new(keep_artifacts: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("treatments-").tempdir()?;
        Ok(Scratch {
            dir: Some(dir),
            keep: keep_artifacts,
        })
    }

    /// Scratch honoring the process wide debug retention flag
    pub fn from_config() -> Result<Self> {
        Scratch::new(crate::config::current().keep_artifacts)
    }

    pub fn dir_path(&self) -> &Path {
        self.dir.as_ref().expect("scratch directory is present until drop").path()
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir_path().join(file_name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if self.keep {
                let path = dir.keep();
                log::debug!("Keeping scratch artifacts in '{}'", path.display());
            }
        }
    }
}
