//! Scoped temporary workspace
//!
//! One [`TempWorkspace`] exists per process invocation. Commands register the
//! intermediate files they produce; the owner drains the workspace once the
//! command finishes, fails, or the process is interrupted.

use crate::error::{IoResultExt, Result};
use crate::fs::create_dir_all_mode;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of the per-process temporary directory.
pub const TEMP_DIR_PREFIX: &str = "webpak-";

#[derive(Debug, Default)]
struct WorkspaceState {
    dir: Option<PathBuf>,
    paths: Vec<PathBuf>,
}

/// Cloneable handle to the process-scoped list of paths to remove.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    base: PathBuf,
    state: Arc<Mutex<WorkspaceState>>,
}

impl TempWorkspace {
    /// Creates a workspace whose directory will live under `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            state: Arc::new(Mutex::new(WorkspaceState::default())),
        }
    }

    /// Creates a workspace under the system temp directory (honours `TMPDIR`).
    pub fn from_env() -> Self {
        let base = std::env::temp_dir();
        if std::env::var_os("TMPDIR").is_some() {
            info!("Alternate tmp directory detected '{}'", base.display());
        }
        Self::new(base)
    }

    fn lock(&self) -> MutexGuard<'_, WorkspaceState> {
        // A panic while holding the lock cannot leave the list inconsistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the workspace directory, creating and registering it on first use.
    pub fn dir(&self) -> Result<PathBuf> {
        let mut state = self.lock();
        if let Some(dir) = &state.dir {
            return Ok(dir.clone());
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let dir = self.base.join(format!("{}{}", TEMP_DIR_PREFIX, &suffix[..12]));
        info!("Creating temporary directory '{}'", dir.display());
        create_dir_all_mode(&dir, 0o700).with_path("failed to create temporary directory", &dir)?;

        state.paths.push(dir.clone());
        state.dir = Some(dir.clone());
        Ok(dir)
    }

    /// Registers a file or directory for removal when the workspace is drained.
    pub fn register(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        debug!("Registered temporary path '{}'", path.display());
        self.lock().paths.push(path);
    }

    /// Paths currently registered, in registration order.
    pub fn registered(&self) -> Vec<PathBuf> {
        self.lock().paths.clone()
    }

    /// Removes every registered path (directories recursively) and empties the list.
    ///
    /// Entries that no longer exist are ignored; removal failures are logged and
    /// counted but never abort the drain. Returns the number of paths removed.
    pub fn drain(&self) -> usize {
        let paths = {
            let mut state = self.lock();
            state.dir = None;
            std::mem::take(&mut state.paths)
        };

        let mut removed = 0;
        for path in paths {
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };

            let result = if metadata.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };

            match result {
                Ok(()) => {
                    debug!("Removed temporary path '{}'", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove '{}': {}", path.display(), e),
            }
        }

        removed
    }
}
