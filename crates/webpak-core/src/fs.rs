//! Filesystem utilities: type predicates, size accounting and free-space checks

use crate::error::{Error, IoResultExt, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const UNIT: u64 = 1024;
const UNIT_PREFIXES: &[u8] = b"KMGTPE";

/// Returns true if `path` exists and is a regular file (symlinks are followed).
pub fn is_file(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Returns true if `path` exists and is a directory (symlinks are followed).
pub fn is_dir(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Sums the sizes of all regular files below `path`.
///
/// Directories contribute nothing and symlinks are not followed. A plain file
/// yields its own size.
pub fn calc_size(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let mut total = 0u64;

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("failed to walk '{}'", path.display());
            match e.into_io_error() {
                Some(source) => Error::io(context, source),
                None => Error::io(context, io::Error::other("filesystem loop detected")),
            }
        })?;

        if entry.file_type().is_file() {
            let metadata = entry
                .metadata()
                .map_err(|e| Error::io(format!("failed to stat '{}'", entry.path().display()), e.into()))?;
            total += metadata.len();
        }
    }

    Ok(total)
}

/// Formats a byte count with binary prefixes, e.g. `1536 -> "1.5KiB"`.
pub fn byte_to_human_readable(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!(
        "{:.1}{}iB",
        bytes as f64 / div as f64,
        UNIT_PREFIXES[exp] as char
    )
}

/// Source of free-space figures for a location.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to an unprivileged writer on the filesystem holding `location`.
    fn available_space(&self, location: &Path) -> io::Result<u64>;
}

/// Probe backed by the filesystem's statistics (available blocks × block size).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available_space(&self, location: &Path) -> io::Result<u64> {
        fs4::available_space(location)
    }
}

/// Probe that always reports the same amount of free space.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpaceProbe(pub u64);

impl SpaceProbe for FixedSpaceProbe {
    fn available_space(&self, _location: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

/// Fails if the filesystem at `location` has less than `required` bytes available.
///
/// `location` does not need to exist yet; its nearest existing ancestor is queried.
pub fn has_enough_space(probe: &dyn SpaceProbe, location: &Path, required: u64) -> Result<()> {
    let queried = nearest_existing(location);
    let available = probe
        .available_space(&queried)
        .with_path("failed to query free space on", &queried)?;

    info!(
        "Checked free space on '{}': {} required, {} available",
        location.display(),
        byte_to_human_readable(required),
        byte_to_human_readable(available)
    );

    if required > available {
        return Err(Error::InsufficientSpace {
            location: location.to_path_buf(),
            required: byte_to_human_readable(required),
            available: byte_to_human_readable(available),
        });
    }

    Ok(())
}

fn nearest_existing(location: &Path) -> PathBuf {
    location
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Creates `path` (and parents) unless it is already a directory.
pub fn mkdir_if_not_exists(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !is_dir(path) {
        debug!("Creating directory '{}'", path.display());
        fs::create_dir_all(path).with_path("failed to create directory", path)?;
    }
    Ok(())
}

/// Record of a directory chain created by [`create_dir_chain`].
#[derive(Debug, Default)]
#[must_use = "call rollback() on failure to remove the created directories"]
pub struct DirChain {
    first_created: Option<PathBuf>,
}

impl DirChain {
    /// Topmost directory that did not exist before the chain was created.
    pub fn first_created(&self) -> Option<&Path> {
        self.first_created.as_deref()
    }

    /// Removes every directory the chain created, including anything written into them since.
    pub fn rollback(&self) {
        if let Some(dir) = &self.first_created {
            debug!("Rolling back created directory '{}'", dir.display());
            if let Err(e) = fs::remove_dir_all(dir) {
                warn!("Failed to remove '{}': {}", dir.display(), e);
            }
        }
    }
}

/// Creates `dir` and its missing ancestors with `mode`, remembering the first one created.
pub fn create_dir_chain(dir: &Path, mode: u32) -> Result<DirChain> {
    let mut first_created = None;

    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        match fs::metadata(ancestor) {
            Ok(metadata) if metadata.is_dir() => break,
            Ok(_) => {
                return Err(Error::NotADirectory {
                    path: ancestor.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                first_created = Some(ancestor.to_path_buf());
            }
            Err(e) => return Err(Error::io(format!("failed to stat '{}'", ancestor.display()), e)),
        }
    }

    if first_created.is_some() {
        create_dir_all_mode(dir, mode).with_path("failed to create directory", dir)?;
    }

    Ok(DirChain { first_created })
}

/// `fs::create_dir_all` with explicit permission bits on unix.
pub fn create_dir_all_mode(dir: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(dir)
}
