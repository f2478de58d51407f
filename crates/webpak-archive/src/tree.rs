//! Compressed tree archives (`assets.tar.gz`).
//!
//! A tree archive holds one directory: entry names start with the directory's
//! own name, never with the path leading to it. Entries are written and read
//! in a single forward-only pass through the gzip stream.

use crate::compression::DEFAULT_COMPRESSION_LEVEL;
use crate::filters::ExclusionPredicate;
use filetime::FileTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tar::{Archive, Builder as TarBuilder, EntryType, Header};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use webpak_core::fs::{create_dir_all_mode, create_dir_chain};
use webpak_core::{calc_size, has_enough_space, Error, FsSpaceProbe, IoResultExt, Result, SpaceProbe};

/// Permission bits for directories created during extraction.
const DIR_MODE: u32 = 0o750;

/// Buffer size used when writing extracted file content.
const COPY_BUFFER_SIZE: usize = 4096;

/// Counters for one tree archive operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub directories: u64,
    pub files: u64,
    pub symlinks: u64,
    /// Entries left out by the filter, traversal checks or unsupported types
    pub skipped: u64,
    /// File content bytes written
    pub bytes: u64,
}

/// Packs and unpacks directory trees as gzip-compressed tar archives.
#[derive(Clone)]
pub struct TreeArchiver {
    filter: ExclusionPredicate,
    probe: Arc<dyn SpaceProbe>,
    compression_level: u32,
}

impl std::fmt::Debug for TreeArchiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeArchiver")
            .field("filter", &self.filter)
            .field("compression_level", &self.compression_level)
            .finish_non_exhaustive()
    }
}

impl Default for TreeArchiver {
    fn default() -> Self {
        Self::new(ExclusionPredicate::none())
    }
}

impl TreeArchiver {
    /// Creates an archiver using `filter`, checking space on the real filesystem.
    pub fn new(filter: ExclusionPredicate) -> Self {
        Self {
            filter,
            probe: Arc::new(FsSpaceProbe),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Replaces the free-space source.
    pub fn with_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Sets the gzip level (0-9).
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn filter(&self) -> &ExclusionPredicate {
        &self.filter
    }

    /// Archives `input_dir` into the gzip tar file `output_file`.
    ///
    /// Missing parents of `output_file` are created and removed again if the
    /// operation fails, as is the partial output file.
    pub fn compress(&self, input_dir: &Path, output_file: &Path) -> Result<TreeStats> {
        let input_dir = absolute_clean(input_dir)?;
        let output_file = absolute_clean(output_file)?;

        if !input_dir.exists() {
            return Err(Error::not_found(&input_dir));
        }
        if !webpak_core::is_dir(&input_dir) {
            return Err(Error::NotADirectory { path: input_dir });
        }

        let parent = output_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        has_enough_space(self.probe.as_ref(), &parent, calc_size(&input_dir)?)?;

        let chain = create_dir_chain(&parent, DIR_MODE)?;
        let result = self.write_tree(&input_dir, &output_file);

        if result.is_err() {
            if output_file.exists() {
                debug!("Removing partial archive '{}'", output_file.display());
                let _ = fs::remove_file(&output_file);
            }
            chain.rollback();
        }
        result
    }

    fn write_tree(&self, input_dir: &Path, output_file: &Path) -> Result<TreeStats> {
        let root_name = input_dir
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| Error::NotADirectory {
                path: input_dir.to_path_buf(),
            })?;
        // resolved once so entry names never carry the symlink target's path
        let root = fs::canonicalize(input_dir).with_path("failed to resolve", input_dir)?;

        let mut listing = fs::read_dir(&root).with_path("failed to read directory", &root)?;
        if listing.next().is_none() {
            return Err(Error::EmptyInput {
                path: input_dir.to_path_buf(),
            });
        }

        info!(
            "Creating tree archive '{}' from '{}'",
            output_file.display(),
            input_dir.display()
        );

        let file = File::create(output_file).with_path("failed to create", output_file)?;
        let encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(self.compression_level),
        );
        let mut builder = TarBuilder::new(encoder);
        let mut stats = TreeStats::default();

        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(&root, e))?;
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&root) else {
                continue;
            };
            let name = root_name.join(relative);
            let file_type = entry.file_type();

            if !file_type.is_dir() && self.filter.is_excluded(path) {
                debug!("Excluded '{}'", path.display());
                stats.skipped += 1;
                continue;
            }

            let metadata = fs::symlink_metadata(path).with_path("failed to stat", path)?;
            let mut header = header_from(&metadata);

            if file_type.is_dir() {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                builder
                    .append_data(&mut header, &name, io::empty())
                    .with_path("failed to archive", path)?;
                stats.directories += 1;
            } else if file_type.is_file() {
                let size = metadata.len();
                header.set_entry_type(EntryType::Regular);
                header.set_size(size);
                let content = File::open(path).with_path("failed to open", path)?;
                builder
                    .append_data(&mut header, &name, BufReader::new(content).take(size))
                    .with_path("failed to archive", path)?;
                stats.files += 1;
                stats.bytes += size;
            } else if file_type.is_symlink() {
                let target = link_target(path, &root).with_path("failed to read link", path)?;
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
                builder
                    .append_link(&mut header, &name, &target)
                    .with_path("failed to archive", path)?;
                stats.symlinks += 1;
            } else {
                debug!("Skipping special file '{}'", path.display());
                stats.skipped += 1;
            }
        }

        let encoder = builder
            .into_inner()
            .with_path("failed to finish", output_file)?;
        encoder
            .finish()
            .and_then(|mut writer| writer.flush())
            .with_path("failed to finish", output_file)?;

        info!(
            "Archived {} files, {} directories and {} symlinks ({} bytes)",
            stats.files, stats.directories, stats.symlinks, stats.bytes
        );
        Ok(stats)
    }

    /// Extracts the gzip tar file `input_file` below `output_dir`.
    ///
    /// Entries with a `..` component are skipped, as are files whose parent
    /// resolves outside `output_dir`. Metadata is restored on a best-effort
    /// basis; directory modes and times are applied after all content is written.
    pub fn extract(&self, input_file: &Path, output_dir: &Path) -> Result<TreeStats> {
        let input_file = absolute_clean(input_file)?;
        let output_dir = absolute_clean(output_dir)?;

        let archive_size = match fs::metadata(&input_file) {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => return Err(Error::not_found(&input_file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::not_found(&input_file))
            }
            Err(e) => return Err(Error::io(format!("failed to stat '{}'", input_file.display()), e)),
        };
        has_enough_space(self.probe.as_ref(), &output_dir, archive_size)?;

        let chain = create_dir_chain(&output_dir, DIR_MODE)?;
        let result = self.read_tree(&input_file, &output_dir);
        if result.is_err() {
            chain.rollback();
        }
        result
    }

    fn read_tree(&self, input_file: &Path, output_dir: &Path) -> Result<TreeStats> {
        info!(
            "Extracting tree archive '{}' to '{}'",
            input_file.display(),
            output_dir.display()
        );

        let out_root = fs::canonicalize(output_dir).with_path("failed to resolve", output_dir)?;
        let file = File::open(input_file).with_path("failed to open", input_file)?;
        let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

        let mut stats = TreeStats::default();
        let mut deferred: Vec<(PathBuf, Header)> = Vec::new();

        let entries = archive.entries().with_path("failed to read", input_file)?;
        for entry in entries {
            let mut entry = entry.with_path("failed to read", input_file)?;
            let header = entry.header().clone();
            let raw_name = entry.path().with_path("failed to read", input_file)?.into_owned();

            let Some(relative) = sanitize_entry_name(&raw_name) else {
                warn!("Skipping unsafe entry '{}'", raw_name.display());
                stats.skipped += 1;
                continue;
            };
            let target = output_dir.join(&relative);

            let entry_type = header.entry_type();
            if !entry_type.is_dir() && self.filter.is_excluded(&target) {
                debug!("Excluded '{}'", target.display());
                stats.skipped += 1;
                continue;
            }

            let checked = if entry_type.is_dir() {
                relative.as_path()
            } else {
                relative.parent().unwrap_or_else(|| Path::new(""))
            };
            if !stays_inside(output_dir, checked, &out_root) {
                warn!(
                    "Skipping '{}': path resolves outside the output directory",
                    raw_name.display()
                );
                stats.skipped += 1;
                continue;
            }

            if entry_type.is_dir() {
                if !target.is_dir() {
                    create_dir_all_mode(&target, DIR_MODE).with_path("failed to create directory", &target)?;
                }
                let is_real_dir = fs::symlink_metadata(&target)
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if is_real_dir {
                    restore_owner(&target, &header);
                    deferred.push((target, header));
                }
                stats.directories += 1;
            } else if entry_type.is_file() {
                if !prepare_parent(&target, &out_root)? {
                    warn!("Skipping '{}': parent resolves outside the output directory", raw_name.display());
                    stats.skipped += 1;
                    continue;
                }
                stats.bytes += write_file(&mut entry, &target)?;
                restore_mode(&target, &header, 0o7777);
                restore_times(&target, &header);
                restore_owner(&target, &header);
                stats.files += 1;
            } else if entry_type.is_symlink() {
                if !prepare_parent(&target, &out_root)? {
                    warn!("Skipping '{}': parent resolves outside the output directory", raw_name.display());
                    stats.skipped += 1;
                    continue;
                }
                let Some(link) = entry
                    .link_name()
                    .with_path("failed to read", input_file)?
                    .map(|link| link.into_owned())
                else {
                    stats.skipped += 1;
                    continue;
                };
                if create_symlink(&link, &target)? {
                    stats.symlinks += 1;
                } else {
                    stats.skipped += 1;
                }
            } else {
                debug!("Skipping unsupported entry '{}' ({:?})", raw_name.display(), entry_type);
                stats.skipped += 1;
            }
        }

        if !deferred.is_empty() {
            info!("Setting timestamps for {} extracted directories", deferred.len());
            for (dir, header) in deferred.iter().rev() {
                let inside = fs::canonicalize(dir)
                    .map(|resolved| resolved.starts_with(&out_root))
                    .unwrap_or(false);
                if !inside {
                    warn!(
                        "Not restoring metadata of '{}': it resolves outside the output directory",
                        dir.display()
                    );
                    continue;
                }
                restore_times(dir, header);
                restore_mode(dir, header, 0o777);
            }
        }

        info!(
            "Extracted {} files, {} directories and {} symlinks ({} bytes, {} skipped)",
            stats.files, stats.directories, stats.symlinks, stats.bytes, stats.skipped
        );
        Ok(stats)
    }
}

/// Makes `path` absolute and lexically resolves `.`, `..` and trailing separators.
pub(crate) fn absolute_clean(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).with_path("failed to resolve", path)?;
    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            // `..` at the root stays at the root
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}

/// Relative path for an archive entry name, or `None` if it contains `..`.
///
/// Root and prefix components are dropped so absolute names land below the
/// output directory. Names that reduce to nothing are rejected as well.
pub(crate) fn sanitize_entry_name(name: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

fn walk_error(root: &Path, e: walkdir::Error) -> Error {
    let context = format!(
        "failed to walk '{}'",
        e.path().unwrap_or(root).display()
    );
    match e.into_io_error() {
        Some(source) => Error::io(context, source),
        None => Error::io(context, io::Error::other("filesystem loop detected")),
    }
}

fn header_from(metadata: &fs::Metadata) -> Header {
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(metadata, tar::HeaderMode::Complete);

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.set_atime(metadata.atime().max(0) as u64);
        }
    }

    header
}

/// Target to store for the symlink at `link`.
///
/// Targets inside `root` become relative to the link's directory, targets
/// outside keep their resolved absolute path and dangling links keep the raw
/// target.
fn link_target(link: &Path, root: &Path) -> io::Result<PathBuf> {
    let raw = fs::read_link(link)?;

    let resolved = match fs::canonicalize(link) {
        Ok(resolved) => resolved,
        Err(_) => return Ok(raw),
    };

    match resolved.strip_prefix(root) {
        Ok(inside) => {
            let link_dir = link
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .unwrap_or_else(|| Path::new(""));
            Ok(relative_path(link_dir, inside))
        }
        Err(_) => Ok(resolved),
    }
}

/// Path leading from directory `from` to `to`, both relative to the same base.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// Whether `output_dir/relative` stays below `out_root`.
///
/// Every existing component is checked, so a symlink placed earlier in the
/// archive cannot redirect later entries. Components that do not exist yet
/// will be created as real directories.
fn stays_inside(output_dir: &Path, relative: &Path, out_root: &Path) -> bool {
    let mut current = output_dir.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => match fs::canonicalize(&current) {
                Ok(resolved) if resolved.starts_with(out_root) => {}
                _ => return false,
            },
            Ok(_) => {}
            Err(_) => return true,
        }
    }
    true
}

/// Creates the parent of `target` if needed and checks it resolves below `out_root`.
fn prepare_parent(target: &Path, out_root: &Path) -> Result<bool> {
    let Some(parent) = target.parent() else {
        return Ok(false);
    };
    if !parent.is_dir() {
        create_dir_all_mode(parent, DIR_MODE).with_path("failed to create directory", parent)?;
    }
    let resolved = fs::canonicalize(parent).with_path("failed to resolve", parent)?;
    Ok(resolved.starts_with(out_root))
}

fn write_file(content: &mut impl Read, target: &Path) -> Result<u64> {
    // never write through a symlink left at the target
    if let Ok(existing) = fs::symlink_metadata(target) {
        if existing.file_type().is_symlink() {
            fs::remove_file(target).with_path("failed to replace", target)?;
        }
    }

    let file = File::create(target).with_path("failed to create", target)?;
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);
    let written = io::copy(content, &mut writer).with_path("failed to write", target)?;
    writer.flush().with_path("failed to write", target)?;
    Ok(written)
}

#[cfg(unix)]
fn create_symlink(link: &Path, target: &Path) -> Result<bool> {
    match fs::symlink_metadata(target) {
        Ok(existing) if existing.is_dir() => {
            warn!("Not replacing directory '{}' with a symlink", target.display());
            return Ok(false);
        }
        Ok(_) => fs::remove_file(target).with_path("failed to replace", target)?,
        Err(_) => {}
    }
    std::os::unix::fs::symlink(link, target).with_path("failed to create symlink", target)?;
    Ok(true)
}

#[cfg(not(unix))]
fn create_symlink(_link: &Path, target: &Path) -> Result<bool> {
    warn!("Skipping symlink '{}'", target.display());
    Ok(false)
}

fn restore_mode(path: &Path, header: &Header, mask: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let Ok(mode) = header.mode() else {
            return;
        };
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode & mask)) {
            debug!("Could not set mode of '{}': {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = (path, header, mask);
}

fn restore_times(path: &Path, header: &Header) {
    let Ok(mtime) = header.mtime() else {
        return;
    };
    let atime = header
        .as_gnu()
        .and_then(|gnu| gnu.atime().ok())
        .filter(|atime| *atime > 0)
        .unwrap_or(mtime);

    let result = filetime::set_file_times(
        path,
        FileTime::from_unix_time(atime as i64, 0),
        FileTime::from_unix_time(mtime as i64, 0),
    );
    if let Err(e) = result {
        debug!("Could not set times of '{}': {}", path.display(), e);
    }
}

fn restore_owner(path: &Path, header: &Header) {
    #[cfg(unix)]
    {
        let (Ok(uid), Ok(gid)) = (header.uid(), header.gid()) else {
            return;
        };
        if let Err(e) = std::os::unix::fs::chown(path, Some(uid as u32), Some(gid as u32)) {
            debug!("Could not set owner of '{}': {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = (path, header);
}
