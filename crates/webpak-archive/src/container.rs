//! The outer container archive (`*.sspak`).
//!
//! An uncompressed USTAR tar holding up to two payloads, identified by name:
//! [`DATABASE_PAYLOAD`] and [`ASSETS_PAYLOAD`]. Both payloads are already
//! compressed, so the container itself is written and read verbatim.

use crate::tree::{absolute_clean, sanitize_entry_name};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tar::{Archive, Builder as TarBuilder, EntryType, Header, HeaderMode};
use tracing::{debug, info, warn};
use webpak_core::fs::create_dir_chain;
use webpak_core::{
    byte_to_human_readable, has_enough_space, Error, FsSpaceProbe, IoResultExt, Result,
    SpaceProbe,
};

/// Entry name of the gzip SQL dump.
pub const DATABASE_PAYLOAD: &str = "database.sql.gz";

/// Entry name of the gzip tar of the assets directory.
pub const ASSETS_PAYLOAD: &str = "assets.tar.gz";

/// Which payloads an operation works on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadSelection {
    #[default]
    All,
    DatabaseOnly,
    AssetsOnly,
}

impl PayloadSelection {
    /// Builds the selection from the `--db` / `--assets` flags.
    pub fn from_flags(only_db: bool, only_assets: bool) -> Result<Self> {
        match (only_db, only_assets) {
            (true, true) => Err(Error::ConflictingModes),
            (true, false) => Ok(Self::DatabaseOnly),
            (false, true) => Ok(Self::AssetsOnly),
            (false, false) => Ok(Self::All),
        }
    }

    pub fn wants_database(&self) -> bool {
        !matches!(self, Self::AssetsOnly)
    }

    pub fn wants_assets(&self) -> bool {
        !matches!(self, Self::DatabaseOnly)
    }

    /// Whether a container entry called `name` is part of the selection.
    pub fn includes(&self, name: &str) -> bool {
        match name {
            DATABASE_PAYLOAD => self.wants_database(),
            ASSETS_PAYLOAD => self.wants_assets(),
            _ => true,
        }
    }
}

/// Writes and reads container archives.
#[derive(Clone)]
pub struct ContainerPacker {
    probe: Arc<dyn SpaceProbe>,
    selection: PayloadSelection,
}

impl std::fmt::Debug for ContainerPacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerPacker")
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl Default for ContainerPacker {
    fn default() -> Self {
        Self::new(PayloadSelection::All)
    }
}

impl ContainerPacker {
    pub fn new(selection: PayloadSelection) -> Self {
        Self {
            probe: Arc::new(FsSpaceProbe),
            selection,
        }
    }

    /// Replaces the free-space source.
    pub fn with_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn selection(&self) -> PayloadSelection {
        self.selection
    }

    /// Packs `input_files` into a new container at `output_file`.
    ///
    /// Each file is stored under its base name. A partially written container
    /// is removed on failure.
    pub fn create<P: AsRef<Path>>(&self, output_file: &Path, input_files: &[P]) -> Result<()> {
        if input_files.is_empty() {
            return Err(Error::NoFiles);
        }
        let output_file = absolute_clean(output_file)?;

        let mut names = HashSet::new();
        let mut payloads = Vec::with_capacity(input_files.len());
        let mut required = 0u64;
        for input in input_files {
            let input = input.as_ref();
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::not_found(input))?;
            if !names.insert(name.clone()) {
                return Err(Error::DuplicatePayload { name });
            }

            let metadata = match fs::metadata(input) {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => return Err(Error::not_found(input)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::not_found(input))
                }
                Err(e) => return Err(Error::io(format!("failed to stat '{}'", input.display()), e)),
            };
            required += metadata.len();
            payloads.push((input.to_path_buf(), name));
        }

        let parent = output_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        has_enough_space(self.probe.as_ref(), &parent, required)?;
        let chain = create_dir_chain(&parent, 0o750)?;

        let result = self.write_container(&output_file, &payloads);
        if result.is_err() {
            if output_file.exists() {
                debug!("Removing partial container '{}'", output_file.display());
                let _ = fs::remove_file(&output_file);
            }
            chain.rollback();
        }
        result
    }

    fn write_container(&self, output_file: &Path, payloads: &[(PathBuf, String)]) -> Result<()> {
        info!("Creating '{}'", output_file.display());

        let file = File::create(output_file).with_path("failed to create", output_file)?;
        let mut builder = TarBuilder::new(BufWriter::new(file));

        for (input, name) in payloads {
            let pack_error = |source: io::Error| Error::Pack {
                input: input.clone(),
                archive: output_file.to_path_buf(),
                source,
            };

            let content = File::open(input).map_err(pack_error)?;
            let metadata = content.metadata().map_err(pack_error)?;

            let mut header = Header::new_ustar();
            header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
            header.set_entry_type(EntryType::Regular);
            header.set_size(metadata.len());

            builder
                .append_data(&mut header, name, BufReader::new(content))
                .map_err(pack_error)?;
            info!(
                "Added '{}' ({})",
                name,
                byte_to_human_readable(metadata.len())
            );
        }

        builder
            .into_inner()
            .and_then(|mut writer| writer.flush())
            .with_path("failed to finish", output_file)?;
        Ok(())
    }

    /// Unpacks the selected payloads of `container_file` into `output_dir`.
    ///
    /// Returns the paths written, in archive order.
    pub fn extract(&self, container_file: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let container_file = absolute_clean(container_file)?;
        let output_dir = absolute_clean(output_dir)?;

        let size = match fs::metadata(&container_file) {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return Err(Error::not_found(&container_file)),
        };

        // the payloads are compressed, so this only bounds the container itself
        has_enough_space(self.probe.as_ref(), &output_dir, size)?;

        let chain = create_dir_chain(&output_dir, 0o750)?;
        let result = self.read_payloads(&container_file, &output_dir);
        if result.is_err() {
            chain.rollback();
        }
        result
    }

    fn read_payloads(&self, container_file: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        info!(
            "Extracting '{}' to '{}'",
            container_file.display(),
            output_dir.display()
        );

        let file = File::open(container_file).with_path("failed to open", container_file)?;
        let mut archive = Archive::new(BufReader::new(file));
        let mut extracted = Vec::new();

        let entries = archive
            .entries()
            .with_path("failed to read", container_file)?;
        for entry in entries {
            let mut entry = entry.with_path("failed to read", container_file)?;
            let header = entry.header().clone();
            let raw_name = entry
                .path()
                .with_path("failed to read", container_file)?
                .into_owned();

            let Some(relative) = sanitize_entry_name(&raw_name) else {
                warn!("Skipping unsafe entry '{}'", raw_name.display());
                continue;
            };
            if !self.selection.includes(&relative.to_string_lossy()) {
                debug!("Skipping '{}'", relative.display());
                continue;
            }

            let target = output_dir.join(&relative);
            let mode = header.mode().unwrap_or(0o640);
            let entry_type = header.entry_type();

            if entry_type.is_dir() {
                if !target.is_dir() {
                    webpak_core::fs::create_dir_all_mode(&target, mode & 0o777)
                        .with_path("failed to create directory", &target)?;
                }
                continue;
            }
            if !entry_type.is_file() {
                debug!("Skipping unsupported entry '{}'", raw_name.display());
                continue;
            }

            if let Some(parent) = target.parent() {
                if !parent.is_dir() {
                    webpak_core::fs::create_dir_all_mode(parent, 0o750)
                        .with_path("failed to create directory", parent)?;
                }
            }

            let file = open_truncated(&target, mode).with_path("failed to create", &target)?;
            let mut writer = BufWriter::new(file);
            let bytes =
                io::copy(&mut entry, &mut writer).with_path("failed to write", &target)?;
            writer.flush().with_path("failed to write", &target)?;
            drop(writer);

            info!(
                "Extracted '{}' ({})",
                target.display(),
                byte_to_human_readable(bytes)
            );
            extracted.push(target);
        }

        Ok(extracted)
    }
}

fn open_truncated(path: &Path, mode: u32) -> io::Result<File> {
    // a symlink left at the target would redirect the write
    if let Ok(existing) = fs::symlink_metadata(path) {
        if existing.file_type().is_symlink() {
            fs::remove_file(path)?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & 0o7777);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}
