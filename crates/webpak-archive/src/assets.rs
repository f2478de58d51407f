//! Packing and restoring a project's assets directory.

use crate::tree::{TreeArchiver, TreeStats};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use webpak_core::{
    byte_to_human_readable, calc_size, is_dir, is_file, Error, IoResultExt, Result, TempWorkspace,
};

/// Name of the assets directory inside a project and inside the tree archive.
pub const ASSETS_DIR_NAME: &str = "assets";

/// Suffix of the previous assets directory kept during a restore.
const OLD_SUFFIX: &str = ".old";

/// Finds the assets directory: `<root>/assets`, then `<root>/public/assets`.
pub fn locate_assets_dir(project_root: &Path) -> Result<PathBuf> {
    [
        project_root.join(ASSETS_DIR_NAME),
        project_root.join("public").join(ASSETS_DIR_NAME),
    ]
    .into_iter()
    .find(|candidate| is_dir(candidate))
    .ok_or_else(|| Error::AssetsNotFound {
        root: project_root.to_path_buf(),
    })
}

/// Directory the assets directory is restored into: `<root>/public` when it exists.
pub fn assets_base(project_root: &Path) -> PathBuf {
    let public = project_root.join("public");
    if is_dir(&public) {
        public
    } else {
        project_root.to_path_buf()
    }
}

/// Compresses `assets_dir` into `gzip_file`.
pub fn assets_to_tar_gz(
    archiver: &TreeArchiver,
    assets_dir: &Path,
    gzip_file: &Path,
) -> Result<TreeStats> {
    if archiver.filter().is_enabled() {
        info!("Ignoring resampled images");
    }

    let stats = archiver.compress(assets_dir, gzip_file)?;

    let written = fs::metadata(gzip_file)
        .map(|m| m.len())
        .with_path("failed to stat", gzip_file)?;
    info!(
        "Wrote '{}' ({})",
        gzip_file.display(),
        byte_to_human_readable(written)
    );
    Ok(stats)
}

/// Restores the assets directory below `assets_base` from `gzip_file`.
///
/// An existing `<base>/assets` is moved to `assets.old` first. If extraction
/// fails the partial tree is removed and the old directory is put back; on
/// success `assets.old` is registered with `workspace` for removal.
pub fn assets_from_tar_gz(
    archiver: &TreeArchiver,
    workspace: &TempWorkspace,
    gzip_file: &Path,
    assets_base: &Path,
) -> Result<TreeStats> {
    if !is_file(gzip_file) {
        return Err(Error::not_found(gzip_file));
    }

    let assets_path = assets_base.join(ASSETS_DIR_NAME);
    let old_path = assets_base.join(format!("{}{}", ASSETS_DIR_NAME, OLD_SUFFIX));

    let moved_aside = if is_dir(&assets_path) {
        if fs::symlink_metadata(&old_path).is_ok() {
            return Err(Error::io(
                format!("cannot move '{}' aside", assets_path.display()),
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("'{}' already exists", old_path.display()),
                ),
            ));
        }
        info!(
            "Renaming existing '{}' to '{}'",
            assets_path.display(),
            old_path.display()
        );
        fs::rename(&assets_path, &old_path).with_path("failed to rename", &assets_path)?;
        true
    } else {
        false
    };

    info!(
        "Unpacking '{}' to '{}'",
        gzip_file.display(),
        assets_path.display()
    );
    if archiver.filter().is_enabled() {
        info!("Ignoring resampled images");
    }

    let stats = match archiver.extract(gzip_file, assets_base) {
        Ok(stats) => stats,
        Err(e) => {
            if moved_aside {
                restore_previous(&assets_path, &old_path);
            }
            return Err(e);
        }
    };

    if moved_aside {
        workspace.register(&old_path);
    }

    let restored = calc_size(&assets_path).unwrap_or(0);
    info!(
        "Restored '{}' ({})",
        assets_path.display(),
        byte_to_human_readable(restored)
    );
    Ok(stats)
}

fn restore_previous(assets_path: &Path, old_path: &Path) {
    if fs::symlink_metadata(assets_path).is_ok() {
        if let Err(e) = fs::remove_dir_all(assets_path) {
            warn!("Failed to remove '{}': {}", assets_path.display(), e);
            return;
        }
    }
    match fs::rename(old_path, assets_path) {
        Ok(()) => info!("Restored previous '{}'", assets_path.display()),
        Err(e) => warn!(
            "Failed to move '{}' back to '{}': {}",
            old_path.display(),
            assets_path.display(),
            e
        ),
    }
}
