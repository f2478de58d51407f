//! webpak archive engine
//!
//! This crate packs a web project's database dump and assets into a single
//! portable container and unpacks it again.
//!
//! # Formats
//!
//! - **Container** (`*.sspak`): uncompressed USTAR tar holding at most
//!   `database.sql.gz` and `assets.tar.gz`, identified by name
//! - **Tree archive** (`assets.tar.gz`): gzip tar of one directory, entry names
//!   relative to the directory's parent
//!
//! # Features
//!
//! - **Streaming**: every archive is written and read in one forward pass
//! - **Space checks**: free space is verified before each large write
//! - **Traversal protection**: entries with `..` components are skipped
//! - **Metadata restoration**: modes, times and ownership restored best-effort
//! - **Derived-asset filtering**: regenerable image variants can be left out
//!
//! # Examples
//!
//! ```no_run
//! use webpak_archive::{ContainerPacker, ExclusionPredicate, PayloadSelection, TreeArchiver};
//! use std::path::Path;
//!
//! fn main() -> webpak_core::Result<()> {
//!     let archiver = TreeArchiver::new(ExclusionPredicate::derived_assets()?);
//!     archiver.compress(Path::new("site/assets"), Path::new("/tmp/pak/assets.tar.gz"))?;
//!
//!     ContainerPacker::new(PayloadSelection::All)
//!         .create(Path::new("site.sspak"), &[Path::new("/tmp/pak/assets.tar.gz")])?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod compression;
pub mod container;
pub mod filters;
pub mod tree;

pub use assets::{
    assets_base, assets_from_tar_gz, assets_to_tar_gz, locate_assets_dir, ASSETS_DIR_NAME,
};
pub use compression::{gunzip_file, gzip_file, CompressionStats, DEFAULT_COMPRESSION_LEVEL};
pub use container::{ContainerPacker, PayloadSelection, ASSETS_PAYLOAD, DATABASE_PAYLOAD};
pub use filters::{ExclusionPredicate, DERIVED_ASSET_KEEP, DERIVED_ASSET_PATTERNS};
pub use tree::{TreeArchiver, TreeStats};
