//! # webpak-core
//!
//! Core library for webpak providing:
//! - The shared error type
//! - Filesystem predicates, size accounting and free-space checks
//! - The process-scoped temporary workspace
//! - Project configuration discovery (`.env` / `_ss_environment.php`)

pub mod config;
pub mod error;
pub mod fs;
pub mod workspace;

pub use config::{ConfigSource, DatabaseConfig, ProjectConfig};
pub use error::{Error, IoResultExt, Result};
pub use fs::{
    byte_to_human_readable, calc_size, has_enough_space, is_dir, is_file, FixedSpaceProbe,
    FsSpaceProbe, SpaceProbe,
};
pub use workspace::TempWorkspace;
