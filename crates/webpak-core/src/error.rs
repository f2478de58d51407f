//! Error types shared by the webpak crates

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using webpak-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the archiver, packer, database adapter and config resolver
#[derive(Error, Debug)]
pub enum Error {
    /// Tree archive requested for a directory without entries
    #[error("input directory is empty: {}", path.display())]
    EmptyInput { path: PathBuf },

    /// Container archive requested without payloads
    #[error("no files to add to the archive")]
    NoFiles,

    /// Two payloads would be stored under the same entry name
    #[error("duplicate payload name '{name}'")]
    DuplicatePayload { name: String },

    /// Not enough free space at the destination
    #[error("'{}' does not have enough space available (+-{required} required, {available} available)", location.display())]
    InsufficientSpace {
        location: PathBuf,
        required: String,
        available: String,
    },

    /// A required file or directory does not exist
    #[error("'{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    /// A path component that must be a directory is something else
    #[error("'{}' is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    /// IO error with the operation and path it happened on
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Writing a payload into the container failed
    #[error("could not add '{}' to '{}': {source}", input.display(), archive.display())]
    Pack {
        input: PathBuf,
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    /// --db and --assets were combined
    #[error("the database-only and assets-only modes cannot be used together")]
    ConflictingModes,

    /// Database engine without an adapter
    #[error("database engine '{engine}' is not supported")]
    UnsupportedEngine { engine: String },

    /// Project configuration is incomplete or unreadable
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// An exclusion pattern failed to compile
    #[error("invalid exclusion pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Neither assets/ nor public/assets/ exists in the project
    #[error("could not locate an assets directory in '{}'", root.display())]
    AssetsNotFound { root: PathBuf },

    /// Database client failure
    #[error("database error: {message}")]
    Database { message: String },
}

impl Error {
    /// Create an IO error carrying a description of what was being done
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a not found error
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an unsupported engine error
    pub fn unsupported_engine(engine: impl Into<String>) -> Self {
        Self::UnsupportedEngine {
            engine: engine.into(),
        }
    }
}

/// Attach path context to IO results.
pub trait IoResultExt<T> {
    /// Wrap the error as [`Error::Io`] with `"{action} '{path}'"` as context
    fn with_path(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|e| Error::io(format!("{} '{}'", action, path.display()), e))
    }
}
