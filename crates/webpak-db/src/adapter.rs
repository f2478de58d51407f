//! Engine selection and the adapter seam

use crate::mysql::MySqlAdapter;
use std::fmt;
use std::path::Path;
use webpak_core::{DatabaseConfig, Error, Result};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    MySql,
}

impl Engine {
    /// Maps a configured engine identifier (e.g. `MySQLPDODatabase`) to an engine.
    ///
    /// An empty identifier selects MySQL, as does any identifier containing
    /// `mysql` in any case.
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        let normalized = identifier.trim().to_lowercase();
        if normalized.is_empty() || normalized.contains("mysql") {
            Ok(Engine::MySql)
        } else {
            Err(Error::unsupported_engine(identifier))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::MySql => "MySQL",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operations the backup and restore commands need from a database.
pub trait DatabaseAdapter: Send + Sync {
    fn engine(&self) -> Engine;

    /// Writes a gzip-compressed SQL dump of the database to `output_gz`.
    ///
    /// Returns the number of uncompressed dump bytes. A partial file is
    /// removed on failure.
    fn dump(&self, output_gz: &Path) -> Result<u64>;

    /// Creates the database if missing, dropping it first when `drop_first` is set.
    fn create_database(&self, drop_first: bool) -> Result<()>;

    /// Feeds the gzip-compressed SQL file `input_gz` into the database.
    fn load_from_compressed_file(&self, input_gz: &Path) -> Result<()>;
}

/// Returns the adapter for the engine named in `config`.
pub fn adapter_for(config: &DatabaseConfig) -> Result<Box<dyn DatabaseAdapter>> {
    match Engine::from_identifier(&config.engine)? {
        Engine::MySql => Ok(Box::new(MySqlAdapter::new(config.clone()))),
    }
}
