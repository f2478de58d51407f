//! Project configuration
//!
//! Database credentials are read from the project's `.env` file, or from a
//! legacy `_ss_environment.php` that defines them as PHP constants. Exported
//! environment variables always take precedence over file values.

mod loader;

pub use loader::{choose_database_name, find_config, parse_env_file, parse_php_constants};

use crate::error::{Error, IoResultExt, Result};
use crate::fs::is_dir;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Database settings handed to the database adapter.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub name: String,
    pub port: Option<String>,
    /// Engine identifier, e.g. `MySQLPDODatabase`; empty means the default engine
    pub engine: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("engine", &self.engine)
            .finish()
    }
}

/// Where the project configuration was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A dotenv file
    EnvFile(PathBuf),
    /// A `_ss_environment.php` file with `define()` constants
    LegacyPhp(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::EnvFile(path) | ConfigSource::LegacyPhp(path) => path,
        }
    }
}

/// Resolved configuration of a web project.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Absolute project root
    pub root: PathBuf,
    /// Config file the values came from, if one was found
    pub source: Option<ConfigSource>,
    pub database: DatabaseConfig,
}

impl ProjectConfig {
    /// Discovers and parses the configuration of the project in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !is_dir(dir) {
            return Err(Error::NotADirectory {
                path: dir.to_path_buf(),
            });
        }
        let root = std::path::absolute(dir).with_path("failed to resolve", dir)?;

        let source = find_config(&root);
        let file_values = match &source {
            Some(ConfigSource::EnvFile(path)) => {
                info!("Parsing {}", path.display());
                parse_env_file(path)?
            }
            Some(ConfigSource::LegacyPhp(path)) => {
                info!("Parsing {}", path.display());
                let code = std::fs::read_to_string(path).with_path("failed to read", path)?;
                parse_php_constants(&code)
            }
            None => {
                // variables may still have been exported
                warn!("Cannot find a project config in {}", root.display());
                HashMap::new()
            }
        };

        let database = resolve_database(&root, |key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| file_values.get(key).cloned())
        })?;

        Ok(Self {
            root,
            source,
            database,
        })
    }
}

/// Builds the database settings from a key lookup and validates them.
pub fn resolve_database(
    root: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<DatabaseConfig> {
    let get = |key: &str| lookup(key).unwrap_or_default();

    let mut name = format!(
        "{}{}{}",
        get("SS_DATABASE_PREFIX"),
        get("SS_DATABASE_NAME"),
        get("SS_DATABASE_SUFFIX")
    );
    if name.is_empty() {
        let choose = get("SS_DATABASE_CHOOSE_NAME");
        if !choose.is_empty() {
            name = choose_database_name(&choose, root);
        }
    }

    let port = get("SS_DATABASE_PORT");
    let database = DatabaseConfig {
        host: get("SS_DATABASE_SERVER"),
        username: get("SS_DATABASE_USERNAME"),
        password: get("SS_DATABASE_PASSWORD"),
        name,
        port: (!port.is_empty()).then_some(port),
        engine: get("SS_DATABASE_CLASS"),
    };

    if database.name.is_empty() {
        return Err(Error::invalid_config("No database defined"));
    }
    if database.username.is_empty() {
        return Err(Error::invalid_config("No database user defined"));
    }

    Ok(database)
}
