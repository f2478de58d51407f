//! Config file discovery and parsing

use super::ConfigSource;
use crate::error::{Error, Result};
use crate::fs::is_file;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

const ENV_FILE: &str = ".env";
const LEGACY_PHP_FILE: &str = "_ss_environment.php";

static PHP_COMMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)#.*?\n|//.*?\n|/\*.*?\*/").expect("valid comment pattern")
});

static PHP_DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?mi)define\s*?\(\s*?['"]([A-Z0-9_]+)['"]\s*?,\s*?(?:['"](.*)['"]|(\d+|true))\s*?\)\s*?;"#,
    )
    .expect("valid define pattern")
});

/// Looks for `.env` then `_ss_environment.php`, each in `dir` and then its parent.
pub fn find_config(dir: &Path) -> Option<ConfigSource> {
    let parent = dir.parent();

    let candidates = [
        (Some(dir), ENV_FILE),
        (parent, ENV_FILE),
        (Some(dir), LEGACY_PHP_FILE),
        (parent, LEGACY_PHP_FILE),
    ];

    candidates.into_iter().find_map(|(base, name)| {
        let path = base?.join(name);
        if !is_file(&path) {
            return None;
        }
        Some(if name == ENV_FILE {
            ConfigSource::EnvFile(path)
        } else {
            ConfigSource::LegacyPhp(path)
        })
    })
}

/// Reads a dotenv file without touching the process environment.
pub fn parse_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| Error::invalid_config(format!("{}: {}", path.display(), e)))?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| Error::invalid_config(format!("{}: {}", path.display(), e)))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Extracts `define('KEY', 'value');` constants from PHP source.
///
/// Comments are stripped first. Unquoted values are accepted when they are
/// numeric or `true`. Later definitions of a key do not override earlier ones.
pub fn parse_php_constants(code: &str) -> HashMap<String, String> {
    let code = PHP_COMMENTS.replace_all(code, "");
    let mut constants = HashMap::new();

    for caps in PHP_DEFINE.captures_iter(&code) {
        let key = caps[1].to_uppercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        constants.entry(key).or_insert(value);
    }

    constants
}

/// Derives a database name from `SS_DATABASE_CHOOSE_NAME`.
///
/// The value is a level count (`true` meaning 1): the directory that many
/// levels up from `root` (1 = `root` itself) names the database as
/// `SS_<dirname>` with dots removed. Anything else yields an empty name.
pub fn choose_database_name(value: &str, root: &Path) -> String {
    let value = value.to_lowercase();
    let levels: i64 = match value.as_str() {
        "true" => 1,
        other => match other.parse() {
            Ok(n) => n,
            Err(_) => return String::new(),
        },
    };

    let mut dir = root;
    for _ in 1..levels {
        dir = dir.parent().unwrap_or(dir);
    }

    let base = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("SS_{}", base).replace('.', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_prefers_env_in_dir() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir_all(&project).unwrap();
        fs::write(temp_dir.path().join(ENV_FILE), "").unwrap();
        fs::write(project.join(LEGACY_PHP_FILE), "").unwrap();
        fs::write(project.join(ENV_FILE), "").unwrap();

        assert_eq!(
            find_config(&project),
            Some(ConfigSource::EnvFile(project.join(ENV_FILE)))
        );

        fs::remove_file(project.join(ENV_FILE)).unwrap();
        assert_eq!(
            find_config(&project),
            Some(ConfigSource::EnvFile(temp_dir.path().join(ENV_FILE)))
        );

        fs::remove_file(temp_dir.path().join(ENV_FILE)).unwrap();
        assert_eq!(
            find_config(&project),
            Some(ConfigSource::LegacyPhp(project.join(LEGACY_PHP_FILE)))
        );
    }

    #[test]
    fn test_find_config_none() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("site");
        fs::create_dir_all(&project).unwrap();
        assert_eq!(find_config(&project), None);
    }

    #[test]
    fn test_parse_php_constants() {
        let code = r#"<?php
// define('SS_DATABASE_NAME', 'commented');
/* define('SS_DATABASE_SERVER', 'nope'); */
# define('SS_DATABASE_PASSWORD', 'hash-comment');
define('SS_DATABASE_SERVER', 'localhost');
define ( "SS_DATABASE_NAME" , "site_db" ) ;
define('SS_DATABASE_PORT', 3306);
define('SS_DATABASE_CHOOSE_NAME', true);
"#;
        let constants = parse_php_constants(code);
        assert_eq!(constants["SS_DATABASE_SERVER"], "localhost");
        assert_eq!(constants["SS_DATABASE_NAME"], "site_db");
        assert_eq!(constants["SS_DATABASE_PORT"], "3306");
        assert_eq!(constants["SS_DATABASE_CHOOSE_NAME"], "true");
        assert!(!constants.contains_key("SS_DATABASE_PASSWORD"));
    }

    #[test]
    fn test_parse_env_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(ENV_FILE);
        fs::write(
            &path,
            "# comment\nSS_DATABASE_NAME=\"db\"\nSS_DATABASE_PREFIX=p_\n",
        )
        .unwrap();

        let vars = parse_env_file(&path).unwrap();
        assert_eq!(vars["SS_DATABASE_NAME"], "db");
        assert_eq!(vars["SS_DATABASE_PREFIX"], "p_");
    }

    #[test]
    fn test_choose_database_name() {
        let root = Path::new("/srv/www.example.com/site");
        assert_eq!(choose_database_name("true", root), "SS_site");
        assert_eq!(choose_database_name("1", root), "SS_site");
        assert_eq!(choose_database_name("2", root), "SS_wwwexamplecom");
        assert_eq!(choose_database_name("nope", root), "");
    }
}
