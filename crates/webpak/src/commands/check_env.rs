//! Hidden `test` command: print the database environment detected for a project

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use webpak_core::ProjectConfig;
use webpak_db::Engine;

use crate::output;

#[derive(Args, Debug)]
pub struct CheckEnvArgs {
    /// Web project root
    pub webroot: Utf8PathBuf,
}

pub fn run(args: CheckEnvArgs) -> Result<()> {
    let config = ProjectConfig::load(args.webroot.as_std_path())
        .context("Failed to load project configuration")?;

    output::header("Detected database environment");
    output::kv("Project root", &config.root.display().to_string());
    match &config.source {
        Some(source) => output::kv("Config file", &source.path().display().to_string()),
        None => output::kv("Config file", "(none, exported variables only)"),
    }
    match Engine::from_identifier(&config.database.engine) {
        Ok(engine) => output::kv("Engine", engine.name()),
        Err(e) => output::warning(&e.to_string()),
    }

    // Debug output redacts the password
    println!("{:#?}", config.database);
    Ok(())
}
