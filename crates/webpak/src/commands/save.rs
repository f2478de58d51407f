//! Save command

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use std::path::PathBuf;
use webpak_archive::{
    assets_to_tar_gz, locate_assets_dir, ContainerPacker, ExclusionPredicate, PayloadSelection,
    TreeArchiver, ASSETS_PAYLOAD, DATABASE_PAYLOAD,
};
use webpak_core::{byte_to_human_readable, is_dir, ProjectConfig, TempWorkspace};
use webpak_db::adapter_for;

use crate::output;

#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Web project root
    pub webroot: Utf8PathBuf,

    /// Archive to create
    pub sspak: Utf8PathBuf,

    /// Only save the database
    #[arg(long)]
    pub db: bool,

    /// Only save the assets
    #[arg(long)]
    pub assets: bool,

    /// Ignore most resampled images
    #[arg(short, long)]
    pub ignore_resampled: bool,
}

pub fn run(args: SaveArgs, workspace: &TempWorkspace) -> Result<()> {
    let selection = PayloadSelection::from_flags(args.db, args.assets)?;

    output::header("Save");
    output::kv("Web root", args.webroot.as_str());
    output::kv("Archive", args.sspak.as_str());

    let root = args.webroot.as_std_path();
    if !is_dir(root) {
        bail!("Web root '{}' is not a directory", args.webroot);
    }

    let tmp_dir = workspace.dir()?;
    let mut payloads: Vec<PathBuf> = Vec::new();

    if selection.wants_database() {
        let config = ProjectConfig::load(root).context("Failed to load project configuration")?;
        let adapter = adapter_for(&config.database)?;
        let gzip_file = tmp_dir.join(DATABASE_PAYLOAD);
        workspace.register(&gzip_file);

        let spinner = output::spinner(&format!(
            "Dumping {} database '{}'",
            adapter.engine(),
            config.database.name
        ));
        let dumped = adapter.dump(&gzip_file);
        spinner.finish_and_clear();
        let bytes = dumped.context("Database dump failed")?;

        output::kv("Database", &byte_to_human_readable(bytes));
        payloads.push(gzip_file);
    }

    if selection.wants_assets() {
        let assets_dir = locate_assets_dir(root)?;
        let archiver = TreeArchiver::new(ExclusionPredicate::for_flag(args.ignore_resampled)?);
        let gzip_file = tmp_dir.join(ASSETS_PAYLOAD);
        workspace.register(&gzip_file);

        let spinner = output::spinner(&format!("Compressing '{}'", assets_dir.display()));
        let packed = assets_to_tar_gz(&archiver, &assets_dir, &gzip_file);
        spinner.finish_and_clear();
        let stats = packed.context("Failed to compress assets")?;

        output::tree_stats("Assets", &stats);
        payloads.push(gzip_file);
    }

    ContainerPacker::new(selection).create(args.sspak.as_std_path(), &payloads)?;

    output::success(&format!("Created '{}'", args.sspak));
    Ok(())
}
