//! Save-existing command: build an archive from a plain SQL dump and/or an assets directory

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use std::path::PathBuf;
use webpak_archive::{
    assets_to_tar_gz, gzip_file, ContainerPacker, ExclusionPredicate, TreeArchiver,
    ASSETS_PAYLOAD, DATABASE_PAYLOAD,
};
use webpak_core::{is_dir, is_file, TempWorkspace};

use crate::output;

#[derive(Args, Debug)]
pub struct SaveExistingArgs {
    /// Archive to create
    pub sspak: Utf8PathBuf,

    /// Existing .sql file to add
    #[arg(long, value_name = "SQL_FILE")]
    pub db: Option<Utf8PathBuf>,

    /// Existing assets directory to add
    #[arg(long, value_name = "DIR")]
    pub assets: Option<Utf8PathBuf>,
}

pub fn run(args: SaveExistingArgs, workspace: &TempWorkspace) -> Result<()> {
    if args.db.is_none() && args.assets.is_none() {
        bail!("You must specify either --db or --assets, or both");
    }
    if let Some(sql_file) = &args.db {
        if !is_file(sql_file) {
            bail!("Database file '{}' does not exist", sql_file);
        }
    }
    if let Some(assets_dir) = &args.assets {
        if !is_dir(assets_dir) {
            bail!("Assets directory '{}' does not exist", assets_dir);
        }
    }

    output::header("Save existing");
    output::kv("Archive", args.sspak.as_str());

    let tmp_dir = workspace.dir()?;
    let mut payloads: Vec<PathBuf> = Vec::new();

    if let Some(sql_file) = &args.db {
        let gzip_sql = tmp_dir.join(DATABASE_PAYLOAD);
        workspace.register(&gzip_sql);

        let stats = gzip_file(sql_file.as_std_path(), &gzip_sql, None)
            .with_context(|| format!("Failed to compress '{}'", sql_file))?;

        output::kv(
            "Database",
            &format!("{} ({}% smaller)", sql_file, stats.compression_percentage()),
        );
        payloads.push(gzip_sql);
    }

    if let Some(assets_dir) = &args.assets {
        let gzip_assets = tmp_dir.join(ASSETS_PAYLOAD);
        workspace.register(&gzip_assets);

        let archiver = TreeArchiver::new(ExclusionPredicate::none());
        let spinner = output::spinner(&format!("Compressing '{}'", assets_dir));
        let packed = assets_to_tar_gz(&archiver, assets_dir.as_std_path(), &gzip_assets);
        spinner.finish_and_clear();
        let stats = packed.context("Failed to compress assets")?;

        output::tree_stats("Assets", &stats);
        payloads.push(gzip_assets);
    }

    ContainerPacker::default().create(args.sspak.as_std_path(), &payloads)?;

    output::success(&format!("Created '{}'", args.sspak));
    Ok(())
}
