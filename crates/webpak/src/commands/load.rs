//! Load command

use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use webpak_archive::{
    assets_base, assets_from_tar_gz, ContainerPacker, ExclusionPredicate, PayloadSelection,
    TreeArchiver, ASSETS_PAYLOAD, DATABASE_PAYLOAD,
};
use webpak_core::{is_file, ProjectConfig, TempWorkspace};
use webpak_db::adapter_for;

use crate::output;

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Archive to restore from
    pub sspak: Utf8PathBuf,

    /// Web project root
    #[arg(default_value = ".")]
    pub webroot: Utf8PathBuf,

    /// Drop the existing database before loading
    #[arg(long)]
    pub drop_db: bool,

    /// Only restore the database
    #[arg(long)]
    pub db: bool,

    /// Only restore the assets
    #[arg(long)]
    pub assets: bool,

    /// Ignore most resampled images
    #[arg(short, long)]
    pub ignore_resampled: bool,
}

pub fn run(args: LoadArgs, workspace: &TempWorkspace) -> Result<()> {
    let selection = PayloadSelection::from_flags(args.db, args.assets)?;

    if !is_file(&args.sspak) {
        bail!("'{}' does not exist", args.sspak);
    }

    output::header("Load");
    output::kv("Archive", args.sspak.as_str());
    output::kv("Web root", args.webroot.as_str());

    let root = args.webroot.as_std_path();
    let tmp_dir = workspace.dir()?;
    let extracted = ContainerPacker::new(selection)
        .extract(args.sspak.as_std_path(), &tmp_dir)
        .with_context(|| format!("Failed to unpack '{}'", args.sspak))?;
    for path in &extracted {
        workspace.register(path);
    }

    let mut restored = false;

    let sql_file = tmp_dir.join(DATABASE_PAYLOAD);
    if selection.wants_database() && is_file(&sql_file) {
        let config = ProjectConfig::load(root).context("Failed to load project configuration")?;
        let adapter = adapter_for(&config.database)?;

        adapter.create_database(args.drop_db)?;

        let spinner = output::spinner(&format!("Loading database '{}'", config.database.name));
        let loaded = adapter.load_from_compressed_file(&sql_file);
        spinner.finish_and_clear();
        loaded.context("Database load failed")?;

        output::kv("Database", &config.database.name);
        restored = true;
    }

    let assets_file = tmp_dir.join(ASSETS_PAYLOAD);
    if selection.wants_assets() && is_file(&assets_file) {
        let archiver = TreeArchiver::new(ExclusionPredicate::for_flag(args.ignore_resampled)?);
        let base = assets_base(root);

        let spinner = output::spinner(&format!("Restoring assets into '{}'", base.display()));
        let unpacked = assets_from_tar_gz(&archiver, workspace, &assets_file, &base);
        spinner.finish_and_clear();
        let stats = unpacked.context("Failed to restore assets")?;

        output::tree_stats("Assets", &stats);
        restored = true;
    }

    if !restored {
        output::warning(&format!("Nothing to restore from '{}'", args.sspak));
        return Ok(());
    }

    output::success(&format!("Restored '{}'", args.sspak));
    Ok(())
}
