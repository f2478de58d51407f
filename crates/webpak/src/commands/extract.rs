//! Extract command

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use webpak_archive::{ContainerPacker, PayloadSelection};

use crate::output;

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Archive to extract
    pub sspak: Utf8PathBuf,

    /// Output directory
    #[arg(default_value = ".")]
    pub outdir: Utf8PathBuf,

    /// Only extract the database.sql.gz file
    #[arg(long)]
    pub db: bool,

    /// Only extract the assets.tar.gz file
    #[arg(long)]
    pub assets: bool,
}

pub fn run(args: ExtractArgs) -> Result<()> {
    let selection = PayloadSelection::from_flags(args.db, args.assets)?;

    output::header("Extract");
    output::kv("Archive", args.sspak.as_str());
    output::kv("Output", args.outdir.as_str());

    let extracted = ContainerPacker::new(selection)
        .extract(args.sspak.as_std_path(), args.outdir.as_std_path())
        .with_context(|| format!("Failed to extract '{}'", args.sspak))?;

    if extracted.is_empty() {
        output::warning(&format!("No payloads found in '{}'", args.sspak));
        return Ok(());
    }
    for path in &extracted {
        output::success(&format!("Extracted '{}'", path.display()));
    }
    Ok(())
}
