//! CLI argument parsing with clap

use clap::{Args, Parser, Subcommand};

// Re-export command types for convenience
pub use crate::commands::check_env::CheckEnvArgs;
pub use crate::commands::extract::ExtractArgs;
pub use crate::commands::load::LoadArgs;
pub use crate::commands::save::SaveArgs;
pub use crate::commands::save_existing::SaveExistingArgs;

/// webpak - back up and restore a web project's database and assets
#[derive(Parser, Debug)]
#[command(name = "webpak")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an .sspak backup of the database and/or assets
    Save(SaveArgs),

    /// Restore the database and/or assets from an .sspak backup
    Load(LoadArgs),

    /// Extract the payloads of an .sspak backup
    Extract(ExtractArgs),

    /// Create an .sspak backup from an existing SQL dump and/or assets directory
    #[command(alias = "saveexisting")]
    SaveExisting(SaveExistingArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),

    /// Print the detected database environment of a project
    #[command(name = "test", hide = true)]
    CheckEnv(CheckEnvArgs),
}

// Completions command
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
