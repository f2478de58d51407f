//! webpak CLI - back up and restore a web project's database and assets
//!
//! This is the main entry point for the webpak command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webpak_core::TempWorkspace;

use cli::{Cli, Commands};

/// Exit status after an interrupting signal.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let command = match cli.command {
        Commands::Completions(args) => return commands::completions::run(args),
        Commands::CheckEnv(args) => return commands::check_env::run(args),
        command => command,
    };

    let workspace = TempWorkspace::from_env();
    let listener = spawn_cleanup_on_signal(workspace.clone());

    let task_workspace = workspace.clone();
    let result = tokio::task::spawn_blocking(move || run_command(command, &task_workspace))
        .await
        .unwrap_or_else(|e| Err(anyhow!("command task failed: {}", e)));

    listener.abort();
    workspace.drain();
    result
}

fn run_command(command: Commands, workspace: &TempWorkspace) -> Result<()> {
    match command {
        Commands::Save(args) => commands::save::run(args, workspace),
        Commands::Load(args) => commands::load::run(args, workspace),
        Commands::Extract(args) => commands::extract::run(args),
        Commands::SaveExisting(args) => commands::save_existing::run(args, workspace),
        Commands::Completions(args) => commands::completions::run(args),
        Commands::CheckEnv(args) => commands::check_env::run(args),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Drains `workspace` and exits when the process is interrupted.
fn spawn_cleanup_on_signal(workspace: TempWorkspace) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Interrupted, removing temporary files");
        workspace.drain();
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let streams = (
        signal(SignalKind::hangup()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    );
    let (mut hangup, mut terminate, mut quit) = match streams {
        (Ok(hangup), Ok(terminate), Ok(quit)) => (hangup, terminate, quit),
        (hangup, terminate, quit) => {
            let err = hangup.err().or(terminate.err()).or(quit.err());
            warn!("failed to register signal handlers: {:?}", err);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = hangup.recv() => {},
        _ = terminate.recv() => {},
        _ = quit.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
