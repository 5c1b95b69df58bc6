//! Conflicter command-line tool.
//!
//! Applies a tree of generated files onto a destination directory, asking
//! before it overwrites anything that differs from what is on disk.

mod apply;
mod style;
mod terminal;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conflicter_core::config::ConflicterConfig;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Conflicter command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "conflicter",
    version,
    about = "Apply generated files with interactive conflict resolution"
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log diagnostics at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a staging directory's files onto a destination.
    Apply {
        /// Directory holding the generated files.
        staging: PathBuf,

        /// Destination directory.
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,

        /// Overwrite existing files without asking.
        #[arg(long)]
        force: bool,

        /// Abort on the first conflict or new file.
        #[arg(long)]
        bail: bool,

        /// Check everything, write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Whitespace-only changes are not conflicts.
        #[arg(long)]
        ignore_whitespace: bool,

        /// Write files even when identical to disk.
        #[arg(long)]
        regenerate: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Apply {
            staging,
            dest,
            force,
            bail,
            dry_run,
            ignore_whitespace,
            regenerate,
        } => {
            let options = &mut config.conflicter;
            options.force |= force;
            options.bail |= bail;
            options.dry_run |= dry_run;
            options.ignore_whitespace |= ignore_whitespace;
            options.regenerate |= regenerate;
            apply::run_apply(&staging, &dest, config).await
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<ConflicterConfig> {
    match path {
        Some(path) => {
            ConflicterConfig::load_from_file(path).context("failed to load configuration file")
        }
        None => Ok(ConflicterConfig::default()),
    }
}
