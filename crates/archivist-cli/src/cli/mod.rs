//! CLI for the archivist media library mirror.

mod commands;

use anyhow::Result;
use archivist_core::config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    run_archive, run_checkpoint, run_completions, run_date, run_login, run_seed, RunOptions,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "archivist")]
#[command(about = "Mirror an online photo library into a year/month archive", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Walk the library from the checkpoint to the newest item, downloading each item.
    Run {
        /// Item URL to start from when no checkpoint exists yet.
        #[arg(long, value_name = "URL")]
        seed: Option<String>,
        /// Archive root (overrides `archive_root` from the config).
        #[arg(long, value_name = "DIR")]
        archive: Option<PathBuf>,
        /// Show the browser window instead of running headless.
        #[arg(long)]
        headful: bool,
        /// Transfers running at once (overrides `max_active_jobs`).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Set the starting item, replacing any stored checkpoint.
    Seed {
        /// Item URL, e.g. https://photos.google.com/photo/<id>.
        url: String,
    },

    /// Print the stored checkpoint.
    Checkpoint,

    /// Print the year/month a local file would be archived under (metadata only).
    Date {
        /// Path to a photo or video.
        path: PathBuf,
    },

    /// Open the automation driver interactively to sign in and store the session.
    Login,

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = &cli.command {
            run_completions(*shell);
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                seed,
                archive,
                headful,
                jobs,
            } => {
                let opts = RunOptions {
                    seed,
                    archive,
                    headful,
                    jobs,
                };
                run_archive(cfg, opts).await?;
            }
            CliCommand::Seed { url } => run_seed(&cfg, &url)?,
            CliCommand::Checkpoint => run_checkpoint(&cfg)?,
            CliCommand::Date { path } => run_date(&cfg, &path).await?,
            CliCommand::Login => run_login(&cfg).await?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
