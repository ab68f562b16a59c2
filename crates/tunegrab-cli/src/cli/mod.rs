//! CLI for tunegrab.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use clap_complete::Shell;
use tunegrab_core::config;

use commands::{
    run_completions, run_download, run_fetch, run_history, run_info, run_manpage, run_preview,
    run_status, DownloadOptions,
};

/// Top-level CLI for tunegrab.
#[derive(Debug, Parser)]
#[command(name = "tunegrab")]
#[command(about = "tunegrab: fetch audio through a download backend and watch it live", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show title, duration and estimated size for a media URL.
    Info {
        /// Media page URL.
        url: String,
    },

    /// Start a download job and follow its progress stream until it ends.
    Download {
        /// Media page URL.
        url: String,
        /// Give up after this many seconds without a progress event (overrides the config).
        #[arg(long, value_name = "SECS")]
        idle_timeout: Option<u64>,
        /// Do not print the speed sparkline when the session ends.
        #[arg(long)]
        no_chart: bool,
        /// Save the finished file to this directory or file path.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Save the finished file of a job.
    Fetch {
        /// Task identifier returned when the job was started.
        task_id: String,
        /// Directory or file path (default: current directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Save a short audio preview of a media URL.
    Preview {
        /// Media page URL.
        url: String,
        /// Directory or file path (default: current directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Show the backend's status for a job.
    Status {
        /// Task identifier returned when the job was started.
        task_id: String,
    },

    /// List finished downloads known to the backend.
    History,

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff) to stdout.
    Manpage,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        // These need no config.
        match cli.command {
            CliCommand::Completions { shell } => return run_completions(shell),
            CliCommand::Manpage => return run_manpage(),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Info { url } => run_info(&cfg, url).await?,
            CliCommand::Download {
                url,
                idle_timeout,
                no_chart,
                output,
            } => {
                let opts = DownloadOptions {
                    idle_timeout: idle_timeout
                        .map(std::time::Duration::from_secs)
                        .or_else(|| cfg.idle_timeout()),
                    chart: !no_chart,
                    output,
                };
                run_download(&cfg, &url, opts).await?;
            }
            CliCommand::Fetch { task_id, output } => {
                run_fetch(&cfg, task_id, output_or_cwd(output)).await?;
            }
            CliCommand::Preview { url, output } => {
                run_preview(&cfg, url, output_or_cwd(output)).await?;
            }
            CliCommand::Status { task_id } => run_status(&cfg, task_id).await?,
            CliCommand::History => run_history(&cfg).await?,
            CliCommand::Completions { .. } | CliCommand::Manpage => {}
        }

        Ok(())
    }
}

fn output_or_cwd(output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests;
