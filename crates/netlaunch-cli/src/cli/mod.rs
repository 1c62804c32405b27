//! CLI for the netlaunch resource launcher.

mod commands;
mod prompt;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use netlaunch_core::config;

use commands::{run_cache, run_completions, run_fetch, run_launch, run_verify, CacheAction};

/// Top-level CLI for netlaunch.
#[derive(Debug, Parser)]
#[command(name = "netlaunch")]
#[command(about = "netlaunch: fetch, verify and launch network-delivered Java applications", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Resolve a descriptor: download its jars, verify them and decide its permissions.
    Launch {
        /// Path to the JSON descriptor.
        descriptor: PathBuf,
        /// Answer every trust prompt with yes.
        #[arg(long)]
        trust: bool,
        /// Load this class after the launch succeeds (defaults to the main class).
        #[arg(long, value_name = "CLASS")]
        class: Option<String>,
    },

    /// Download one resource into the cache and print its local path.
    Fetch {
        /// Resource URL.
        url: String,
        /// Requested version range (e.g. "1.2+").
        #[arg(long, value_name = "RANGE")]
        version: Option<String>,
        /// Also try `.pack.gz` and `.gz` variants.
        #[arg(long)]
        pack: bool,
        /// Only negotiate and print the size; do not transfer the body.
        #[arg(long)]
        size_only: bool,
    },

    /// Check jar signatures and print the aggregated result.
    Verify {
        /// Jar files to check together.
        #[arg(required = true)]
        jars: Vec<PathBuf>,
    },

    /// Inspect or clear the download cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            return run_completions(shell);
        }
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Launch {
                descriptor,
                trust,
                class,
            } => run_launch(&cfg, &descriptor, trust, class).await?,
            CliCommand::Fetch {
                url,
                version,
                pack,
                size_only,
            } => run_fetch(&cfg, &url, version.as_deref(), pack, size_only).await?,
            CliCommand::Verify { jars } => run_verify(&cfg, &jars)?,
            CliCommand::Cache { action } => run_cache(&cfg, action)?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
