//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod audit;
mod check;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "siteaudit")]
#[command(about = "Website audits with SSRF-safe fetching")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ./siteaudit.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the audit HTTP server
    Serve {
        /// Address to bind: port, host, or host:port (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Check whether a URL would be accepted for auditing
    Check {
        /// URL or bare hostname
        url: String,
    },

    /// Run one audit locally and print the JSON report
    Audit {
        /// URL or bare hostname
        url: String,
        /// Include performance and technology analysis
        #[arg(long)]
        full: bool,
        /// Render the page in a headless browser for technology detection
        #[arg(long)]
        deep: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            serve::cmd_serve(&settings, &bind).await
        }
        Commands::Check { url } => check::cmd_check(&settings, &url).await,
        Commands::Audit { url, full, deep } => audit::cmd_audit(&settings, &url, full, deep).await,
    }
}
