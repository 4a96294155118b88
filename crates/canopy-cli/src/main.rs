//! canopy command-line binary.
//!
//! Usage:
//!   # Ephemeral in-memory store (useful with `resolve`)
//!   canopy resolve --host proj1-dot-my-app.appspot.com
//!
//!   # Durable store, one namespace
//!   canopy --db canopy.db -n proj1 put index.html ./index.html
//!   canopy --db canopy.db -n proj1 ls --recursive
//!
//!   # Read-only repository checkout under the content root
//!   canopy --repo repos/site cat index.html

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use canopy_cli::{Cli, run};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    run(&cli, &mut stdout).await.inspect_err(|e| {
        tracing::debug!(error = ?e, "command failed");
    })
}
