use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gamebridge::infrastructure::config::settings::Config;
use gamebridge::infrastructure::run_with_shutdown;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Gamebridge - game session and balance reconciliation engine.
#[derive(Parser, Debug)]
#[command(name = "gamebridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    config.init_logging();
    info!(config = %cli.config.display(), "gamebridge starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut engine = tokio::spawn(run_with_shutdown(config, shutdown_rx));

    let joined = tokio::select! {
        joined = &mut engine => joined,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            engine.await
        }
    };

    if let Err(e) = joined.context("engine task panicked")? {
        error!(error = %e, "Fatal error");
        return Err(e.into());
    }
    info!("gamebridge stopped");
    Ok(())
}
