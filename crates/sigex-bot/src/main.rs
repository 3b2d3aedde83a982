//! Signal admission and order lifecycle supervisor - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Signal admission and order lifecycle supervisor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGEX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sigex_telemetry::init_logging()?;

    info!("Starting sigex v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > SIGEX_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SIGEX_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = sigex_bot::AppConfig::from_file(&config_path)?;

    let app = sigex_bot::Application::new(config);
    app.run().await?;

    Ok(())
}
