use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use shock_core::monitor;
use shock_core::Config;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "heartbeat")]
#[command(about = "Stream the engine's live request rate, reconstructed from /stats")]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine base URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Poll interval in milliseconds (overrides config)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Register this agent through /deploy before streaming
    #[arg(long)]
    deploy: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    config.validate().context("Invalid configuration")?;

    let base = config.target.base_url()?;
    println!("{}", "-".repeat(60));
    println!("Connecting to engine at {base}");
    println!("{}", "-".repeat(60));

    let cancel = CancellationToken::new();
    let samples = monitor::start(&config, cancel.clone()).await?;
    println!("Connection established [{base}]");

    tokio::spawn(handle_ctrl_c(cancel));

    println!("\nStreaming real-time velocity (Ctrl+C to stop)...");
    println!("{}", "-".repeat(60));

    let mut samples = Box::pin(samples);
    while let Some(sample) = samples.next().await {
        println!("{sample}");
    }

    println!("\nMonitor stopped.");
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };

    if let Some(url) = &args.url {
        config.target.base_url = url.clone();
    }
    if let Some(interval_ms) = args.interval_ms {
        config.monitor.poll_interval_ms = interval_ms;
    }
    if args.deploy.is_some() {
        config.monitor.deploy_agent = args.deploy.clone();
    }
    Ok(config)
}

async fn handle_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupt received, stopping after the current poll");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
    }
}
