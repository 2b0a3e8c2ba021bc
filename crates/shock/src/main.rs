use anyhow::{Context, Result};
use clap::Parser;
use shock_core::{Config, ShockPlan, ShockSummary};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shock")]
#[command(about = "Flood the engine with fire-and-forget POSTs over reused connections")]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine base URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Number of parallel workers (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// POST attempts per worker (overrides config)
    #[arg(long)]
    iterations: Option<u64>,

    /// Per-request timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Payload agent field (overrides config)
    #[arg(long)]
    agent: Option<String>,

    /// Payload msg field (overrides config)
    #[arg(long)]
    msg: Option<String>,
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

    let plan = ShockPlan::from_config(&config).context("Invalid shock plan")?;

    println!("Target: {}", plan.target());
    println!(
        "Initiating shock: {} workers x {} attempts",
        plan.workers(),
        plan.iterations_per_worker()
    );

    let summary = shock_core::shock::run(&plan)
        .await
        .context("Failed to start shock run")?;

    print_summary(&summary);
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
    if let Some(workers) = args.workers {
        config.shock.workers = workers;
    }
    if let Some(iterations) = args.iterations {
        config.shock.iterations_per_worker = iterations;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.target.timeout_ms = timeout_ms;
    }
    if let Some(agent) = &args.agent {
        config.shock.payload.agent = agent.clone();
    }
    if let Some(msg) = &args.msg {
        config.shock.payload.msg = msg.clone();
    }

    info!(
        "Config: workers={} iterations={} timeout_ms={}",
        config.shock.workers, config.shock.iterations_per_worker, config.target.timeout_ms
    );
    Ok(config)
}

fn print_summary(summary: &ShockSummary) {
    println!("\n=== Shock Complete ===");
    println!("Workers: {}", summary.workers);
    println!("Attempts: {}", summary.attempts());
    println!("Duration: {}ms", summary.elapsed_ms);
    println!();
}
