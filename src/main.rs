//! Perpetual Futures Anomaly Monitor
//!
//! Runs evaluation cycles on a fixed schedule and pushes alerts.

use anomaly_monitor::{config::Config, monitor::Monitor, notify::Notifier};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "anomaly-monitor")]
#[command(about = "Volume / open interest / long-short ratio anomaly monitor for perpetual futures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cycle now, then on every interval until Ctrl-C
    Run,
    /// Run a single cycle and print the report
    Check {
        /// Symbols to check instead of the configured list
        #[arg(short, long)]
        symbol: Vec<String>,
    },
    /// Send a test message through every configured channel
    TestNotify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Check { symbol } => check(config, symbol).await,
        Commands::TestNotify => test_notify(config).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let monitor = Monitor::from_config(&config)?;
    let period = config.monitor.cycle_interval();

    tracing::info!(
        "Starting anomaly monitor: interval={} cycle every {}s",
        config.monitor.interval,
        period.as_secs()
    );

    let completed = monitor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    tracing::info!("Monitor stopped after {} cycles", completed);

    Ok(())
}

async fn check(config: Config, symbols: Vec<String>) -> anyhow::Result<()> {
    let monitor = Monitor::from_config(&config)?;

    let report = if symbols.is_empty() {
        monitor.run_cycle().await
    } else {
        let symbols: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        monitor.run_cycle_for(&symbols).await
    };

    println!("Cycle {}", report.cycle_id);
    println!("  Symbols checked:   {}", report.symbols_checked);
    println!("  Symbols skipped:   {}", report.symbols_skipped);
    println!("  Findings:          {}", report.findings);
    println!("  Alerts dispatched: {}", report.alerts_dispatched);
    println!("  Alerts suppressed: {}", report.alerts_suppressed);
    println!("  Delivery failures: {}", report.deliveries_failed);
    if report.timed_out {
        println!("  Cycle timed out");
    }

    Ok(())
}

async fn test_notify(config: Config) -> anyhow::Result<()> {
    let notifier = Notifier::from_config(&config.notify)?;
    if notifier.is_empty() {
        anyhow::bail!("No notification channels configured");
    }

    println!("Sending test message via {:?}", notifier.channel_names());
    let report = notifier.send_test().await;
    println!("Delivered: {}, failed: {}", report.delivered, report.failed);

    if report.failed > 0 {
        anyhow::bail!("{} channel(s) failed", report.failed);
    }
    Ok(())
}
