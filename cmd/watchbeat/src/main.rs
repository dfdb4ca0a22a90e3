use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use watchbeat_collectors::{AccessLogCollector, JolokiaJvmCollector, PrometheusNodeCollector};
use watchbeat_core::config::Config;
use watchbeat_core::coordinator::Coordinator;
use watchbeat_core::dispatch::Dispatcher;

/// Application server health monitoring agent.
#[derive(Parser)]
#[command(name = "watchbeat", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "watchbeat.toml", env = "WATCHBEAT_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run().await {
        error!(error = %error, "watchbeat startup failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config).map_err(|error| error.to_string())?;

    let node = Arc::new(PrometheusNodeCollector::new(&config.collectors.node));
    let jvm = Arc::new(JolokiaJvmCollector::new(&config.collectors.jvm));
    let requests = Arc::new(
        AccessLogCollector::new(&config.collectors.access_log)
            .map_err(|error| error.to_string())?,
    );

    let dispatcher = Dispatcher::from_config(&config.channels, config.agent.dispatch_timeout())
        .map_err(|error| error.to_string())?;
    info!(
        channels = dispatcher.channel_count(),
        "alert channels configured"
    );

    let coordinator = Coordinator::new(&config, node, jvm, requests, dispatcher);
    let status = coordinator.status_handle();

    let shutdown = CancellationToken::new();
    let monitor = tokio::spawn(coordinator.run(shutdown.clone()));

    // Operator-facing summary of the latest published tick.
    let summary_interval = config.agent.tick_interval();
    let summary_token = shutdown.clone();
    let summary = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(summary_interval);
        loop {
            tokio::select! {
                _ = summary_token.cancelled() => break,
                _ = ticker.tick() => {
                    let current = status.get_status();
                    if current.tick == 0 {
                        continue;
                    }
                    info!(
                        tick = current.tick,
                        health = current.health.overall,
                        status = current.health.status.as_str(),
                        active_alerts = current.active_alerts.len(),
                        "status"
                    );
                }
            }
        }
    });

    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to listen for shutdown signal");
    }
    info!("shutdown requested");
    shutdown.cancel();
    let _ = monitor.await;
    let _ = summary.await;
    Ok(())
}
