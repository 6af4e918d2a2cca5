//! # Gateway Exporter Server
//!
//! Binary entry point for the exporter. Loads the YAML configuration,
//! wires the collector to the web layer, and serves `/metrics` until a
//! shutdown signal arrives.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration path
//! gateway-exporter
//!
//! # Run against a specific config and port
//! gateway-exporter --config /etc/gateway-exporter.yml --port 7772
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use tokio::signal;
use tracing::info;

use gateway_exporter::collector::GatewayCollector;
use gateway_exporter::config::FileConfigSource;
use gateway_exporter::logging;
use gateway_exporter::metrics::ExporterMetrics;
use gateway_exporter::probe::sql::install_database_drivers;
use gateway_exporter::probe::ProtocolBackendFactory;

/// Grace period for draining in-flight probes on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "gateway-exporter")]
#[command(about = "Prometheus exporter probing gateway-fronted services")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "gateway-exporter.yml")]
    config: PathBuf,

    /// Address to bind the metrics endpoint to
    #[arg(long, default_value = "0.0.0.0")]
    listen: String,

    /// Port to bind the metrics endpoint to
    #[arg(long, default_value_t = 7772)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_tracing();

    info!("🚀 Starting Gateway Exporter...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );
    info!("   Configuration: {}", cli.config.display());

    // The Any driver resolves postgres:// and mysql:// at runtime.
    install_database_drivers();

    let source = Arc::new(FileConfigSource::new(&cli.config));
    let registry = Arc::new(Registry::new());
    let metrics = Arc::new(ExporterMetrics::new(registry)?);

    let collector = Arc::new(
        GatewayCollector::new(source, metrics, Arc::new(ProtocolBackendFactory))
            .await
            .context("failed to bootstrap collector from configuration")?,
    );

    let app = gateway_exporter::web::router(Arc::clone(&collector));
    let bind_addr = format!("{}:{}", cli.listen, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!("🎉 Gateway Exporter started successfully!");
    info!("   Metrics: http://{bind_addr}/metrics");
    info!("   Probe workers: {}", collector.pool_size().await);
    info!("   Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Shutdown signal received, initiating graceful shutdown...");
    collector.shutdown(SHUTDOWN_GRACE).await;
    info!("👋 Gateway Exporter shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
