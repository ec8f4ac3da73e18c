//! # chanrepo-server: Binary Entry Point
//!
//! Starts the Axum HTTP server for the package-channel repository.
//! Storage and credentials come from the environment (see
//! [`AppConfig::from_env`]); listener and log format from the command line.

use std::net::SocketAddr;

use anyhow::Context;
use chanrepo_api::state::{AppConfig, AppState};
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Package-channel artifact repository server.
#[derive(Debug, Parser)]
#[command(name = "chanrepo-server", version, about)]
struct Cli {
    /// Socket address to listen on.
    #[arg(long, env = "CHANREPO_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = AppConfig::from_env().context("reading configuration from environment")?;
    if config.credentials.is_none() {
        tracing::warn!("REPO_USERNAME/REPO_PASSWORD not set; upload and delete routes will answer 500");
    }
    if config.private_mirror.is_none() {
        tracing::warn!("PRIVATE_MIRROR_URI not set; /private wheel requests will answer 500");
    }
    tracing::info!(root = %config.repo_path.display(), "using storage root");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;

    let state = AppState::new(config).with_metrics(metrics);
    let app = chanrepo_api::app(state);

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    tracing::info!("chanrepo listening on {}", cli.listen);

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
