mod config;
mod server;

use std::sync::Arc;

use checkout_lib::{JsonlSink, SinkError, SinkHandle, SinkWorker, TransactionLog, WebhookSink};
use clap::Parser;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Cli, ConfigError, ServerConfig, SinkConfig};
use crate::server::{router, AppState};

#[derive(Debug, Error)]
enum ServeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to set up sink: {0}")]
    Sink(#[from] SinkError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServeError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let config = ServerConfig::from_cli(&cli)?;
    run(config).await
}

/// Initialize tracing subscriber based on verbosity and output format
fn init_tracing(verbose: u8, json: bool) {
    // RUST_LOG wins; otherwise -v flags raise the level
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn,checkout=info".to_string(),
            1 => "info,checkout_lib=info".to_string(),
            2 => "info,checkout=debug,checkout_lib=debug,tower_http=debug".to_string(),
            _ => "debug,checkout=trace,checkout_lib=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

fn spawn_sink(config: &ServerConfig) -> Result<(SinkHandle, JoinHandle<usize>), ServeError> {
    let spawned = match &config.sink {
        SinkConfig::Jsonl(path) => {
            info!(path = %path.display(), "writing rows to file");
            SinkWorker::spawn(JsonlSink::new(path.clone()), config.sink_capacity)
        }
        SinkConfig::Webhook { url, timeout } => {
            info!(%url, timeout_secs = timeout.as_secs(), "posting rows to webhook");
            SinkWorker::spawn(WebhookSink::new(url.clone(), *timeout)?, config.sink_capacity)
        }
    };
    Ok(spawned)
}

#[tracing::instrument(skip(config), fields(bind = %config.bind))]
async fn run(config: ServerConfig) -> Result<(), ServeError> {
    let (sink, worker) = spawn_sink(&config)?;
    let log = Arc::new(TransactionLog::new());
    let app = router(AppState::new(Arc::clone(&log), sink));

    let listener = TcpListener::bind(config.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last sink handle; the worker drains and exits.
    match worker.await {
        Ok(written) => info!(written, transactions = log.len().unwrap_or(0), "shut down"),
        Err(e) => warn!(error = %e, "sink worker did not finish cleanly"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
