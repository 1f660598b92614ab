mod api;
mod bootstrap;
mod health;
mod webhook;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::{Context, Result};
use orderdesk_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use orderdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let router = bootstrap::app_router(&app);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        "orderdesk-server listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let shutdown_signal = async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(
                event_name = "system.server.signal_failed",
                correlation_id = "shutdown",
                error = %error,
                "failed to listen for ctrl-c"
            );
        }
        tracing::info!(
            event_name = "system.server.stopping",
            correlation_id = "shutdown",
            "orderdesk-server stopping"
        );
        let _ = stop_tx.send(true);
    };

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    tokio::select! {
        result = server.into_future() => result.context("server terminated with an error")?,
        _ = async {
            let _ = stop_rx.wait_for(|stopped| *stopped).await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight requests did not drain before the grace period"
            );
        }
    }

    app.db_pool.close().await;
    Ok(())
}
