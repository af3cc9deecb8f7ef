mod api;
mod audit_log;
mod bootstrap;
mod health;
mod notifications;
mod workflow;

use std::time::Duration;

use anyhow::Result;
use tsm_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use tsm_core::config::LogFormat::*;

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
    let chain = app.workflow.lifecycle().chain().clone();

    let router = api::router(api::ApiState::new(app.workflow.clone(), app.inbox.clone()))
        .merge(health::router(app.db_pool.clone(), chain));

    let sweeper = app
        .workflow
        .spawn_sweeper(Duration::from_secs(app.config.workflow.sweep_interval_secs));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        request_id = "unknown",
        bind_address = %address,
        sweep_interval_secs = app.config.workflow.sweep_interval_secs,
        "tsm-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        request_id = "unknown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "tsm-server stopping"
    );
    sweeper.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.pool_close_timeout",
            correlation_id = "shutdown",
            request_id = "unknown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            request_id = "unknown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
