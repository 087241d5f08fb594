//! Warden server — application entry point.

mod config;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_authz::{ApprovalEvent, AuthzServices, BroadcastEventSink};
use warden_db::DbManager;

use crate::config::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    info!("Starting Warden server...");

    let db = DbManager::open(&cli.db_config()).await?;

    let authz_config = cli.authz_config();
    let sink = BroadcastEventSink::new(authz_config.event_channel_capacity);
    let event_log = tokio::spawn(log_events(sink.subscribe()));

    let services = AuthzServices::new(db.store(), Arc::new(sink), authz_config);
    let resumed = services.workflows.resume_timers().await?;
    info!(resumed, "Warden server ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    services.workflows.shutdown();
    drop(services);
    event_log.abort();

    info!("Warden server stopped.");
    Ok(())
}

/// Forward approval events to the log until the channel closes.
async fn log_events(mut events: Receiver<ApprovalEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(payload) => info!(
                    event = event.name(),
                    request_id = %event.request_id(),
                    %payload,
                    "Approval event"
                ),
                Err(e) => error!(event = event.name(), error = %e, "Failed to encode approval event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Approval event log fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
