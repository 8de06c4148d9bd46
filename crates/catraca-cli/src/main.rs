use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use catraca_api::{ActivitySoftClient, ClientConfig};
use catraca_engine::events;
use catraca_engine::{Scheduler, SchedulerConfig, SettingsStore, SyncEngineConfig};
use catraca_storage::{Database, DatabaseConfig};

const SETTINGS_ENV: &str = "CATRACA_SETTINGS";
const DATABASE_ENV: &str = "CATRACA_DB";
const API_KEY_ENV: &str = "CATRACA_API_KEY";

/// In-flight attendance posts are allowed to finish after cancellation,
/// bounded by the per-request timeout. Give them that long plus slack.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings_path =
        std::env::var(SETTINGS_ENV).unwrap_or_else(|_| "settings.json".to_string());
    let database_path = std::env::var(DATABASE_ENV).unwrap_or_else(|_| "catraca.db".to_string());
    let api_key = std::env::var(API_KEY_ENV)
        .with_context(|| format!("{API_KEY_ENV} must hold the school API authorization key"))?;

    let database = Database::new(DatabaseConfig::new(&database_path))
        .await
        .with_context(|| format!("failed to open database at {database_path}"))?;

    let api = Arc::new(
        ActivitySoftClient::new(ClientConfig {
            api_key,
            ..ClientConfig::default()
        })
        .context("failed to build the school API client")?,
    );

    let (event_tx, mut event_rx) = events::channel();
    let event_sender = event_tx.clone();
    let cancel_token = CancellationToken::new();

    let scheduler = Scheduler::new(
        &database,
        api,
        event_tx,
        SchedulerConfig {
            settings: SettingsStore::new(&settings_path),
            sync: SyncEngineConfig::default(),
            cancel_token: cancel_token.clone(),
        },
    );
    let state_rx = scheduler.state();
    let scheduler_handle = tokio::spawn(scheduler.run());

    info!(
        version = catraca_core::VERSION,
        settings = %settings_path,
        database = %database_path,
        "catraca daemon started"
    );

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(event) => debug!(event = ?event, "pipeline event"),
                    None => {
                        warn!("event channel closed; shutting down");
                        break;
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!(error = %err, "failed while waiting for shutdown signal");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    cancel_token.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, scheduler_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "scheduler task panicked"),
        Err(_) => warn!("scheduler did not stop in time; exiting anyway"),
    }

    let dropped = event_sender.dropped();
    if dropped > 0 {
        debug!(dropped, "observer events were dropped while the feed lagged");
    }

    let final_state = *state_rx.borrow();
    info!(state = %final_state, "catraca daemon stopped");
    database.close().await;

    Ok(())
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
