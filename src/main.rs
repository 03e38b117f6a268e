use anyhow::{Context, Result};
use blobauth::config::{load_config, BlobAuthConfig};
use blobauth::installation::BlobInstallationStore;
use blobauth::state_store::{run_state_cleanup, BlobStateStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn};

const DEFAULT_CONFIG_PATH: &str = "blobauth.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blobauth=info".into()),
        )
        .init();

    info!("blobauth starting...");

    let config_path =
        std::env::var("BLOBAUTH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = if Path::new(&config_path).exists() {
        load_config(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        BlobAuthConfig::default()
    };
    config.apply_env();
    config.validate().context("Invalid configuration")?;

    let installation_objects = config
        .object_store
        .open(&config.installation_store.container)
        .context("Failed to open installation container")?;
    let installation_store = BlobInstallationStore::new(
        installation_objects,
        config.installation_store.client_id.clone(),
    )
    .with_historical_data(config.installation_store.historical_data_enabled);

    let state_objects = config
        .object_store
        .open(&config.state_store.container)
        .context("Failed to open state container")?;
    let state_store = Arc::new(
        BlobStateStore::new(state_objects, config.state_store.expiration_seconds)
            .with_span(info_span!("oauth_state_store", container = %config.state_store.container)),
    );

    info!(
        backend = ?config.object_store.backend,
        path = %config.object_store.path.display(),
        client_id = %installation_store.client_id(),
        historical = installation_store.historical_data_enabled(),
        state_expiration_seconds = state_store.expiration_seconds(),
        "Stores ready"
    );

    let interval = Duration::from_secs(config.state_store.cleanup_interval_seconds.max(1));
    let cleanup = tokio::spawn(run_state_cleanup(state_store, interval));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    cleanup.abort();
    info!("blobauth stopped");

    Ok(())
}
