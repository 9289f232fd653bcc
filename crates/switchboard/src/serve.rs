// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard serve` command implementation.
//!
//! Opens SQLite storage, wires the bridge connector, webhook dispatcher and
//! session manager together, reloads queued sends, resumes sessions that
//! were connected at the last shutdown, and runs until SIGINT/SIGTERM.

use std::sync::Arc;

use switchboard_bridge::BridgeConnector;
use switchboard_config::model::SwitchboardConfig;
use switchboard_core::{Connector, PluginAdapter, StorageAdapter, SwitchboardError};
use switchboard_session::{ManagerSettings, SessionManager, install_signal_handler};
use switchboard_storage::SqliteStorage;
use switchboard_webhook::WebhookDispatcher;
use tracing::{error, info, warn};

/// Runs the `switchboard serve` command.
pub async fn run_serve(config: SwitchboardConfig) -> Result<(), SwitchboardError> {
    init_tracing(&config.gateway.log_level);
    info!(name = %config.gateway.name, "starting switchboard serve");

    let connector = Arc::new(BridgeConnector::new(&config.bridge));
    info!(bridge = %config.bridge.url, adapter = connector.name(), "connector configured");
    let (manager, storage) = assemble(&config, connector).await?;

    let restored = manager.restore_queue().await;
    if restored > 0 {
        info!(count = restored, "queued messages restored");
    }

    let cancel = install_signal_handler();
    let runner = {
        let manager = manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.run(cancel).await })
    };

    match manager.resume().await {
        Ok(count) => info!(count, "startup resume complete"),
        Err(e) => warn!(error = %e, "startup resume failed"),
    }

    info!("switchboard ready");
    match runner.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "session manager stopped with error"),
        Err(e) => error!(error = %e, "session manager task panicked"),
    }

    storage.close().await?;
    info!("switchboard stopped");
    Ok(())
}

/// Builds storage, webhook dispatcher and session manager over `connector`.
pub async fn assemble(
    config: &SwitchboardConfig,
    connector: Arc<dyn Connector>,
) -> Result<(SessionManager, Arc<dyn StorageAdapter>), SwitchboardError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(storage);
    info!(path = %config.storage.database_path, "storage initialized");

    let webhooks = Arc::new(WebhookDispatcher::new(&config.webhook, storage.clone())?);
    let manager = SessionManager::new(
        ManagerSettings::from_config(config),
        storage.clone(),
        connector,
        webhooks,
    );
    Ok((manager, storage))
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::model::StorageConfig;

    #[tokio::test]
    async fn assembles_over_temp_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwitchboardConfig {
            storage: StorageConfig {
                database_path: dir.path().join("sb.db").to_string_lossy().to_string(),
                wal_mode: true,
            },
            ..SwitchboardConfig::default()
        };
        let connector = Arc::new(BridgeConnector::new(&config.bridge));

        let (manager, storage) = assemble(&config, connector).await.unwrap();
        manager.create_session("tenant-a", Some("Shop")).await.unwrap();
        let sessions = manager.list_sessions(true).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name.as_deref(), Some("Shop"));
        assert_eq!(manager.restore_queue().await, 0);
        storage.close().await.unwrap();
    }
}
