//! Shared application state.

use std::sync::Arc;

use crate::{
    applier::MonitorApplier,
    config::{Config, ConfigManager},
    config_store::ConfigStore,
    drivers::DdcBus,
    monitor::MonitorBus,
};

/// Runtime state shared by the ingress, watcher, and coordinator.
pub struct AppState {
    /// Configuration manager for centralized config handling.
    pub config_manager: Arc<ConfigManager>,
    /// Snapshot store of per-monitor level ranges.
    pub store: Arc<ConfigStore>,
    /// Applies mapped levels to the connected displays.
    pub applier: Arc<MonitorApplier>,
}

impl AppState {
    /// Creates the state from a loaded configuration manager.
    ///
    /// Display writes go through the DDC/CI bus; enumeration happens on
    /// every apply cycle, so no display needs to be attached at startup.
    pub async fn new(config_manager: ConfigManager) -> anyhow::Result<Self> {
        Self::with_bus(config_manager, Box::new(DdcBus)).await
    }

    /// Creates the state with a specific monitor bus backend.
    pub async fn with_bus(
        config_manager: ConfigManager,
        bus: Box<dyn MonitorBus>,
    ) -> anyhow::Result<Self> {
        let config = config_manager.clone_config().await;
        let store = Arc::new(ConfigStore::from_config(&config));
        let applier = Arc::new(MonitorApplier::new(bus, store.clone()));

        Ok(Self {
            config_manager: Arc::new(config_manager),
            store,
            applier,
        })
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }
}
