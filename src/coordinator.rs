//! System coordinator for service lifecycle and the reload flow.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use tokio::signal::unix::{SignalKind, signal};

use crate::{
    app_context::AppState,
    config::ConfigManager,
    event::{ConfigChangeType, Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, ConfigWatcherServiceProvider, MqttIngressServiceProvider,
        ServiceProvider,
    },
    task_manager::TaskManager,
};

/// Owns all services and runs the main event loop.
///
/// Services are registered as providers and started in priority order. A
/// critical service failing to start aborts the daemon; a non-critical one
/// is logged and skipped.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
        }
    }

    /// Builds the shared state and registers all service providers.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing system coordinator");

        let state = AppStateProvider::new(config_manager)
            .provide()
            .await
            .context("Failed to initialize application state")?;

        self.register_service_providers(state.clone());
        self.shared_state = Some(state);

        Ok(())
    }

    fn register_service_providers(&mut self, state: Arc<AppState>) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(MqttIngressServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )),
            Box::new(ConfigWatcherServiceProvider::new(
                state,
                self.event_bus.clone(),
            )),
        ];

        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers",
            self.service_providers.len()
        );
    }

    /// Starts all registered services in priority order.
    pub async fn start_all_services(&mut self) -> Result<()> {
        for provider in &self.service_providers {
            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        provider.is_critical()
                    );
                }
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    warn!(
                        "Non-critical service '{}' failed to start: {e}",
                        provider.name()
                    );
                }
            }
        }

        Ok(())
    }

    /// Main event loop: waits on termination signals and bus events.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        info!("Entering main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for shutdown signal")?;
                    info!("Received Ctrl+C, shutting down");
                    self.shutdown().await?;
                    break;
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    self.shutdown().await?;
                    break;
                }

                event = event_rx.recv() => {
                    if !self.handle_event(event).await? {
                        break;
                    }
                }
            }
        }

        info!("Main event loop terminated");
        Ok(())
    }

    /// Handles one bus event; returns `false` when the loop should exit.
    async fn handle_event(
        &mut self,
        event_result: Result<Event, tokio::sync::broadcast::error::RecvError>,
    ) -> Result<bool> {
        match event_result {
            Ok(Event::ConfigChangeDetected(change_type)) => {
                // A broken config on disk must never take the daemon down;
                // the previous snapshot stays active and we keep serving.
                if let Err(e) = self.handle_config_change(change_type).await {
                    log::error!("Failed to handle config change: {e:#}");
                }
            }
            Ok(Event::SystemShutdown) => {
                info!("Shutdown requested over the event bus");
                self.shutdown().await?;
                return Ok(false);
            }
            Ok(event) => {
                info!("Received event: {event:?}");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("Event bus channel closed unexpectedly");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event bus lagged by {n} messages");
            }
        }
        Ok(true)
    }

    async fn handle_config_change(&self, change_type: ConfigChangeType) -> Result<()> {
        match change_type {
            ConfigChangeType::HotReload => self.handle_hot_reload().await,
            ConfigChangeType::RestartRequired { changed_sections } => {
                warn!(
                    "Configuration sections {changed_sections:?} changed; the running \
                     connection is unaffected until the daemon is restarted"
                );
                info!("Restart with: sudo systemctl restart luxsyncd");
                Ok(())
            }
        }
    }

    /// Swaps in the new monitor profiles and asks the sensor to resend.
    ///
    /// If the reload fails the previous snapshot stays active, so displays
    /// keep following the last good configuration.
    async fn handle_hot_reload(&self) -> Result<()> {
        let Some(state) = &self.shared_state else {
            warn!("Cannot reload config: coordinator not initialized");
            return Ok(());
        };

        state
            .config_manager
            .reload()
            .await
            .context("Failed to reload configuration")?;

        let new_config = state.config_manager.clone_config().await;
        state.store.replace(&new_config).await;
        info!(
            "Monitor profiles reloaded ({} monitors)",
            new_config.monitors.len()
        );

        // Re-request the current light level so the new ranges take effect
        // immediately instead of at the next ambient change.
        if let Err(e) = self.event_bus.publish(Event::RefreshRequested) {
            warn!("Failed to request light level refresh: {e}");
        }

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown");

        if let Err(e) = self.task_manager.shutdown_all().await {
            log::error!("Error during task shutdown: {e}");
        }

        info!("Shutdown complete");
        Ok(())
    }

    #[cfg(test)]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    #[cfg(test)]
    pub fn registered_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MonitorCfg, MqttCfg};
    use crate::light_curve::ValueRange;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_config(brightness_max: u16) -> Config {
        Config {
            version: 1,
            mqtt: MqttCfg {
                host: "localhost".to_string(),
                port: 1883,
                light_topic: "homeassistant/light/brightness_pct".to_string(),
                refresh_topic: "homeassistant/light/refresh".to_string(),
            },
            monitors: vec![MonitorCfg {
                name: "primary".to_string(),
                brightness: ValueRange {
                    min: 3,
                    max: brightness_max,
                    power: 1.0,
                },
                contrast: ValueRange {
                    min: 52,
                    max: 100,
                    power: 1.0,
                },
            }],
        }
    }

    #[tokio::test]
    async fn initialize_registers_services_by_priority() {
        let mut coordinator = SystemCoordinator::new();
        let config_manager =
            ConfigManager::new(test_config(100), std::path::PathBuf::from("/tmp/test.yml"));

        coordinator.initialize(config_manager).await.unwrap();

        assert_eq!(
            coordinator.registered_services(),
            vec!["MqttIngressService", "ConfigWatcherService"]
        );
    }

    #[tokio::test]
    async fn hot_reload_swaps_profiles_and_requests_refresh() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "version: 1\n\
             mqtt:\n\
             \x20\x20host: localhost\n\
             monitors:\n\
             \x20\x20- name: primary\n\
             \x20\x20\x20\x20brightness: {{ min: 3, max: 80 }}\n\
             \x20\x20\x20\x20contrast: {{ min: 52, max: 100 }}"
        )
        .unwrap();

        let mut coordinator = SystemCoordinator::new();
        let config_manager = ConfigManager::new(test_config(100), file.path().to_path_buf());
        coordinator.initialize(config_manager).await.unwrap();

        let mut event_rx = coordinator.event_bus().subscribe();
        coordinator
            .handle_config_change(ConfigChangeType::HotReload)
            .await
            .unwrap();

        let state = coordinator.shared_state.as_ref().unwrap();
        let snapshot = state.store.snapshot().await;
        assert_eq!(snapshot[0].brightness.max, 80);

        assert!(matches!(event_rx.try_recv(), Ok(Event::RefreshRequested)));
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid yaml: [").unwrap();

        let mut coordinator = SystemCoordinator::new();
        let config_manager = ConfigManager::new(test_config(100), file.path().to_path_buf());
        coordinator.initialize(config_manager).await.unwrap();

        let result = coordinator
            .handle_config_change(ConfigChangeType::HotReload)
            .await;
        assert!(result.is_err());

        let state = coordinator.shared_state.as_ref().unwrap();
        let snapshot = state.store.snapshot().await;
        assert_eq!(snapshot[0].brightness.max, 100);
    }

    #[tokio::test]
    async fn reload_failure_does_not_stop_the_event_loop() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid yaml: [").unwrap();

        let mut coordinator = SystemCoordinator::new();
        let config_manager = ConfigManager::new(test_config(100), file.path().to_path_buf());
        coordinator.initialize(config_manager).await.unwrap();

        let keep_running = coordinator
            .handle_event(Ok(Event::ConfigChangeDetected(ConfigChangeType::HotReload)))
            .await
            .unwrap();
        assert!(keep_running);

        // the daemon keeps serving with the previous profiles
        let state = coordinator.shared_state.as_ref().unwrap();
        assert_eq!(state.store.snapshot().await[0].brightness.max, 100);
    }

    #[tokio::test]
    async fn restart_required_leaves_snapshot_untouched() {
        let mut coordinator = SystemCoordinator::new();
        let config_manager =
            ConfigManager::new(test_config(100), std::path::PathBuf::from("/tmp/test.yml"));
        coordinator.initialize(config_manager).await.unwrap();

        coordinator
            .handle_config_change(ConfigChangeType::RestartRequired {
                changed_sections: vec!["mqtt".to_string()],
            })
            .await
            .unwrap();

        let state = coordinator.shared_state.as_ref().unwrap();
        let snapshot = state.store.snapshot().await;
        assert_eq!(snapshot[0].brightness.max, 100);
    }
}
