//! Dependency injection providers for service management.

pub mod app_state;
pub mod config_watcher;
pub mod mqtt;
pub mod traits;

pub use app_state::AppStateProvider;
pub use config_watcher::ConfigWatcherServiceProvider;
pub use mqtt::MqttIngressServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{
        app_context::AppState,
        config::{Config, ConfigManager, MonitorCfg, MqttCfg},
        event::EventBus,
        light_curve::ValueRange,
    };
    use std::sync::Arc;

    async fn create_test_app_state() -> Arc<AppState> {
        let config = Config {
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
                    max: 100,
                    power: 1.0,
                },
                contrast: ValueRange {
                    min: 52,
                    max: 100,
                    power: 1.0,
                },
            }],
        };

        let config_manager = ConfigManager::new(config, std::path::PathBuf::from("/tmp/test.yml"));
        Arc::new(AppState::new(config_manager).await.unwrap())
    }

    #[tokio::test]
    async fn provider_metadata_and_ordering() {
        let state = create_test_app_state().await;
        let event_bus = EventBus::new();

        let ingress = MqttIngressServiceProvider::new(state.clone(), event_bus.clone());
        let watcher = ConfigWatcherServiceProvider::new(state.clone(), event_bus.clone());

        assert_eq!(ingress.name(), "MqttIngressService");
        assert_eq!(watcher.name(), "ConfigWatcherService");

        // Ingress starts first and its failure aborts startup.
        assert!(ingress.priority() > watcher.priority());
        assert!(ingress.is_critical());
        assert!(!watcher.is_critical());
    }

    #[tokio::test]
    async fn app_state_provider_builds_shared_state() {
        let config_manager = ConfigManager::new(
            crate::config::Config {
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
                        min: 0,
                        max: 100,
                        power: 1.0,
                    },
                    contrast: ValueRange {
                        min: 0,
                        max: 100,
                        power: 1.0,
                    },
                }],
            },
            std::path::PathBuf::from("/tmp/test.yml"),
        );

        let provider = AppStateProvider::new(config_manager);
        let state = provider.provide().await.unwrap();

        let snapshot = state.store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "primary");
    }
}
