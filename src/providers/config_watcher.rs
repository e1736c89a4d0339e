use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use notify::{Event, EventHandler, RecursiveMode, Watcher, recommended_watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{ConfigChangeType, Event as AppEvent, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(2000);

/// Configuration file monitoring service provider.
///
/// Non-critical service that watches the config file through filesystem
/// notifications (inotify on Linux) and publishes change events so the
/// coordinator can hot-reload monitor profiles without a restart.
///
/// Editors that write via rename-and-replace generate several events per
/// save, so events are debounced before the file is re-analyzed.
pub struct ConfigWatcherServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ConfigWatcherServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ConfigWatcherServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_config_watcher_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ConfigWatcherService"
    }

    fn priority(&self) -> i32 {
        6
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Bridges notify's callback API onto an async channel.
#[derive(Debug)]
struct AsyncEventHandler {
    sender: mpsc::UnboundedSender<notify::Result<Event>>,
}

impl EventHandler for AsyncEventHandler {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        if let Err(e) = self.sender.send(event) {
            error!("Failed to forward filesystem event: {e}");
        }
    }
}

async fn run_config_watcher_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let config_path = state.config_manager.path().to_path_buf();
    info!("Config watcher started for: {}", config_path.display());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut watcher = recommended_watcher(AsyncEventHandler { sender: event_tx })?;

    // Watch the parent directory: rename-and-replace saves would otherwise
    // detach an inotify watch on the file itself.
    let watch_path = config_path
        .parent()
        .map_or_else(|| config_path.clone(), std::path::Path::to_path_buf);

    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;

    let mut debounce_interval = tokio::time::interval(DEBOUNCE_INTERVAL);
    debounce_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut has_pending_event = false;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Config watcher service cancelled");
                break;
            }

            event_result = event_rx.recv() => {
                match event_result {
                    Some(Ok(event)) => {
                        let affects_config = event.paths.iter().any(|path| {
                            path == &config_path || path.file_name() == config_path.file_name()
                        });

                        if affects_config && (event.kind.is_modify() || event.kind.is_create()) {
                            debug!("Config file event {:?}, scheduling reload check", event.kind);
                            has_pending_event = true;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Filesystem watcher error: {e}");
                    }
                    None => {
                        warn!("Filesystem event channel closed, exiting");
                        break;
                    }
                }
            }

            _ = debounce_interval.tick(), if has_pending_event => {
                has_pending_event = false;

                if !config_path.exists() {
                    warn!("Configuration file {} no longer exists", config_path.display());
                    continue;
                }

                match state.config_manager.analyze_config_changes().await {
                    Ok(change_type) => {
                        if let ConfigChangeType::RestartRequired { changed_sections } = &change_type {
                            warn!(
                                "Connection settings changed in sections {changed_sections:?}; \
                                 a daemon restart is required for these to take effect"
                            );
                        } else {
                            info!("Hot-reloadable configuration change detected");
                        }

                        if let Err(e) = event_bus.publish(AppEvent::ConfigChangeDetected(change_type)) {
                            error!("Failed to publish config change event: {e}");
                        }
                    }
                    Err(e) => {
                        error!("Failed to analyze configuration changes: {e}");
                    }
                }
            }
        }
    }

    if let Err(e) = watcher.unwatch(&watch_path) {
        warn!("Failed to unwatch path during cleanup: {e}");
    }

    Ok(())
}
