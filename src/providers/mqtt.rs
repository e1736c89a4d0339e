//! MQTT ingress service.
//!
//! Subscribes to the ambient-light topic, parses incoming percentage
//! payloads, and drives the monitor applier. Reconnects with exponential
//! backoff when the broker drops, and republishes a refresh request on
//! every (re)connect so the sensor side resends the current level.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event as MqttEvent, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    config::MqttCfg,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Broker credentials are taken from the environment, not the config file.
const ENV_MQTT_USERNAME: &str = "LUXSYNCD_MQTT_USERNAME";
const ENV_MQTT_PASSWORD: &str = "LUXSYNCD_MQTT_PASSWORD";

// Color temperature sync is not wired up yet; the sensor side publishes it
// but no portable VCP code exists for it across the monitors we target.
// const TOPIC_COLOR_TEMP: &str = "homeassistant/light/color_temp_k";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// MQTT ingress service provider.
///
/// Critical, highest-priority service: without broker connectivity the
/// daemon has no input and nothing else is worth running.
pub struct MqttIngressServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl MqttIngressServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for MqttIngressServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_ingress_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "MqttIngressService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

/// Parses a textual light-level payload.
///
/// Accepts an optionally whitespace-padded integer; anything else is
/// rejected so a garbled retained message cannot blank the displays.
fn parse_light_percent(payload: &[u8]) -> Option<i32> {
    std::str::from_utf8(payload).ok()?.trim().parse::<i32>().ok()
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

fn build_mqtt_options(mqtt: &MqttCfg) -> MqttOptions {
    let mut options = MqttOptions::new("luxsyncd", mqtt.host.clone(), mqtt.port);
    options.set_keep_alive(Duration::from_secs(30));

    if let Ok(username) = std::env::var(ENV_MQTT_USERNAME) {
        let password = std::env::var(ENV_MQTT_PASSWORD).unwrap_or_default();
        options.set_credentials(username, password);
    }

    options
}

async fn run_ingress_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mqtt = state.config().await.mqtt.clone();
    info!(
        "Connecting to MQTT broker at {}:{} (light topic '{}')",
        mqtt.host, mqtt.port, mqtt.light_topic
    );

    let (client, mut event_loop) = AsyncClient::new(build_mqtt_options(&mqtt), 16);
    let mut bus_rx = event_bus.subscribe();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("MQTT ingress service cancelled");
                let _ = client.disconnect().await;
                return Ok(());
            }
            bus_event = bus_rx.recv() => {
                if let Ok(Event::RefreshRequested) = bus_event {
                    request_refresh(&client, &mqtt).await;
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(MqttEvent::Incoming(Incoming::ConnAck(_))) => {
                    backoff = INITIAL_BACKOFF;
                    info!("Connected to MQTT broker");
                    client
                        .subscribe(mqtt.light_topic.clone(), QoS::AtLeastOnce)
                        .await
                        .context("MQTT subscribe failed")?;
                    request_refresh(&client, &mqtt).await;
                }
                Ok(MqttEvent::Incoming(Incoming::Publish(publish))) => {
                    handle_light_message(&state, &publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {e}, retrying in {backoff:?}");
                    tokio::select! {
                        () = cancel_token.cancelled() => {
                            info!("MQTT ingress service cancelled");
                            return Ok(());
                        }
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = next_backoff(backoff);
                }
            }
        }
    }
}

/// Publishes an empty message on the refresh topic.
///
/// The sensor side answers with a retained resend of the current light
/// level, so a freshly (re)started daemon converges without waiting for
/// the next ambient change.
async fn request_refresh(client: &AsyncClient, mqtt: &MqttCfg) {
    if let Err(e) = client
        .publish(mqtt.refresh_topic.clone(), QoS::AtLeastOnce, false, Vec::new())
        .await
    {
        warn!("Failed to publish refresh request: {e}");
    }
}

async fn handle_light_message(state: &Arc<AppState>, topic: &str, payload: &[u8]) {
    let Some(percent) = parse_light_percent(payload) else {
        warn!(
            "Discarding malformed payload on '{topic}': {:?}",
            String::from_utf8_lossy(payload)
        );
        return;
    };

    debug!("Ambient light level: {percent}%");
    if let Err(e) = state.applier.apply(percent).await {
        error!("Failed to apply light level {percent}%: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager, MonitorCfg},
        light_curve::ValueRange,
        monitor::{MonitorBus, MonitorHandle},
    };
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    type WriteLog = Arc<Mutex<Vec<(&'static str, u16)>>>;

    struct RecordingBus {
        log: WriteLog,
    }

    struct RecordingHandle {
        log: WriteLog,
    }

    impl MonitorBus for RecordingBus {
        fn open_monitors(&self) -> Result<Vec<Box<dyn MonitorHandle>>> {
            Ok(vec![Box::new(RecordingHandle {
                log: self.log.clone(),
            })])
        }
    }

    impl MonitorHandle for RecordingHandle {
        fn id(&self) -> String {
            "recording".to_string()
        }

        fn set_brightness(&mut self, value: u16) -> Result<()> {
            self.log.lock().unwrap().push(("brightness", value));
            Ok(())
        }

        fn set_contrast(&mut self, value: u16) -> Result<()> {
            self.log.lock().unwrap().push(("contrast", value));
            Ok(())
        }
    }

    async fn state_with_recording_bus() -> (Arc<AppState>, WriteLog) {
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
                    min: 60,
                    max: 92,
                    power: 1.0,
                },
            }],
        };

        let config_manager = ConfigManager::new(config, std::path::PathBuf::from("/tmp/test.yml"));
        let log: WriteLog = Arc::new(Mutex::new(Vec::new()));
        let state = AppState::with_bus(config_manager, Box::new(RecordingBus { log: log.clone() }))
            .await
            .unwrap();
        (Arc::new(state), log)
    }

    #[tokio::test]
    async fn malformed_payload_produces_no_device_write() {
        let (state, log) = state_with_recording_bus().await;

        handle_light_message(&state, "homeassistant/light/brightness_pct", b"abc").await;

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_payload_drives_the_displays() {
        let (state, log) = state_with_recording_bus().await;

        handle_light_message(&state, "homeassistant/light/brightness_pct", b"50").await;

        assert_eq!(
            log.lock().unwrap().clone(),
            vec![("brightness", 52), ("contrast", 76)]
        );
    }

    #[test]
    fn parses_plain_integer() {
        assert_eq!(parse_light_percent(b"42"), Some(42));
    }

    #[test]
    fn parses_padded_integer() {
        assert_eq!(parse_light_percent(b"  87\n"), Some(87));
    }

    #[test]
    fn parses_out_of_range_values_verbatim() {
        // Clamping happens in the mapper, not at the ingress.
        assert_eq!(parse_light_percent(b"250"), Some(250));
        assert_eq!(parse_light_percent(b"-5"), Some(-5));
    }

    #[test]
    fn rejects_non_numeric_payloads() {
        assert_eq!(parse_light_percent(b"bright"), None);
        assert_eq!(parse_light_percent(b"42.5"), None);
        assert_eq!(parse_light_percent(b""), None);
        assert_eq!(parse_light_percent(&[0xff, 0xfe]), None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(backoff.as_secs());
            backoff = next_backoff(backoff);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn options_carry_host_and_port() {
        let mqtt = MqttCfg {
            host: "broker.local".to_string(),
            port: 8883,
            light_topic: "homeassistant/light/brightness_pct".to_string(),
            refresh_topic: "homeassistant/light/refresh".to_string(),
        };

        let options = build_mqtt_options(&mqtt);
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 8883));
    }
}
