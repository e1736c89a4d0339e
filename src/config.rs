//! Configuration management for the luxsyncd daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that defines the broker session and per-monitor brightness/contrast
//! mappings.

use crate::event::ConfigChangeType;
use crate::light_curve::ValueRange;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::RwLock;

/// Main configuration structure for the luxsyncd daemon.
///
/// Deserialized from the YAML configuration file.
///
/// # Example
///
/// ```yaml
/// version: 1
/// mqtt:
///   host: 192.168.1.10
/// monitors:
///   - name: "Dell U2720Q"
///     brightness: { min: 3, max: 100 }
///     contrast: { min: 60, max: 92, power: 1.2 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Broker session settings. Changes here require a daemon restart.
    pub mqtt: MqttCfg,

    /// Monitor profiles, in physical enumeration order.
    pub monitors: Vec<MonitorCfg>,
}

/// MQTT broker session settings.
///
/// Credentials deliberately never live in this file; they come from the
/// `LUXSYNCD_MQTT_USERNAME` / `LUXSYNCD_MQTT_PASSWORD` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttCfg {
    /// Broker hostname or address.
    pub host: String,

    /// Broker port.
    #[serde(default = "defaults::mqtt_port")]
    pub port: u16,

    /// Topic carrying the ambient light percentage as a textual integer.
    #[serde(default = "defaults::light_topic")]
    pub light_topic: String,

    /// Topic on which a zero-payload refresh request is published.
    #[serde(default = "defaults::refresh_topic")]
    pub refresh_topic: String,
}

/// One monitor's control profile.
///
/// Position in the `monitors` list corresponds to the device enumeration
/// index at apply time; when more monitors are attached than configured, the
/// last entry is reused for the excess ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorCfg {
    /// Human-readable label, informational only.
    pub name: String,

    /// Brightness range and shaping exponent.
    pub brightness: ValueRange,

    /// Contrast range and shaping exponent.
    pub contrast: ValueRange,
}

mod defaults {
    pub fn mqtt_port() -> u16 {
        1883
    }

    pub fn light_topic() -> String {
        "homeassistant/light/brightness_pct".to_string()
    }

    pub fn refresh_topic() -> String {
        "homeassistant/light/refresh".to_string()
    }
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// A configuration that passes here is guaranteed to yield a non-empty
    /// snapshot with well-formed ranges.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            anyhow::bail!("mqtt.host must not be empty");
        }

        if self.monitors.is_empty() {
            anyhow::bail!("at least one monitor profile is required");
        }

        for monitor in &self.monitors {
            for (control, range) in [
                ("brightness", &monitor.brightness),
                ("contrast", &monitor.contrast),
            ] {
                if range.max < range.min {
                    anyhow::bail!(
                        "monitor '{}': {} range has max {} below min {}",
                        monitor.name,
                        control,
                        range.max,
                        range.min
                    );
                }
                if !range.power.is_finite() || range.power <= 0.0 {
                    anyhow::bail!(
                        "monitor '{}': {} power {} must be a positive finite number",
                        monitor.name,
                        control,
                        range.power
                    );
                }
            }
        }

        Ok(())
    }
}

fn locate_config() -> Result<PathBuf> {
    // 1) ENV
    if let Ok(env_path) = env::var("LUXSYNCD_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    // 2) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("luxsyncd/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    // 3) /etc
    let etc = Path::new("/etc/luxsyncd/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Configuration manager that handles both config data and file operations.
///
/// Provides a unified interface for loading and reloading the configuration
/// without exposing the underlying file path to the rest of the application.
///
/// # Example
///
/// ```no_run
/// use luxsyncd::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
/// let host = config_manager.get().await.mqtt.host.clone();
/// config_manager.reload().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches in the following order:
    /// 1. Provided path parameter
    /// 2. LUXSYNCD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/luxsyncd/config.yml or ~/.config/luxsyncd/config.yml
    /// 4. /etc/luxsyncd/config.yml
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, config_path))
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Returns the path to the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads configuration from the same file.
    ///
    /// The in-memory configuration is only replaced after the new file has
    /// parsed and validated; on failure the previous configuration stays in
    /// effect.
    pub async fn reload(&self) -> Result<()> {
        info!("Reloading config from: {}", self.path.display());
        let new_config = Self::load_config_from_path(&self.path)?;

        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Clones the current configuration.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Classifies the pending on-disk changes against the active config.
    ///
    /// Monitor profile edits can be applied live; broker session edits take
    /// effect only after a restart. Parse failures propagate so the caller
    /// can leave the active configuration untouched.
    pub async fn analyze_config_changes(&self) -> Result<ConfigChangeType> {
        let candidate = Self::load_config_from_path(&self.path)?;
        let current = self.config.read().await;

        if candidate.mqtt != current.mqtt {
            return Ok(ConfigChangeType::RestartRequired {
                changed_sections: vec!["mqtt".to_string()],
            });
        }

        Ok(ConfigChangeType::HotReload)
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
