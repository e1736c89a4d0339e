//! # luxsyncd
//!
//! A Linux daemon that follows ambient light and adjusts monitor brightness
//! and contrast over DDC/CI.
//!
//! ## Features
//!
//! - **MQTT Ingress**: Consumes ambient light levels published by a sensor
//! - **Power Curves**: Per-monitor response shaping into device value ranges
//! - **DDC/CI Output**: Writes VCP luminance and contrast codes directly
//! - **Debounced Writes**: Skips writes when the device value is unchanged
//! - **Hot Reload**: Monitor profile changes apply without restart
//!
//! ## Architecture
//!
//! The daemon uses a provider-based dependency injection system with:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`AppState`](app_context::AppState) - Shared application state
//! - Service providers for the MQTT ingress and config watcher
//!
//! ## Example
//!
//! ```no_run
//! use luxsyncd::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod applier;
pub mod cli;
pub mod config;
pub mod config_store;
pub mod coordinator;
pub mod drivers;
pub mod event;
pub mod light_curve;
pub mod monitor;
pub mod providers;
pub mod task_manager;
