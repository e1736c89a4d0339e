use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Async factory for a component that needs fallible initialization.
///
/// # Example
///
/// ```no_run
/// use luxsyncd::providers::traits::AsyncProvider;
///
/// struct TopicProvider;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<String> for TopicProvider {
///     async fn provide(&self) -> anyhow::Result<String> {
///         Ok("homeassistant/light/brightness_pct".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A long-running service that is started through the [`TaskManager`].
///
/// Services declare a startup priority and whether the daemon can survive
/// their startup failure. The coordinator starts them from highest priority
/// down and aborts startup when a critical service fails.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Spawns the service's tasks into the task manager.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Service name for logging.
    fn name(&self) -> &'static str;

    /// Startup priority (higher numbers start first).
    fn priority(&self) -> i32 {
        0
    }

    /// Whether a startup failure should abort the daemon.
    fn is_critical(&self) -> bool {
        false
    }
}
