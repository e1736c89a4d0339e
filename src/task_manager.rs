//! Lifecycle management for long-running service tasks.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Tracks spawned service tasks and shuts them down as a group.
///
/// Every task receives a child of the global cancellation token; shutdown
/// cancels the group and waits a bounded grace period per task so a stuck
/// device write cannot hang the daemon exit forever.
pub struct TaskManager {
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
    global_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns a named service task wired to the group cancellation token.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.global_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            let result = task_fn(token).await;
            match &result {
                Ok(()) => info!("Task '{task_name}' completed"),
                Err(e) => error!("Task '{task_name}' failed: {e}"),
            }
            result
        });

        self.tasks.push((name, handle));
        Ok(())
    }

    /// Cancels the group and waits for every task to wind down.
    ///
    /// Collects failures and returns the first one after all tasks have been
    /// reaped, so one bad task never prevents the others from stopping.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());
        self.global_token.cancel();

        let mut first_error = None;
        for (name, handle) in self.tasks.drain(..) {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!("Task '{name}' failed during shutdown: {e}");
                    first_error.get_or_insert(e);
                }
                Ok(Err(join_err)) => {
                    let e = anyhow::anyhow!("Task '{name}' panicked: {join_err}");
                    error!("{e}");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    let e = anyhow::anyhow!("Task '{name}' exceeded the shutdown grace period");
                    error!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.iter().any(|(n, _)| n == name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
