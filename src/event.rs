//! Event-driven communication between daemon services.

use anyhow::Result;
use tokio::sync::broadcast;

/// Type of configuration change detected on disk.
#[derive(Debug, Clone)]
pub enum ConfigChangeType {
    /// Monitor profile changes that can be applied without restart.
    HotReload,
    /// Broker session changes requiring a full daemon restart.
    RestartRequired {
        /// Configuration sections that changed.
        changed_sections: Vec<String>,
    },
}

/// Application events for inter-service communication.
#[derive(Debug, Clone)]
pub enum Event {
    /// The configuration file changed on disk, classified by impact.
    ConfigChangeDetected(ConfigChangeType),
    /// Ask the broker for a fresh light-level reading.
    ///
    /// Published by the coordinator after a successful hot reload so the new
    /// mapping is reconciled immediately; consumed by the MQTT service.
    RefreshRequested,
    SystemShutdown,
}

/// Publish-subscribe bus between services.
///
/// Built on a tokio broadcast channel: every subscriber sees every event
/// published after it subscribed, and publishers never block.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new EventBus with default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Creates a new subscriber to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_subscribe_roundtrip() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::RefreshRequested).unwrap();

        match rx.recv().await.unwrap() {
            Event::RefreshRequested => {}
            other => panic!("expected RefreshRequested, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_subscribers_receive_each_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Event::SystemShutdown).unwrap();

        assert!(matches!(rx1.recv().await.unwrap(), Event::SystemShutdown));
        assert!(matches!(rx2.recv().await.unwrap(), Event::SystemShutdown));
    }

    #[tokio::test]
    async fn events_arrive_in_publication_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::ConfigChangeDetected(ConfigChangeType::HotReload))
            .unwrap();
        bus.publish(Event::RefreshRequested).unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::ConfigChangeDetected(ConfigChangeType::HotReload)
        ));
        assert!(matches!(rx.recv().await.unwrap(), Event::RefreshRequested));
    }

    #[test]
    fn publish_without_subscribers_is_an_error() {
        let bus = EventBus::new();
        assert!(bus.publish(Event::RefreshRequested).is_err());
    }

    #[tokio::test]
    async fn cloned_bus_shares_the_channel() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let mut rx = bus.subscribe();

        clone.publish(Event::SystemShutdown).unwrap();
        assert!(matches!(rx.recv().await.unwrap(), Event::SystemShutdown));
    }
}
