//! Event bus for arena observers
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never fails: an event
//! with no subscribers is simply dropped.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::ArenaEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
pub struct EventBus {
    sender: broadcast::Sender<ArenaEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ArenaEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by conversation ID
    pub conversation_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by conversation ID
    pub fn conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &ArenaEvent) -> bool {
        if let Some(ref cid) = self.conversation_id {
            if event.conversation_id() != Some(cid.as_str()) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<ArenaEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<ArenaEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<ArenaEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn toggled(conversation_id: &str) -> ArenaEvent {
        ArenaEvent::SimulationToggled {
            conversation_id: conversation_id.to_string(),
            active: true,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(toggled("c-1"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "simulation_toggled");
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(toggled("c-1"));
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .conversation("c-1")
            .types(vec!["simulation_toggled"]);

        let other_conversation = toggled("c-2");
        let other_type = ArenaEvent::MatchFinished {
            match_id: "m-1".to_string(),
            winner_id: "p-1".to_string(),
            judge_fallback: false,
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&toggled("c-1")));
        assert!(!filter.matches(&other_conversation));
        assert!(!filter.matches(&other_type));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().conversation("target"));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(toggled("other"));
            publisher.publish(toggled("target"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.conversation_id(), Some("target"));
    }
}
