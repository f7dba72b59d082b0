//! Event dispatcher implementation.
//!
//! One dispatcher per driver instance. There is no process-wide instance.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{EventKind, RoutingEvent};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event kinds
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these kinds.
    Kinds(Vec<EventKind>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &RoutingEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kinds(kinds) => kinds.contains(&event.kind()),
        }
    }
}

type EventHandler = Arc<dyn Fn(RoutingEvent) + Send + Sync>;

/// Error types for dispatcher operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventBusError {
    /// No subscribers are listening
    #[error("No active subscribers")]
    NoSubscribers,
}

/// Tagged-union event channel: synchronous handlers plus a broadcast channel
#[derive(Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<RoutingEvent>,
    handlers: Arc<RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>>,
}

impl EventDispatcher {
    /// Create a dispatcher whose broadcast channel holds `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish an event to all subscribers
    ///
    /// Handlers run on the calling thread. Returns the number of handlers
    /// and receivers reached.
    pub fn publish(&self, event: RoutingEvent) -> Result<usize, EventBusError> {
        // Snapshot so handlers may subscribe/unsubscribe without deadlocking.
        let matching: Vec<EventHandler> = self
            .handlers
            .read()
            .values()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in &matching {
            handler(event.clone());
        }

        match self.sender.send(event) {
            Ok(count) => Ok(count + matching.len()),
            Err(_) if !matching.is_empty() => Ok(matching.len()),
            Err(_) => Err(EventBusError::NoSubscribers),
        }
    }

    /// Publish and ignore the no-subscriber case
    pub fn emit(&self, event: RoutingEvent) {
        tracing::trace!("Routing event: {}", event.description());
        self.publish(event).ok();
    }

    /// Subscribe with a synchronous handler
    ///
    /// The handler is called on the publishing thread (usually the parser
    /// worker), so it should return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(RoutingEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Arc::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Get a receiver for async consumption
    pub fn receiver(&self) -> broadcast::Receiver<RoutingEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe; returns true if the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of synchronous handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventDispatcher::default();

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventDispatcher::default();
        assert!(bus.publish(RoutingEvent::StatusReport).is_err());
    }

    #[test]
    fn test_event_filtering() {
        let bus = EventDispatcher::default();
        let status_count = Arc::new(AtomicUsize::new(0));
        let all_count = Arc::new(AtomicUsize::new(0));

        let sc = status_count.clone();
        bus.subscribe(EventFilter::Kinds(vec![EventKind::StatusReport]), move |_| {
            sc.fetch_add(1, Ordering::SeqCst);
        });
        let ac = all_count.clone();
        bus.subscribe(EventFilter::All, move |_| {
            ac.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(RoutingEvent::StatusReport);
        bus.emit(RoutingEvent::BufferUpdate(10));

        assert_eq!(status_count.load(Ordering::SeqCst), 1);
        assert_eq!(all_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = EventDispatcher::default();
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionId>>> = Arc::default();
        let inner_bus = bus.clone();
        let inner_slot = slot.clone();
        let id = bus.subscribe(EventFilter::All, move |_| {
            if let Some(id) = inner_slot.lock().take() {
                inner_bus.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        bus.emit(RoutingEvent::ConnectionTimeout);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventDispatcher::new(16);
        let mut receiver = bus.receiver();

        bus.emit(RoutingEvent::UserMessage("hello".to_string()));

        match receiver.recv().await {
            Ok(RoutingEvent::UserMessage(msg)) => assert_eq!(msg, "hello"),
            other => panic!("Wrong event received: {:?}", other),
        }
    }
}
