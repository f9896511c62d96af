use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::DomainEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Receives every committed transition. Implementations must not block and
/// cannot fail the transition that produced the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &DomainEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &DomainEvent) {}
}

/// Broadcast hub keyed by listing id and by visitor id, plus a firehose.
///
/// Listing owners subscribe to their listing ids, visitors to their own id.
/// Slow receivers lag and lose the oldest events; senders never wait.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<DomainEvent>>,
    all: broadcast::Sender<DomainEvent>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to events for a listing or visitor id. Creates the channel if needed.
    pub fn subscribe(&self, key: Ulid) -> broadcast::Receiver<DomainEvent> {
        let sender = self
            .channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<DomainEvent> {
        self.all.subscribe()
    }

    /// Send on one key's channel. No-op if nobody is listening.
    pub fn send(&self, key: Ulid, event: &DomainEvent) {
        if let Some(sender) = self.channels.get(&key) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a key's channel, e.g. when a listing is withdrawn.
    pub fn remove(&self, key: &Ulid) {
        self.channels.remove(key);
    }
}

impl EventSink for NotifyHub {
    fn publish(&self, event: &DomainEvent) {
        let appointment = event.appointment();
        self.send(appointment.listing_id, event);
        self.send(appointment.visitor_id, event);
        let _ = self.all.send(event.clone());
        metrics::counter!(crate::observability::EVENTS_PUBLISHED_TOTAL).increment(1);
    }
}
