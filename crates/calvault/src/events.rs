//! Outbound domain-event port.
//!
//! Services publish here; the real-time layer subscribes. Delivery is
//! best-effort over a bounded broadcast channel: a lagging subscriber
//! drops events, and no storage invariant depends on delivery.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use calvault_core::entity::PublicRight;

/// An event emitted after a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DomainEvent {
    CalendarCreated {
        calendar_id: Uuid,
        principal_uri: String,
    },
    CalendarUpdated {
        calendar_id: Uuid,
    },
    CalendarDeleted {
        calendar_id: Uuid,
        principal_uri: String,
    },
    ObjectCreated {
        calendar_id: Uuid,
        uri: String,
        etag: String,
    },
    ObjectUpdated {
        calendar_id: Uuid,
        uri: String,
        etag: String,
    },
    ObjectDeleted {
        calendar_id: Uuid,
        uri: String,
    },
    InvitesUpdated {
        calendar_id: Uuid,
    },
    PublicRightChanged {
        calendar_id: Uuid,
        right: Option<PublicRight>,
    },
    SubscriptionCreated {
        principal_uri: String,
        uri: String,
    },
    SubscriptionUpdated {
        principal_uri: String,
        uri: String,
    },
    SubscriptionDeleted {
        principal_uri: String,
        uri: String,
    },
    SchedulingMessageStored {
        principal_uri: String,
        uri: String,
    },
}

/// Bounded broadcast channel carrying [`DomainEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub(crate) fn publish(&self, event: DomainEvent) {
        tracing::trace!(?event, "Publishing domain event");
        let _ = self.tx.send(event);
    }
}
