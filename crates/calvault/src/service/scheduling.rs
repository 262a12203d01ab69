use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use calvault_core::entity::SchedulingObject;
use calvault_core::store::{Result, SchedulingObjectStore};

use crate::events::{DomainEvent, EventBus};

/// Service for the per-principal scheduling inbox.
pub struct SchedulingService {
    store: Arc<dyn SchedulingObjectStore>,
    events: EventBus,
    retention: Option<Duration>,
}

impl SchedulingService {
    /// Creates the service. `retention = None` keeps inbox messages
    /// indefinitely.
    pub fn new(
        store: Arc<dyn SchedulingObjectStore>,
        events: EventBus,
        retention: Option<Duration>,
    ) -> Self {
        Self {
            store,
            events,
            retention,
        }
    }

    /// Fetches one inbox message.
    pub async fn get_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<SchedulingObject>> {
        self.store.get(principal_uri, uri).await
    }

    /// All inbox messages of a principal.
    pub async fn get_scheduling_objects(
        &self,
        principal_uri: &str,
    ) -> Result<Vec<SchedulingObject>> {
        self.store.find_by_principal(principal_uri).await
    }

    /// Delivers an iTip message into the principal's inbox.
    pub async fn create_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
        raw_data: &str,
    ) -> Result<()> {
        let object = SchedulingObject {
            principal_uri: principal_uri.to_string(),
            uri: uri.to_string(),
            raw_data: raw_data.to_string(),
            date_created: Utc::now(),
        };
        self.store.create(&object).await?;

        tracing::debug!(principal = %principal_uri, uri = %uri, "Scheduling message stored");
        self.events.publish(DomainEvent::SchedulingMessageStored {
            principal_uri: principal_uri.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    /// Removes one inbox message.
    pub async fn delete_scheduling_object(&self, principal_uri: &str, uri: &str) -> Result<()> {
        self.store.delete(principal_uri, uri).await
    }

    /// Removes every message older than the configured retention;
    /// returns how many were removed, or 0 when expiry is disabled.
    pub async fn expire_once(&self) -> Result<u64> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let removed = self.store.delete_expired(cutoff).await?;
        if removed > 0 {
            tracing::debug!(removed, "Expired scheduling messages removed");
        }
        Ok(removed)
    }

    /// Spawns the background reaper that enforces retention.
    ///
    /// Returns `None` when expiry is disabled. Store errors inside the
    /// loop are logged and the loop keeps going; the reaper never takes
    /// the backend down.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        self.retention?;
        let service = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = service.expire_once().await {
                    tracing::warn!(error = %err, "Scheduling reaper pass failed");
                }
            }
        }))
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use calvault_core::store::StoreError;

    use crate::storage::InMemoryStore;

    const ITIP: &str = "BEGIN:VCALENDAR\r\nMETHOD:REQUEST\r\nEND:VCALENDAR\r\n";

    fn service(store: &Arc<InMemoryStore>, retention: Option<Duration>) -> SchedulingService {
        SchedulingService::new(store.clone(), EventBus::new(16), retention)
    }

    #[tokio::test]
    async fn test_inbox_round_trip() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, None);

        service
            .create_scheduling_object("principals/users/alice", "invite.ics", ITIP)
            .await
            .unwrap();

        let fetched = service
            .get_scheduling_object("principals/users/alice", "invite.ics")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.raw_data, ITIP);

        let all = service
            .get_scheduling_objects("principals/users/alice")
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        service
            .delete_scheduling_object("principals/users/alice", "invite.ics")
            .await
            .unwrap();
        assert!(service
            .get_scheduling_object("principals/users/alice", "invite.ics")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deleting_missing_message_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, None);

        let result = service
            .delete_scheduling_object("principals/users/alice", "gone.ics")
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_expiry_disabled_without_retention() {
        let store = Arc::new(InMemoryStore::new());
        let service = Arc::new(service(&store, None));

        service
            .create_scheduling_object("principals/users/alice", "invite.ics", ITIP)
            .await
            .unwrap();

        assert_eq!(service.expire_once().await.unwrap(), 0);
        assert!(service.spawn_reaper(Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn test_expire_once_removes_messages_past_retention() {
        let store = Arc::new(InMemoryStore::new());
        // Zero retention: everything already created is expired.
        let service = service(&store, Some(Duration::from_secs(0)));

        service
            .create_scheduling_object("principals/users/alice", "invite.ics", ITIP)
            .await
            .unwrap();

        // date_created is strictly in the past by now.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(service.expire_once().await.unwrap(), 1);
        assert!(service
            .get_scheduling_objects("principals/users/alice")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_fresh_messages_survive_expiry() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store, Some(Duration::from_secs(30 * 86_400)));

        service
            .create_scheduling_object("principals/users/alice", "invite.ics", ITIP)
            .await
            .unwrap();

        assert_eq!(service.expire_once().await.unwrap(), 0);
        assert_eq!(
            service
                .get_scheduling_objects("principals/users/alice")
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
