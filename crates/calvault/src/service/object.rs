use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use calvault_core::entity::{CalendarObject, ChangeOperation, ObjectMetadata};
use calvault_core::store::{CalendarObjectStore, ObjectFilter, Result};

use crate::events::{DomainEvent, EventBus};

use super::tracker::ChangeTracker;

/// Computes the etag for a stored object: the SHA-256 hex digest of its
/// raw calendar data.
pub fn compute_etag(raw_data: &str) -> String {
    hex::encode(Sha256::digest(raw_data.as_bytes()))
}

/// Service for calendar object (event resource) operations.
///
/// Every mutation writes the object first and records the change (which
/// advances the sync token) second, so an observer can never see the
/// counter advance before the object write is durable.
pub struct CalendarObjectService {
    objects: Arc<dyn CalendarObjectStore>,
    tracker: ChangeTracker,
    events: EventBus,
}

impl CalendarObjectService {
    /// Creates the service over its stores.
    pub fn new(objects: Arc<dyn CalendarObjectStore>, tracker: ChangeTracker, events: EventBus) -> Self {
        Self {
            objects,
            tracker,
            events,
        }
    }

    /// Fetches one object by uri.
    pub async fn get_calendar_object(
        &self,
        calendar_id: Uuid,
        uri: &str,
    ) -> Result<Option<CalendarObject>> {
        self.objects.get(calendar_id, uri).await
    }

    /// Fetches a batch of objects by uri, for multiget responses. Unknown
    /// uris are silently absent from the result.
    pub async fn get_multiple_calendar_objects(
        &self,
        calendar_id: Uuid,
        uris: &[String],
    ) -> Result<Vec<CalendarObject>> {
        self.objects.find_by_uris(calendar_id, uris).await
    }

    /// All object uris of a calendar, for full-listing sync responses.
    pub async fn get_all_uris(&self, calendar_id: Uuid) -> Result<Vec<String>> {
        let objects = self.objects.find_by_calendar(calendar_id).await?;
        Ok(objects.into_iter().map(|o| o.uri).collect())
    }

    /// Runs a calendar query and returns the matching uris only.
    pub async fn calendar_query(
        &self,
        calendar_id: Uuid,
        filter: &ObjectFilter,
    ) -> Result<Vec<String>> {
        let objects = self.objects.query(calendar_id, filter).await?;
        Ok(objects.into_iter().map(|o| o.uri).collect())
    }

    /// Runs a calendar query and returns the full matching records.
    pub async fn calendar_query_with_all_data(
        &self,
        calendar_id: Uuid,
        filter: &ObjectFilter,
    ) -> Result<Vec<CalendarObject>> {
        self.objects.query(calendar_id, filter).await
    }

    /// Stores a new object; returns its etag.
    pub async fn create_calendar_object(
        &self,
        calendar_id: Uuid,
        uri: &str,
        raw_data: &str,
        metadata: ObjectMetadata,
    ) -> Result<String> {
        let object = build_object(calendar_id, uri, raw_data, metadata);
        let etag = object.etag.clone();

        self.objects.create(&object).await?;
        self.tracker
            .record(calendar_id, uri, ChangeOperation::Added)
            .await?;

        tracing::debug!(calendar_id = %calendar_id, uri = %uri, "Calendar object created");
        self.events.publish(DomainEvent::ObjectCreated {
            calendar_id,
            uri: uri.to_string(),
            etag: etag.clone(),
        });
        Ok(etag)
    }

    /// Replaces an existing object; returns the new etag.
    pub async fn update_calendar_object(
        &self,
        calendar_id: Uuid,
        uri: &str,
        raw_data: &str,
        metadata: ObjectMetadata,
    ) -> Result<String> {
        let object = build_object(calendar_id, uri, raw_data, metadata);
        let etag = object.etag.clone();

        self.objects.update(&object).await?;
        self.tracker
            .record(calendar_id, uri, ChangeOperation::Modified)
            .await?;

        tracing::debug!(calendar_id = %calendar_id, uri = %uri, "Calendar object updated");
        self.events.publish(DomainEvent::ObjectUpdated {
            calendar_id,
            uri: uri.to_string(),
            etag: etag.clone(),
        });
        Ok(etag)
    }

    /// Deletes one object.
    pub async fn delete_calendar_object(&self, calendar_id: Uuid, uri: &str) -> Result<()> {
        self.objects.delete(calendar_id, uri).await?;
        self.tracker
            .record(calendar_id, uri, ChangeOperation::Deleted)
            .await?;

        tracing::debug!(calendar_id = %calendar_id, uri = %uri, "Calendar object deleted");
        self.events.publish(DomainEvent::ObjectDeleted {
            calendar_id,
            uri: uri.to_string(),
        });
        Ok(())
    }
}

fn build_object(
    calendar_id: Uuid,
    uri: &str,
    raw_data: &str,
    metadata: ObjectMetadata,
) -> CalendarObject {
    CalendarObject {
        calendar_id,
        uri: uri.to_string(),
        uid: metadata.uid,
        component_type: metadata.component_type,
        first_occurrence: metadata.first_occurrence,
        last_occurrence: metadata.last_occurrence,
        raw_data: raw_data.to_string(),
        etag: compute_etag(raw_data),
        size: raw_data.len() as i64,
        last_modified: Utc::now(),
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use calvault_core::entity::{Calendar, ComponentType};
    use calvault_core::store::{CalendarStore, ChangeLogStore, StoreError};

    use crate::storage::InMemoryStore;

    fn service(store: &Arc<InMemoryStore>) -> CalendarObjectService {
        CalendarObjectService::new(
            store.clone(),
            ChangeTracker::new(store.clone()),
            EventBus::new(16),
        )
    }

    async fn calendar(store: &Arc<InMemoryStore>) -> Uuid {
        let calendar = Calendar::new("principals/users/alice", "Work");
        CalendarStore::create(store.as_ref(), &calendar).await.unwrap()
    }

    const ICS: &str = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:uid-1\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    #[tokio::test]
    async fn test_round_trip_returns_data_and_fresh_etag() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let calendar_id = calendar(&store).await;
        let meta = ObjectMetadata::new("uid-1", ComponentType::Event);

        let etag = service
            .create_calendar_object(calendar_id, "a.ics", ICS, meta.clone())
            .await
            .unwrap();
        assert!(!etag.is_empty());

        let fetched = service
            .get_calendar_object(calendar_id, "a.ics")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.raw_data, ICS);
        assert_eq!(fetched.etag, etag);

        let updated = ICS.replace("uid-1", "uid-1-v2");
        let meta = ObjectMetadata::new("uid-1", ComponentType::Event);
        let new_etag = service
            .update_calendar_object(calendar_id, "a.ics", &updated, meta)
            .await
            .unwrap();
        assert_ne!(new_etag, etag);
    }

    #[tokio::test]
    async fn test_each_mutation_advances_the_token_once() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let calendar_id = calendar(&store).await;

        for n in 1..=3 {
            let uri = format!("event-{n}.ics");
            service
                .create_calendar_object(
                    calendar_id,
                    &uri,
                    ICS,
                    ObjectMetadata::new(format!("uid-{n}"), ComponentType::Event),
                )
                .await
                .unwrap();
        }

        assert_eq!(
            CalendarStore::get_sync_token(store.as_ref(), calendar_id)
                .await
                .unwrap(),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_failed_write_records_no_change() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let calendar_id = calendar(&store).await;
        let meta = ObjectMetadata::new("uid-1", ComponentType::Event);

        service
            .create_calendar_object(calendar_id, "a.ics", ICS, meta.clone())
            .await
            .unwrap();
        let duplicate = service
            .create_calendar_object(calendar_id, "a.ics", ICS, meta)
            .await;

        assert!(matches!(duplicate, Err(StoreError::Conflict { .. })));
        // The conflicting write never reached the change log.
        let records = ChangeLogStore::changes_in_window(store.as_ref(), calendar_id, 0, 10, None)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_publishes_event_and_records_change() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let calendar_id = calendar(&store).await;
        let mut rx = service.events.subscribe();

        service
            .create_calendar_object(
                calendar_id,
                "a.ics",
                ICS,
                ObjectMetadata::new("uid-1", ComponentType::Event),
            )
            .await
            .unwrap();
        service
            .delete_calendar_object(calendar_id, "a.ics")
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            DomainEvent::ObjectCreated { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            DomainEvent::ObjectDeleted { .. }
        ));

        let records = ChangeLogStore::changes_in_window(store.as_ref(), calendar_id, 0, 10, None)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].operation, ChangeOperation::Deleted);
    }

    #[test]
    fn test_etag_is_stable_for_identical_data() {
        assert_eq!(compute_etag(ICS), compute_etag(ICS));
        assert_ne!(compute_etag(ICS), compute_etag("BEGIN:VCALENDAR"));
    }
}
