//! In-memory store implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use calvault_core::entity::{
    AccessLevel, Calendar, CalendarInstance, CalendarObject, ChangeOperation, ChangeRecord,
    InviteStatus, PublicRight, SchedulingObject, Subscription,
};
use calvault_core::store::{
    CalendarInstanceStore, CalendarObjectStore, CalendarStore, ChangeLogStore, ObjectFilter,
    Result, SchedulingObjectStore, StoreError, SubscriptionStore,
};

/// In-memory storage backend.
///
/// Uses HashMaps wrapped in `Arc<RwLock<_>>` for thread-safe access.
/// Data is not persisted and is lost when the store is dropped. The
/// change-log append takes both the calendar and change locks, so a sync
/// reader can never observe an advanced token without its record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    calendars: Arc<RwLock<HashMap<Uuid, Calendar>>>,
    instances: Arc<RwLock<HashMap<Uuid, CalendarInstance>>>,
    objects: Arc<RwLock<HashMap<(Uuid, String), CalendarObject>>>,
    changes: Arc<RwLock<Vec<ChangeRecord>>>,
    scheduling: Arc<RwLock<HashMap<(String, String), SchedulingObject>>>,
    subscriptions: Arc<RwLock<HashMap<(String, String), Subscription>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarStore for InMemoryStore {
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Calendar>> {
        let calendars = self.calendars.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| calendars.get(id).cloned())
            .collect())
    }

    async fn create(&self, calendar: &Calendar) -> Result<Uuid> {
        let mut calendars = self.calendars.write().await;
        if calendars.contains_key(&calendar.id) {
            return Err(StoreError::Conflict {
                entity_type: "Calendar",
                id: calendar.id.to_string(),
            });
        }
        calendars.insert(calendar.id, calendar.clone());
        Ok(calendar.id)
    }

    async fn update(&self, calendar: &Calendar) -> Result<()> {
        let mut calendars = self.calendars.write().await;
        match calendars.get_mut(&calendar.id) {
            Some(existing) => {
                // The counter is owned by the change log; property
                // updates must not move it.
                let sync_token = existing.sync_token;
                *existing = calendar.clone();
                existing.sync_token = sync_token;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity_type: "Calendar",
                id: calendar.id.to_string(),
            }),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut calendars = self.calendars.write().await;
        if calendars.remove(&id).is_none() {
            return Err(StoreError::NotFound {
                entity_type: "Calendar",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_sync_token(&self, id: Uuid) -> Result<Option<i64>> {
        let calendars = self.calendars.read().await;
        Ok(calendars.get(&id).map(|c| c.sync_token))
    }

    async fn increment_sync_token(&self, id: Uuid) -> Result<i64> {
        let mut calendars = self.calendars.write().await;
        match calendars.get_mut(&id) {
            Some(calendar) => {
                calendar.sync_token += 1;
                Ok(calendar.sync_token)
            }
            None => Err(StoreError::NotFound {
                entity_type: "Calendar",
                id: id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CalendarInstanceStore for InMemoryStore {
    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<CalendarInstance>> {
        let instances = self.instances.read().await;
        let mut result: Vec<CalendarInstance> = instances
            .values()
            .filter(|i| i.principal_uri == principal_uri)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(result)
    }

    async fn find_one(
        &self,
        principal_uri: &str,
        uri: &str,
        access: Option<AccessLevel>,
    ) -> Result<Option<CalendarInstance>> {
        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .find(|i| {
                i.principal_uri == principal_uri
                    && i.uri == uri
                    && access.is_none_or(|a| i.access == a)
            })
            .cloned())
    }

    async fn find_by_calendar(&self, calendar_id: Uuid) -> Result<Vec<CalendarInstance>> {
        let instances = self.instances.read().await;
        let mut result: Vec<CalendarInstance> = instances
            .values()
            .filter(|i| i.calendar_id == calendar_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.principal_uri.cmp(&b.principal_uri));
        Ok(result)
    }

    async fn find_owner_instance(&self, calendar_id: Uuid) -> Result<Option<CalendarInstance>> {
        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .find(|i| i.calendar_id == calendar_id && i.access.is_shared_owner())
            .cloned())
    }

    async fn find_by_share_href(
        &self,
        calendar_id: Uuid,
        share_href: &str,
    ) -> Result<Option<CalendarInstance>> {
        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .find(|i| i.calendar_id == calendar_id && i.share_href.as_deref() == Some(share_href))
            .cloned())
    }

    async fn create(&self, instance: &CalendarInstance) -> Result<Uuid> {
        let mut instances = self.instances.write().await;
        let duplicate = instances.values().any(|i| {
            i.principal_uri == instance.principal_uri && i.uri == instance.uri
        });
        if duplicate || instances.contains_key(&instance.id) {
            return Err(StoreError::Conflict {
                entity_type: "CalendarInstance",
                id: format!("{}:{}", instance.principal_uri, instance.uri),
            });
        }
        instances.insert(instance.id, instance.clone());
        Ok(instance.id)
    }

    async fn update(&self, instance: &CalendarInstance) -> Result<()> {
        let mut instances = self.instances.write().await;
        if !instances.contains_key(&instance.id) {
            return Err(StoreError::NotFound {
                entity_type: "CalendarInstance",
                id: instance.id.to_string(),
            });
        }
        instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn set_invite_status(&self, instance_id: Uuid, status: InviteStatus) -> Result<()> {
        let mut instances = self.instances.write().await;
        match instances.get_mut(&instance_id) {
            Some(instance) => {
                instance.invite_status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity_type: "CalendarInstance",
                id: instance_id.to_string(),
            }),
        }
    }

    async fn set_public_right(&self, calendar_id: Uuid, right: Option<PublicRight>) -> Result<()> {
        let mut instances = self.instances.write().await;
        for instance in instances.values_mut() {
            if instance.calendar_id == calendar_id {
                instance.public_right = right;
            }
        }
        Ok(())
    }

    async fn delete(&self, instance_id: Uuid) -> Result<()> {
        let mut instances = self.instances.write().await;
        if instances.remove(&instance_id).is_none() {
            return Err(StoreError::NotFound {
                entity_type: "CalendarInstance",
                id: instance_id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_by_share_href(&self, calendar_id: Uuid, share_href: &str) -> Result<()> {
        let mut instances = self.instances.write().await;
        let id = instances
            .values()
            .find(|i| i.calendar_id == calendar_id && i.share_href.as_deref() == Some(share_href))
            .map(|i| i.id);
        match id {
            Some(id) => {
                instances.remove(&id);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity_type: "CalendarInstance",
                id: format!("{calendar_id}:{share_href}"),
            }),
        }
    }

    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()> {
        let mut instances = self.instances.write().await;
        instances.retain(|_, i| i.calendar_id != calendar_id);
        Ok(())
    }
}

#[async_trait]
impl CalendarObjectStore for InMemoryStore {
    async fn get(&self, calendar_id: Uuid, uri: &str) -> Result<Option<CalendarObject>> {
        let objects = self.objects.read().await;
        Ok(objects.get(&(calendar_id, uri.to_string())).cloned())
    }

    async fn find_by_calendar(&self, calendar_id: Uuid) -> Result<Vec<CalendarObject>> {
        let objects = self.objects.read().await;
        let mut result: Vec<CalendarObject> = objects
            .values()
            .filter(|o| o.calendar_id == calendar_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(result)
    }

    async fn find_by_uris(
        &self,
        calendar_id: Uuid,
        uris: &[String],
    ) -> Result<Vec<CalendarObject>> {
        let objects = self.objects.read().await;
        Ok(uris
            .iter()
            .filter_map(|uri| objects.get(&(calendar_id, uri.clone())).cloned())
            .collect())
    }

    async fn find_by_uid(&self, calendar_ids: &[Uuid], uid: &str) -> Result<Vec<CalendarObject>> {
        let objects = self.objects.read().await;
        Ok(objects
            .values()
            .filter(|o| o.uid == uid && calendar_ids.contains(&o.calendar_id))
            .cloned()
            .collect())
    }

    async fn query(&self, calendar_id: Uuid, filter: &ObjectFilter) -> Result<Vec<CalendarObject>> {
        let objects = self.objects.read().await;
        let mut result: Vec<CalendarObject> = objects
            .values()
            .filter(|o| o.calendar_id == calendar_id && filter.matches(o))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(result)
    }

    async fn create(&self, object: &CalendarObject) -> Result<()> {
        let mut objects = self.objects.write().await;
        let key = (object.calendar_id, object.uri.clone());
        if objects.contains_key(&key) {
            return Err(StoreError::Conflict {
                entity_type: "CalendarObject",
                id: format!("{}/{}", object.calendar_id, object.uri),
            });
        }
        objects.insert(key, object.clone());
        Ok(())
    }

    async fn update(&self, object: &CalendarObject) -> Result<()> {
        let mut objects = self.objects.write().await;
        let key = (object.calendar_id, object.uri.clone());
        if !objects.contains_key(&key) {
            return Err(StoreError::NotFound {
                entity_type: "CalendarObject",
                id: format!("{}/{}", object.calendar_id, object.uri),
            });
        }
        objects.insert(key, object.clone());
        Ok(())
    }

    async fn delete(&self, calendar_id: Uuid, uri: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        if objects.remove(&(calendar_id, uri.to_string())).is_none() {
            return Err(StoreError::NotFound {
                entity_type: "CalendarObject",
                id: format!("{calendar_id}/{uri}"),
            });
        }
        Ok(())
    }

    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()> {
        let mut objects = self.objects.write().await;
        objects.retain(|(cal, _), _| *cal != calendar_id);
        Ok(())
    }
}

#[async_trait]
impl ChangeLogStore for InMemoryStore {
    async fn append(
        &self,
        calendar_id: Uuid,
        uri: &str,
        operation: ChangeOperation,
    ) -> Result<i64> {
        // Both locks are held across the insert + increment so readers
        // see the record and the advanced token together.
        let mut calendars = self.calendars.write().await;
        let calendar = calendars
            .get_mut(&calendar_id)
            .ok_or_else(|| StoreError::NotFound {
                entity_type: "Calendar",
                id: calendar_id.to_string(),
            })?;
        let mut changes = self.changes.write().await;

        let token = calendar.sync_token;
        changes.push(ChangeRecord {
            calendar_id,
            uri: uri.to_string(),
            sync_token: token,
            operation,
        });
        calendar.sync_token = token + 1;
        Ok(calendar.sync_token)
    }

    async fn changes_in_window(
        &self,
        calendar_id: Uuid,
        from_token: i64,
        to_token: i64,
        limit: Option<u64>,
    ) -> Result<Vec<ChangeRecord>> {
        let changes = self.changes.read().await;
        let mut result: Vec<ChangeRecord> = changes
            .iter()
            .filter(|c| {
                c.calendar_id == calendar_id
                    && c.sync_token >= from_token
                    && c.sync_token < to_token
            })
            .cloned()
            .collect();
        result.sort_by_key(|c| c.sync_token);
        if let Some(limit) = limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()> {
        let mut changes = self.changes.write().await;
        changes.retain(|c| c.calendar_id != calendar_id);
        Ok(())
    }
}

#[async_trait]
impl SchedulingObjectStore for InMemoryStore {
    async fn get(&self, principal_uri: &str, uri: &str) -> Result<Option<SchedulingObject>> {
        let scheduling = self.scheduling.read().await;
        Ok(scheduling
            .get(&(principal_uri.to_string(), uri.to_string()))
            .cloned())
    }

    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<SchedulingObject>> {
        let scheduling = self.scheduling.read().await;
        let mut result: Vec<SchedulingObject> = scheduling
            .values()
            .filter(|o| o.principal_uri == principal_uri)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(result)
    }

    async fn create(&self, object: &SchedulingObject) -> Result<()> {
        let mut scheduling = self.scheduling.write().await;
        let key = (object.principal_uri.clone(), object.uri.clone());
        if scheduling.contains_key(&key) {
            return Err(StoreError::Conflict {
                entity_type: "SchedulingObject",
                id: format!("{}:{}", object.principal_uri, object.uri),
            });
        }
        scheduling.insert(key, object.clone());
        Ok(())
    }

    async fn delete(&self, principal_uri: &str, uri: &str) -> Result<()> {
        let mut scheduling = self.scheduling.write().await;
        let key = (principal_uri.to_string(), uri.to_string());
        if scheduling.remove(&key).is_none() {
            return Err(StoreError::NotFound {
                entity_type: "SchedulingObject",
                id: format!("{principal_uri}:{uri}"),
            });
        }
        Ok(())
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut scheduling = self.scheduling.write().await;
        let before = scheduling.len();
        scheduling.retain(|_, o| o.date_created >= cutoff);
        Ok((before - scheduling.len()) as u64)
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        let mut result: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.principal_uri == principal_uri)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(result)
    }

    async fn get(&self, principal_uri: &str, uri: &str) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .get(&(principal_uri.to_string(), uri.to_string()))
            .cloned())
    }

    async fn find_by_source(&self, source: &str) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions
            .values()
            .filter(|s| s.source == source)
            .cloned()
            .collect())
    }

    async fn create(&self, subscription: &Subscription) -> Result<Uuid> {
        let mut subscriptions = self.subscriptions.write().await;
        let key = (subscription.principal_uri.clone(), subscription.uri.clone());
        if subscriptions.contains_key(&key) {
            return Err(StoreError::Conflict {
                entity_type: "Subscription",
                id: format!("{}:{}", subscription.principal_uri, subscription.uri),
            });
        }
        subscriptions.insert(key, subscription.clone());
        Ok(subscription.id)
    }

    async fn update(&self, subscription: &Subscription) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let key = (subscription.principal_uri.clone(), subscription.uri.clone());
        if !subscriptions.contains_key(&key) {
            return Err(StoreError::NotFound {
                entity_type: "Subscription",
                id: format!("{}:{}", subscription.principal_uri, subscription.uri),
            });
        }
        subscriptions.insert(key, subscription.clone());
        Ok(())
    }

    async fn delete(&self, principal_uri: &str, uri: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let key = (principal_uri.to_string(), uri.to_string());
        if subscriptions.remove(&key).is_none() {
            return Err(StoreError::NotFound {
                entity_type: "Subscription",
                id: format!("{principal_uri}:{uri}"),
            });
        }
        Ok(())
    }
}
