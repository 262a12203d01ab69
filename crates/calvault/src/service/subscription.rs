use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use calvault_core::contract::PropertySet;
use calvault_core::entity::Subscription;
use calvault_core::store::{Result, StoreError, SubscriptionStore};

use crate::events::{DomainEvent, EventBus};

/// Maps the DAV property names shipped by the protocol engine onto
/// [`Subscription`] fields. The defaults cover the standard DAV, Apple
/// and CalendarServer names; deployments with a different protocol
/// dialect can swap individual names.
#[derive(Debug, Clone)]
pub struct PropertyMap {
    pub display_name: String,
    pub refresh_rate: String,
    pub color: String,
    pub order: String,
    pub strip_todos: String,
    pub strip_alarms: String,
    pub strip_attachments: String,
    pub source: String,
}

impl Default for PropertyMap {
    fn default() -> Self {
        Self {
            display_name: "{DAV:}displayname".to_string(),
            refresh_rate: "{http://apple.com/ns/ical/}refreshrate".to_string(),
            color: "{http://apple.com/ns/ical/}calendar-color".to_string(),
            order: "{http://apple.com/ns/ical/}calendar-order".to_string(),
            strip_todos: "{http://calendarserver.org/ns/}subscribed-strip-todos".to_string(),
            strip_alarms: "{http://calendarserver.org/ns/}subscribed-strip-alarms".to_string(),
            strip_attachments: "{http://calendarserver.org/ns/}subscribed-strip-attachments"
                .to_string(),
            source: "{http://calendarserver.org/ns/}source".to_string(),
        }
    }
}

impl PropertyMap {
    /// Applies a property map onto a subscription record.
    fn apply(&self, subscription: &mut Subscription, properties: &PropertySet) -> Result<()> {
        if let Some(value) = properties.get(&self.display_name) {
            subscription.display_name = optional_string(value, &self.display_name)?;
        }
        if let Some(value) = properties.get(&self.refresh_rate) {
            subscription.refresh_rate = optional_string(value, &self.refresh_rate)?;
        }
        if let Some(value) = properties.get(&self.color) {
            subscription.color = optional_string(value, &self.color)?;
        }
        if let Some(value) = properties.get(&self.order) {
            subscription.order = match value {
                Value::Null => None,
                Value::Number(n) => n.as_i64(),
                other => {
                    return Err(StoreError::InvalidArgument(format!(
                        "property {} expects an integer, got {other}",
                        self.order
                    )))
                }
            };
        }
        for (name, field) in [
            (&self.strip_todos, &mut subscription.strip_todos),
            (&self.strip_alarms, &mut subscription.strip_alarms),
            (&self.strip_attachments, &mut subscription.strip_attachments),
        ] {
            if let Some(value) = properties.get(name) {
                *field = value.as_bool().ok_or_else(|| {
                    StoreError::InvalidArgument(format!(
                        "property {name} expects a boolean, got {value}"
                    ))
                })?;
            }
        }
        if let Some(value) = properties.get(&self.source) {
            subscription.source = source_href(value, &self.source)?;
        }
        Ok(())
    }

    /// Extracts the source href from a property map, if present.
    fn source_of(&self, properties: &PropertySet) -> Result<Option<String>> {
        properties
            .get(&self.source)
            .map(|value| source_href(value, &self.source))
            .transpose()
    }
}

fn optional_string(value: &Value, name: &str) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(StoreError::InvalidArgument(format!(
            "property {name} expects a string, got {other}"
        ))),
    }
}

/// A source is shipped either as a plain string or as `{"href": "..."}`.
fn source_href(value: &Value, name: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => match map.get("href") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(StoreError::InvalidArgument(format!(
                "property {name} object is missing an href string"
            ))),
        },
        other => Err(StoreError::InvalidArgument(format!(
            "property {name} expects an href, got {other}"
        ))),
    }
}

/// Service for external-subscription mirror records.
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    events: EventBus,
    property_map: PropertyMap,
}

impl SubscriptionService {
    /// Creates the service with the default property names.
    pub fn new(store: Arc<dyn SubscriptionStore>, events: EventBus) -> Self {
        Self::with_property_map(store, events, PropertyMap::default())
    }

    /// Creates the service with custom property names.
    pub fn with_property_map(
        store: Arc<dyn SubscriptionStore>,
        events: EventBus,
        property_map: PropertyMap,
    ) -> Self {
        Self {
            store,
            events,
            property_map,
        }
    }

    /// All subscriptions of a principal.
    pub async fn get_subscriptions_for_user(
        &self,
        principal_uri: &str,
    ) -> Result<Vec<Subscription>> {
        self.store.find_by_principal(principal_uri).await
    }

    /// Creates a subscription from a property map. The source property
    /// is required.
    pub async fn create_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: &PropertySet,
    ) -> Result<Uuid> {
        let source = self
            .property_map
            .source_of(properties)?
            .ok_or_else(|| StoreError::InvalidArgument("subscription requires a source".into()))?;

        let mut subscription = Subscription::new(principal_uri, uri, source);
        self.property_map.apply(&mut subscription, properties)?;

        let id = self.store.create(&subscription).await?;
        tracing::debug!(principal = %principal_uri, uri = %uri, "Subscription created");
        self.events.publish(DomainEvent::SubscriptionCreated {
            principal_uri: principal_uri.to_string(),
            uri: uri.to_string(),
        });
        Ok(id)
    }

    /// Applies a property map to an existing subscription.
    pub async fn update_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: &PropertySet,
    ) -> Result<()> {
        let mut subscription = self
            .store
            .get(principal_uri, uri)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity_type: "Subscription",
                id: format!("{principal_uri}:{uri}"),
            })?;
        self.property_map.apply(&mut subscription, properties)?;

        self.store.update(&subscription).await?;
        tracing::debug!(principal = %principal_uri, uri = %uri, "Subscription updated");
        self.events.publish(DomainEvent::SubscriptionUpdated {
            principal_uri: principal_uri.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    /// Deletes one subscription.
    pub async fn delete_subscription(&self, principal_uri: &str, uri: &str) -> Result<()> {
        self.store.delete(principal_uri, uri).await?;
        tracing::debug!(principal = %principal_uri, uri = %uri, "Subscription deleted");
        self.events.publish(DomainEvent::SubscriptionDeleted {
            principal_uri: principal_uri.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    /// All subscriptions mirroring the given calendar path, used by the
    /// sharing cascade and the real-time fan-out.
    pub async fn get_subscribers(&self, source: &str) -> Result<Vec<Subscription>> {
        self.store.find_by_source(source).await
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::storage::InMemoryStore;

    fn service(store: &Arc<InMemoryStore>) -> SubscriptionService {
        SubscriptionService::new(store.clone(), EventBus::new(16))
    }

    fn props(entries: &[(&str, Value)]) -> PropertySet {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_translates_properties() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);

        let properties = props(&[
            ("{DAV:}displayname", json!("Team events")),
            ("{http://apple.com/ns/ical/}refreshrate", json!("PT1H")),
            ("{http://apple.com/ns/ical/}calendar-color", json!("#10B981")),
            ("{http://apple.com/ns/ical/}calendar-order", json!(3)),
            (
                "{http://calendarserver.org/ns/}subscribed-strip-alarms",
                json!(true),
            ),
            (
                "{http://calendarserver.org/ns/}source",
                json!({"href": "calendars/bob/events"}),
            ),
        ]);

        service
            .create_subscription("principals/users/alice", "team", &properties)
            .await
            .unwrap();

        let subscription = store
            .get("principals/users/alice", "team")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subscription.display_name.as_deref(), Some("Team events"));
        assert_eq!(subscription.refresh_rate.as_deref(), Some("PT1H"));
        assert_eq!(subscription.color.as_deref(), Some("#10B981"));
        assert_eq!(subscription.order, Some(3));
        assert!(subscription.strip_alarms);
        assert!(!subscription.strip_todos);
        assert_eq!(subscription.source, "calendars/bob/events");
    }

    #[tokio::test]
    async fn test_create_without_source_is_invalid() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);

        let result = service
            .create_subscription(
                "principals/users/alice",
                "team",
                &props(&[("{DAV:}displayname", json!("No source"))]),
            )
            .await;

        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_update_applies_partial_properties() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);

        service
            .create_subscription(
                "principals/users/alice",
                "team",
                &props(&[
                    ("{DAV:}displayname", json!("Team")),
                    ("{http://calendarserver.org/ns/}source", json!("calendars/bob/events")),
                ]),
            )
            .await
            .unwrap();

        service
            .update_subscription(
                "principals/users/alice",
                "team",
                &props(&[("{DAV:}displayname", json!("Renamed"))]),
            )
            .await
            .unwrap();

        let subscription = store
            .get("principals/users/alice", "team")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subscription.display_name.as_deref(), Some("Renamed"));
        // Untouched fields survive.
        assert_eq!(subscription.source, "calendars/bob/events");
    }

    #[tokio::test]
    async fn test_update_missing_subscription_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);

        let result = service
            .update_subscription("principals/users/alice", "missing", &PropertySet::new())
            .await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_wrong_property_type_is_invalid() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);

        let result = service
            .create_subscription(
                "principals/users/alice",
                "team",
                &props(&[
                    ("{http://calendarserver.org/ns/}source", json!("calendars/bob/events")),
                    (
                        "{http://calendarserver.org/ns/}subscribed-strip-todos",
                        json!("yes"),
                    ),
                ]),
            )
            .await;

        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_get_subscribers_by_source() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(&store);
        let source = props(&[(
            "{http://calendarserver.org/ns/}source",
            json!("calendars/bob/events"),
        )]);

        service
            .create_subscription("principals/users/alice", "a", &source)
            .await
            .unwrap();
        service
            .create_subscription("principals/users/carol", "b", &source)
            .await
            .unwrap();

        let subscribers = service.get_subscribers("calendars/bob/events").await.unwrap();
        assert_eq!(subscribers.len(), 2);
    }
}
