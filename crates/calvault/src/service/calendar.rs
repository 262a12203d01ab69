use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use calvault_core::contract::{PrincipalDirectory, SubscriberCleanup};
use calvault_core::entity::{
    calendar_source_path, principal_local_name, Calendar, CalendarInstance, CalendarObject,
    CalendarPath, PrincipalKind,
};
use calvault_core::store::{
    CalendarInstanceStore, CalendarObjectStore, CalendarStore, ChangeLogStore, Result, StoreError,
};

use crate::events::{DomainEvent, EventBus};

/// Properties supplied when creating a calendar.
#[derive(Debug, Clone, Default)]
pub struct CalendarProperties {
    pub display_name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub order: Option<i64>,
    pub timezone: Option<String>,
}

/// A partial property update for an existing calendar.
#[derive(Debug, Clone, Default)]
pub struct CalendarPatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub order: Option<i64>,
    pub timezone: Option<String>,
}

impl CalendarPatch {
    /// Applies the update to an existing calendar.
    pub fn apply_to(self, calendar: &mut Calendar) {
        if let Some(display_name) = self.display_name {
            calendar.display_name = display_name;
        }
        if let Some(description) = self.description {
            calendar.description = Some(description);
        }
        if let Some(color) = self.color {
            calendar.color = Some(color);
        }
        if let Some(order) = self.order {
            calendar.order = Some(order);
        }
        if let Some(timezone) = self.timezone {
            calendar.timezone = Some(timezone);
        }
    }
}

/// Service coordinating calendar documents, their instances and the
/// cascades a calendar deletion triggers.
pub struct CalendarService {
    calendars: Arc<dyn CalendarStore>,
    instances: Arc<dyn CalendarInstanceStore>,
    objects: Arc<dyn CalendarObjectStore>,
    changes: Arc<dyn ChangeLogStore>,
    principals: Arc<dyn PrincipalDirectory>,
    subscribers: Arc<dyn SubscriberCleanup>,
    events: EventBus,
}

impl CalendarService {
    /// Creates the service over its stores and collaborator ports.
    pub fn new(
        calendars: Arc<dyn CalendarStore>,
        instances: Arc<dyn CalendarInstanceStore>,
        objects: Arc<dyn CalendarObjectStore>,
        changes: Arc<dyn ChangeLogStore>,
        principals: Arc<dyn PrincipalDirectory>,
        subscribers: Arc<dyn SubscriberCleanup>,
        events: EventBus,
    ) -> Self {
        Self {
            calendars,
            instances,
            objects,
            changes,
            principals,
            subscribers,
            events,
        }
    }

    /// All calendars visible to a principal, as (instance, calendar)
    /// pairs.
    ///
    /// A principal with no calendars gets a default one provisioned on
    /// first access, named after the resource's display name when the
    /// principal is a bookable resource, otherwise after the principal's
    /// local identifier.
    pub async fn get_calendars_for_user(
        &self,
        principal_uri: &str,
    ) -> Result<Vec<(CalendarInstance, Calendar)>> {
        let mut instances = self.instances.find_by_principal(principal_uri).await?;
        if instances.is_empty() {
            self.provision_default_calendar(principal_uri).await?;
            instances = self.instances.find_by_principal(principal_uri).await?;
        }

        let ids: Vec<Uuid> = instances.iter().map(|i| i.calendar_id).collect();
        let calendars: HashMap<Uuid, Calendar> = self
            .calendars
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(instances
            .into_iter()
            .filter_map(|instance| {
                calendars
                    .get(&instance.calendar_id)
                    .cloned()
                    .map(|calendar| (instance, calendar))
            })
            .collect())
    }

    async fn provision_default_calendar(&self, principal_uri: &str) -> Result<CalendarPath> {
        let local_name = principal_local_name(principal_uri).to_string();
        let principal = self.principals.get_principal(principal_uri).await?;
        let display_name = match &principal {
            Some(p) if p.kind == PrincipalKind::Resource => {
                p.display_name.clone().unwrap_or_else(|| local_name.clone())
            }
            _ => local_name.clone(),
        };

        tracing::debug!(principal = %principal_uri, name = %display_name, "Provisioning default calendar");
        self.create_calendar(
            principal_uri,
            &local_name,
            CalendarProperties {
                display_name,
                ..CalendarProperties::default()
            },
        )
        .await
    }

    /// Creates a calendar and its owner instance; returns the composite
    /// path addressing the new calendar.
    pub async fn create_calendar(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: CalendarProperties,
    ) -> Result<CalendarPath> {
        let mut calendar = Calendar::new(principal_uri, properties.display_name);
        calendar.description = properties.description;
        calendar.color = properties.color;
        calendar.order = properties.order;
        calendar.timezone = properties.timezone;

        let calendar_id = self.calendars.create(&calendar).await?;
        let instance = CalendarInstance::owner(calendar_id, principal_uri, uri);
        let instance_id = match self.instances.create(&instance).await {
            Ok(id) => id,
            Err(err) => {
                // Leave no orphan document behind on a (principal, uri)
                // conflict.
                let _ = self.calendars.delete(calendar_id).await;
                return Err(err);
            }
        };

        tracing::debug!(
            calendar_id = %calendar_id,
            principal = %principal_uri,
            uri = %uri,
            "Calendar created"
        );
        self.events.publish(DomainEvent::CalendarCreated {
            calendar_id,
            principal_uri: principal_uri.to_string(),
        });
        Ok(CalendarPath::new(calendar_id, instance_id))
    }

    /// Applies a property patch to a calendar document.
    pub async fn update_calendar(&self, calendar_id: Uuid, patch: CalendarPatch) -> Result<()> {
        let mut calendar = self
            .calendars
            .find_by_ids(&[calendar_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound {
                entity_type: "Calendar",
                id: calendar_id.to_string(),
            })?;

        patch.apply_to(&mut calendar);
        self.calendars.update(&calendar).await?;

        tracing::debug!(calendar_id = %calendar_id, "Calendar updated");
        self.events
            .publish(DomainEvent::CalendarUpdated { calendar_id });
        Ok(())
    }

    /// The calendar bound to `(principal_uri, uri)`, if any.
    pub async fn get_calendar_by_uri(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<(CalendarInstance, Calendar)>> {
        let Some(instance) = self.instances.find_one(principal_uri, uri, None).await? else {
            return Ok(None);
        };
        let calendar = self
            .calendars
            .find_by_ids(&[instance.calendar_id])
            .await?
            .into_iter()
            .next();
        Ok(calendar.map(|c| (instance, c)))
    }

    /// Deletes the calendar addressed by a path.
    ///
    /// Called on a received share (the path's instance is not the owner
    /// binding), only that instance disappears and the calendar survives.
    /// Called on the owner binding, the whole calendar goes, cascading:
    /// objects, change history, every instance (shares included) and,
    /// through the injected port, the subscriptions mirroring it.
    pub async fn delete_calendar(&self, calendar_id: Uuid, instance_id: Uuid) -> Result<()> {
        let owner = self.instances.find_owner_instance(calendar_id).await?;
        let Some(owner) = owner else {
            return Err(StoreError::NotFound {
                entity_type: "Calendar",
                id: calendar_id.to_string(),
            });
        };

        if owner.id != instance_id {
            self.instances.delete(instance_id).await?;
            tracing::debug!(
                calendar_id = %calendar_id,
                instance_id = %instance_id,
                "Received share removed"
            );
            self.events
                .publish(DomainEvent::InvitesUpdated { calendar_id });
            return Ok(());
        }

        let source = calendar_source_path(&owner.principal_uri, &owner.uri);
        let removed = self.subscribers.delete_subscribers(&source).await?;

        self.objects.delete_by_calendar(calendar_id).await?;
        self.changes.delete_by_calendar(calendar_id).await?;
        self.instances.delete_by_calendar(calendar_id).await?;
        self.calendars.delete(calendar_id).await?;

        tracing::debug!(
            calendar_id = %calendar_id,
            subscribers_removed = removed,
            "Calendar deleted"
        );
        self.events.publish(DomainEvent::CalendarDeleted {
            calendar_id,
            principal_uri: owner.principal_uri,
        });
        Ok(())
    }

    /// Finds one object by iCalendar UID across all calendars the
    /// principal owns, for scheduling de-duplication.
    pub async fn get_calendar_object_by_uid(
        &self,
        principal_uri: &str,
        uid: &str,
    ) -> Result<Option<CalendarObject>> {
        let calendar_ids = self.owned_calendar_ids(principal_uri).await?;
        let mut matches = self.objects.find_by_uid(&calendar_ids, uid).await?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }

    /// Finds every object stored under the same uri across the
    /// principal's own calendars.
    pub async fn get_duplicate_calendar_objects_by_uri(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Vec<CalendarObject>> {
        let calendar_ids = self.owned_calendar_ids(principal_uri).await?;
        let mut duplicates = Vec::new();
        for calendar_id in calendar_ids {
            if let Some(object) = self.objects.get(calendar_id, uri).await? {
                duplicates.push(object);
            }
        }
        Ok(duplicates)
    }

    async fn owned_calendar_ids(&self, principal_uri: &str) -> Result<Vec<Uuid>> {
        let instances = self.instances.find_by_principal(principal_uri).await?;
        Ok(instances
            .into_iter()
            .filter(|i| i.access.is_shared_owner())
            .map(|i| i.calendar_id)
            .collect())
    }
}
