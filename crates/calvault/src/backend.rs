//! The backend facade consumed by the protocol engine.
//!
//! [`CalendarBackend`] is the composition root: it wires the stores into
//! the services, provides the subscriber-cleanup port over the
//! subscription service, wraps the external principal directory in a
//! read-through cache, and implements the contract traits from
//! [`calvault_core::contract`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use calvault_core::contract::{
    PrincipalDirectory, PropertySet, SchedulingSupport, SharingSupport, SubscriberCleanup,
    SubscriptionSupport, SyncSupport,
};
use calvault_core::entity::{
    Calendar, CalendarInstance, CalendarObject, CalendarPath, ChangeSet, InviteStatus,
    ObjectMetadata, PublicRight, SchedulingObject, Sharee, ShareeSet, Subscription,
};
use calvault_core::store::{
    CalendarInstanceStore, CalendarObjectStore, CalendarStore, ChangeLogStore, ObjectFilter,
    Result, SchedulingObjectStore, StoreError, SubscriptionStore,
};

use crate::config::Config;
use crate::events::{DomainEvent, EventBus};
use crate::principal::CachedPrincipalDirectory;
use crate::service::{
    CalendarObjectService, CalendarPatch, CalendarProperties, CalendarService, ChangeTracker,
    SchedulingService, SharingService, SubscriptionService, SyncService,
};

/// Cascades subscription removal through the subscription service, so
/// neither the calendar nor the sharing service depends on it directly.
struct SubscriptionCleanup {
    subscriptions: Arc<SubscriptionService>,
}

#[async_trait]
impl SubscriberCleanup for SubscriptionCleanup {
    async fn delete_subscribers(&self, source: &str) -> Result<u64> {
        let subscribers = self.subscriptions.get_subscribers(source).await?;
        let removed = subscribers.len() as u64;
        for subscription in subscribers {
            self.subscriptions
                .delete_subscription(&subscription.principal_uri, &subscription.uri)
                .await?;
        }
        Ok(removed)
    }
}

/// The calendar backend facade.
pub struct CalendarBackend {
    calendars: CalendarService,
    objects: CalendarObjectService,
    sync: SyncService,
    sharing: SharingService,
    scheduling: Arc<SchedulingService>,
    subscriptions: Arc<SubscriptionService>,
    events: EventBus,
    reaper_interval: Duration,
}

impl CalendarBackend {
    /// Wires a backend over one store implementation and the external
    /// principal directory.
    pub fn new<S>(store: Arc<S>, directory: Arc<dyn PrincipalDirectory>, config: &Config) -> Self
    where
        S: CalendarStore
            + CalendarInstanceStore
            + CalendarObjectStore
            + ChangeLogStore
            + SchedulingObjectStore
            + SubscriptionStore
            + 'static,
    {
        let events = EventBus::new(config.event_buffer_size);
        let principals: Arc<dyn PrincipalDirectory> = Arc::new(CachedPrincipalDirectory::new(
            directory,
            config.principal_cache_entries,
        ));

        let subscriptions = Arc::new(SubscriptionService::new(store.clone(), events.clone()));
        let cleanup: Arc<dyn SubscriberCleanup> = Arc::new(SubscriptionCleanup {
            subscriptions: subscriptions.clone(),
        });

        let calendars = CalendarService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            principals.clone(),
            cleanup.clone(),
            events.clone(),
        );
        let objects = CalendarObjectService::new(
            store.clone(),
            ChangeTracker::new(store.clone()),
            events.clone(),
        );
        let sync = SyncService::new(store.clone(), store.clone(), store.clone());
        let sharing = SharingService::new(store.clone(), principals, cleanup, events.clone());
        let scheduling = Arc::new(SchedulingService::new(
            store,
            events.clone(),
            config.scheduling_retention(),
        ));

        Self {
            calendars,
            objects,
            sync,
            sharing,
            scheduling,
            subscriptions,
            events,
            reaper_interval: config.reaper_interval(),
        }
    }

    /// Subscribes to the outbound domain-event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Starts the scheduling retention reaper; `None` when retention is
    /// disabled.
    pub fn start_scheduling_reaper(&self) -> Option<JoinHandle<()>> {
        self.scheduling.spawn_reaper(self.reaper_interval)
    }

    fn parse_path(calendar_path: &str) -> Result<CalendarPath> {
        calendar_path
            .parse::<CalendarPath>()
            .map_err(StoreError::from)
    }

    // ------------------------------------------------------------------
    // Calendar CRUD
    // ------------------------------------------------------------------

    /// All calendars visible to a principal, provisioning the default
    /// calendar on first access.
    pub async fn get_calendars_for_user(
        &self,
        principal_uri: &str,
    ) -> Result<Vec<(CalendarInstance, Calendar)>> {
        self.calendars.get_calendars_for_user(principal_uri).await
    }

    /// Creates a calendar; returns the composite path addressing it.
    pub async fn create_calendar(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: CalendarProperties,
    ) -> Result<CalendarPath> {
        self.calendars
            .create_calendar(principal_uri, uri, properties)
            .await
    }

    /// Applies a property patch to the calendar behind a path.
    pub async fn update_calendar(&self, calendar_path: &str, patch: CalendarPatch) -> Result<()> {
        let path = Self::parse_path(calendar_path)?;
        self.calendars.update_calendar(path.calendar_id, patch).await
    }

    /// The calendar bound to `(principal_uri, uri)`, if any.
    pub async fn get_calendar_by_uri(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<(CalendarInstance, Calendar)>> {
        self.calendars.get_calendar_by_uri(principal_uri, uri).await
    }

    /// Deletes the calendar behind a path. On the owner binding this
    /// cascades objects, change history, shares and mirroring
    /// subscriptions; on a received share it only drops the caller's
    /// binding.
    pub async fn delete_calendar(&self, calendar_path: &str) -> Result<()> {
        let path = Self::parse_path(calendar_path)?;
        self.calendars
            .delete_calendar(path.calendar_id, path.instance_id)
            .await
    }

    /// Publish/unpublish is handled by the sharing workflow; the base
    /// backend has no publish status.
    pub async fn set_publish_status(&self, _calendar_path: &str, _published: bool) -> Result<()> {
        Err(StoreError::Unsupported("publish status"))
    }

    // ------------------------------------------------------------------
    // Calendar object CRUD
    // ------------------------------------------------------------------

    /// Fetches one object by uri.
    pub async fn get_calendar_object(
        &self,
        calendar_path: &str,
        uri: &str,
    ) -> Result<Option<CalendarObject>> {
        let path = Self::parse_path(calendar_path)?;
        self.objects.get_calendar_object(path.calendar_id, uri).await
    }

    /// Fetches a batch of objects by uri.
    pub async fn get_multiple_calendar_objects(
        &self,
        calendar_path: &str,
        uris: &[String],
    ) -> Result<Vec<CalendarObject>> {
        let path = Self::parse_path(calendar_path)?;
        self.objects
            .get_multiple_calendar_objects(path.calendar_id, uris)
            .await
    }

    /// All object uris of a calendar.
    pub async fn get_all_uris(&self, calendar_path: &str) -> Result<Vec<String>> {
        let path = Self::parse_path(calendar_path)?;
        self.objects.get_all_uris(path.calendar_id).await
    }

    /// Runs a calendar query, returning matching uris.
    pub async fn calendar_query(
        &self,
        calendar_path: &str,
        filter: &ObjectFilter,
    ) -> Result<Vec<String>> {
        let path = Self::parse_path(calendar_path)?;
        self.objects.calendar_query(path.calendar_id, filter).await
    }

    /// Runs a calendar query, returning full records.
    pub async fn calendar_query_with_all_data(
        &self,
        calendar_path: &str,
        filter: &ObjectFilter,
    ) -> Result<Vec<CalendarObject>> {
        let path = Self::parse_path(calendar_path)?;
        self.objects
            .calendar_query_with_all_data(path.calendar_id, filter)
            .await
    }

    /// Stores a new object; returns its etag.
    pub async fn create_calendar_object(
        &self,
        calendar_path: &str,
        uri: &str,
        raw_data: &str,
        metadata: ObjectMetadata,
    ) -> Result<String> {
        let path = Self::parse_path(calendar_path)?;
        self.objects
            .create_calendar_object(path.calendar_id, uri, raw_data, metadata)
            .await
    }

    /// Replaces an existing object; returns the new etag.
    pub async fn update_calendar_object(
        &self,
        calendar_path: &str,
        uri: &str,
        raw_data: &str,
        metadata: ObjectMetadata,
    ) -> Result<String> {
        let path = Self::parse_path(calendar_path)?;
        self.objects
            .update_calendar_object(path.calendar_id, uri, raw_data, metadata)
            .await
    }

    /// Deletes one object.
    pub async fn delete_calendar_object(&self, calendar_path: &str, uri: &str) -> Result<()> {
        let path = Self::parse_path(calendar_path)?;
        self.objects
            .delete_calendar_object(path.calendar_id, uri)
            .await
    }

    /// Finds one object by iCalendar UID across the principal's own
    /// calendars.
    pub async fn get_calendar_object_by_uid(
        &self,
        principal_uri: &str,
        uid: &str,
    ) -> Result<Option<CalendarObject>> {
        self.calendars
            .get_calendar_object_by_uid(principal_uri, uid)
            .await
    }

    /// Finds every object stored under a uri across the principal's own
    /// calendars.
    pub async fn get_duplicate_calendar_objects_by_uri(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Vec<CalendarObject>> {
        self.calendars
            .get_duplicate_calendar_objects_by_uri(principal_uri, uri)
            .await
    }
}

#[async_trait]
impl SyncSupport for CalendarBackend {
    async fn get_changes_for_calendar(
        &self,
        calendar_path: &str,
        sync_token: Option<&str>,
        _sync_level: u32,
        limit: Option<u64>,
    ) -> Result<Option<ChangeSet>> {
        let path = Self::parse_path(calendar_path)?;
        self.sync
            .changes_for_calendar(path.calendar_id, sync_token, limit)
            .await
    }
}

#[async_trait]
impl SharingSupport for CalendarBackend {
    async fn update_invites(&self, calendar_path: &str, sharees: &[ShareeSet]) -> Result<()> {
        let path = Self::parse_path(calendar_path)?;
        self.sharing.update_invites(path.calendar_id, sharees).await
    }

    async fn get_invites(&self, calendar_path: &str) -> Result<Vec<Sharee>> {
        let path = Self::parse_path(calendar_path)?;
        self.sharing.get_invites(path.calendar_id).await
    }

    async fn get_public_right(&self, calendar_path: &str) -> Result<Option<PublicRight>> {
        let path = Self::parse_path(calendar_path)?;
        self.sharing.get_public_right(path.calendar_id).await
    }

    async fn save_public_right(&self, calendar_path: &str, privilege: Option<&str>) -> Result<()> {
        let path = Self::parse_path(calendar_path)?;
        self.sharing
            .save_public_right(path.calendar_id, privilege)
            .await
    }

    async fn save_invite_status(&self, calendar_path: &str, status: InviteStatus) -> Result<()> {
        let path = Self::parse_path(calendar_path)?;
        self.sharing
            .save_invite_status(path.calendar_id, status)
            .await
    }
}

#[async_trait]
impl SchedulingSupport for CalendarBackend {
    async fn get_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<SchedulingObject>> {
        self.scheduling.get_scheduling_object(principal_uri, uri).await
    }

    async fn get_scheduling_objects(&self, principal_uri: &str) -> Result<Vec<SchedulingObject>> {
        self.scheduling.get_scheduling_objects(principal_uri).await
    }

    async fn create_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
        raw_data: &str,
    ) -> Result<()> {
        self.scheduling
            .create_scheduling_object(principal_uri, uri, raw_data)
            .await
    }

    async fn delete_scheduling_object(&self, principal_uri: &str, uri: &str) -> Result<()> {
        self.scheduling
            .delete_scheduling_object(principal_uri, uri)
            .await
    }
}

#[async_trait]
impl SubscriptionSupport for CalendarBackend {
    async fn get_subscriptions_for_user(&self, principal_uri: &str) -> Result<Vec<Subscription>> {
        self.subscriptions
            .get_subscriptions_for_user(principal_uri)
            .await
    }

    async fn create_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: &PropertySet,
    ) -> Result<Uuid> {
        self.subscriptions
            .create_subscription(principal_uri, uri, properties)
            .await
    }

    async fn update_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: &PropertySet,
    ) -> Result<()> {
        self.subscriptions
            .update_subscription(principal_uri, uri, properties)
            .await
    }

    async fn delete_subscription(&self, principal_uri: &str, uri: &str) -> Result<()> {
        self.subscriptions
            .delete_subscription(principal_uri, uri)
            .await
    }

    async fn get_subscribers(&self, source: &str) -> Result<Vec<Subscription>> {
        self.subscriptions.get_subscribers(source).await
    }
}
