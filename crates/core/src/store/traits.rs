use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entity::{
    AccessLevel, Calendar, CalendarInstance, CalendarObject, ChangeOperation, ChangeRecord,
    InviteStatus, PublicRight, SchedulingObject, Subscription,
};

use super::{ObjectFilter, Result};

/// Store for calendar documents and their synchronization counters.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Fetches the calendars with the given ids; missing ids are silently
    /// absent from the result.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Calendar>>;

    /// Creates a new calendar, returning its id.
    async fn create(&self, calendar: &Calendar) -> Result<Uuid>;

    /// Updates the calendar's properties. The sync token is not touched.
    async fn update(&self, calendar: &Calendar) -> Result<()>;

    /// Deletes a calendar document.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Returns the calendar's current sync token, or `None` when the
    /// calendar does not exist.
    async fn get_sync_token(&self, id: Uuid) -> Result<Option<i64>>;

    /// Atomically increments the sync token by 1 and returns the new
    /// value. Concurrent callers must never lose an update.
    async fn increment_sync_token(&self, id: Uuid) -> Result<i64>;
}

/// Store for per-principal calendar bindings.
#[async_trait]
pub trait CalendarInstanceStore: Send + Sync {
    /// All instances bound to a principal, sorted by uri.
    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<CalendarInstance>>;

    /// The unique instance for `(principal_uri, uri)`, optionally
    /// restricted to an access level.
    async fn find_one(
        &self,
        principal_uri: &str,
        uri: &str,
        access: Option<AccessLevel>,
    ) -> Result<Option<CalendarInstance>>;

    /// All instances of one calendar.
    async fn find_by_calendar(&self, calendar_id: Uuid) -> Result<Vec<CalendarInstance>>;

    /// The instance carrying [`AccessLevel::SharedOwner`] for a calendar.
    async fn find_owner_instance(&self, calendar_id: Uuid) -> Result<Option<CalendarInstance>>;

    /// The sharee instance identified by its share href.
    async fn find_by_share_href(
        &self,
        calendar_id: Uuid,
        share_href: &str,
    ) -> Result<Option<CalendarInstance>>;

    /// Creates an instance, returning its id. Violating the unique
    /// `(principal_uri, uri)` index is a [`StoreError::Conflict`].
    ///
    /// [`StoreError::Conflict`]: super::StoreError::Conflict
    async fn create(&self, instance: &CalendarInstance) -> Result<Uuid>;

    /// Updates an existing instance by id.
    async fn update(&self, instance: &CalendarInstance) -> Result<()>;

    /// Updates the invite status of one instance.
    async fn set_invite_status(&self, instance_id: Uuid, status: InviteStatus) -> Result<()>;

    /// Updates the public right across all instances of a calendar.
    async fn set_public_right(&self, calendar_id: Uuid, right: Option<PublicRight>) -> Result<()>;

    /// Deletes one instance by id.
    async fn delete(&self, instance_id: Uuid) -> Result<()>;

    /// Deletes the sharee instance identified by its share href.
    async fn delete_by_share_href(&self, calendar_id: Uuid, share_href: &str) -> Result<()>;

    /// Deletes every instance of a calendar (cascade helper).
    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()>;
}

/// Store for calendar object (event resource) documents.
#[async_trait]
pub trait CalendarObjectStore: Send + Sync {
    /// Fetches one object by uri.
    async fn get(&self, calendar_id: Uuid, uri: &str) -> Result<Option<CalendarObject>>;

    /// All objects of a calendar.
    async fn find_by_calendar(&self, calendar_id: Uuid) -> Result<Vec<CalendarObject>>;

    /// Objects matching any of the given uris.
    async fn find_by_uris(&self, calendar_id: Uuid, uris: &[String]) -> Result<Vec<CalendarObject>>;

    /// Objects with the given iCalendar UID across a set of calendars,
    /// used for duplicate detection.
    async fn find_by_uid(&self, calendar_ids: &[Uuid], uid: &str) -> Result<Vec<CalendarObject>>;

    /// Objects satisfying the filter.
    async fn query(&self, calendar_id: Uuid, filter: &ObjectFilter) -> Result<Vec<CalendarObject>>;

    /// Creates an object. A duplicate `(calendar_id, uri)` is a conflict.
    async fn create(&self, object: &CalendarObject) -> Result<()>;

    /// Replaces an existing object.
    async fn update(&self, object: &CalendarObject) -> Result<()>;

    /// Deletes one object by uri.
    async fn delete(&self, calendar_id: Uuid, uri: &str) -> Result<()>;

    /// Deletes every object of a calendar (cascade helper).
    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()>;
}

/// Append-only per-calendar change history.
#[async_trait]
pub trait ChangeLogStore: Send + Sync {
    /// Records a change at the calendar's current token and advances the
    /// token, as one atomic unit; returns the new token value.
    ///
    /// A sync reader must never observe the advanced token without the
    /// corresponding record being visible.
    async fn append(&self, calendar_id: Uuid, uri: &str, operation: ChangeOperation)
        -> Result<i64>;

    /// Records with `sync_token` in `[from_token, to_token)`, ascending,
    /// optionally capped at `limit`.
    async fn changes_in_window(
        &self,
        calendar_id: Uuid,
        from_token: i64,
        to_token: i64,
        limit: Option<u64>,
    ) -> Result<Vec<ChangeRecord>>;

    /// Deletes the whole history of a calendar (cascade helper).
    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()>;
}

/// Store for the per-principal scheduling inbox.
#[async_trait]
pub trait SchedulingObjectStore: Send + Sync {
    /// Fetches one inbox message.
    async fn get(&self, principal_uri: &str, uri: &str) -> Result<Option<SchedulingObject>>;

    /// All inbox messages of a principal.
    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<SchedulingObject>>;

    /// Stores an inbox message.
    async fn create(&self, object: &SchedulingObject) -> Result<()>;

    /// Deletes one inbox message.
    async fn delete(&self, principal_uri: &str, uri: &str) -> Result<()>;

    /// Removes every message created before the cutoff; returns how many
    /// were removed. This is the retention reaper's hook.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Store for external-subscription mirror records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions of a principal, sorted by uri.
    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<Subscription>>;

    /// Fetches one subscription by `(principal_uri, uri)`.
    async fn get(&self, principal_uri: &str, uri: &str) -> Result<Option<Subscription>>;

    /// All subscriptions mirroring the given source path.
    async fn find_by_source(&self, source: &str) -> Result<Vec<Subscription>>;

    /// Creates a subscription, returning its id.
    async fn create(&self, subscription: &Subscription) -> Result<Uuid>;

    /// Updates an existing subscription.
    async fn update(&self, subscription: &Subscription) -> Result<()>;

    /// Deletes one subscription.
    async fn delete(&self, principal_uri: &str, uri: &str) -> Result<()>;
}
