//! Contracts between this backend and its external collaborators.
//!
//! The four `*Support` traits are what the protocol engine consumes; the
//! facade crate implements them. The remaining traits are ports the
//! backend itself consumes and the embedding application provides.

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::{
    ChangeSet, InviteStatus, Principal, PublicRight, SchedulingObject, Sharee, ShareeSet,
    Subscription,
};
use crate::store::Result;

/// A generic property map as shipped by the protocol engine
/// (DAV property name to JSON value).
pub type PropertySet = serde_json::Map<String, serde_json::Value>;

/// Change-tracking queries for the sync REPORT.
#[async_trait]
pub trait SyncSupport: Send + Sync {
    /// Computes the delta for a calendar since `sync_token`.
    ///
    /// `calendar_path` is the composite `<calendarId>/<instanceId>`
    /// identifier. An empty/absent token requests an initial sync.
    /// Returns `None` when the calendar does not support sync (unknown
    /// calendar). `sync_level` deeper than the flat object listing is not
    /// distinguished at this layer.
    async fn get_changes_for_calendar(
        &self,
        calendar_path: &str,
        sync_token: Option<&str>,
        sync_level: u32,
        limit: Option<u64>,
    ) -> Result<Option<ChangeSet>>;
}

/// Sharing lifecycle operations.
#[async_trait]
pub trait SharingSupport: Send + Sync {
    /// Applies a batch of sharee grants/revocations to a calendar.
    async fn update_invites(&self, calendar_path: &str, sharees: &[ShareeSet]) -> Result<()>;

    /// All sharee descriptors of a calendar (the owner binding excluded).
    async fn get_invites(&self, calendar_path: &str) -> Result<Vec<Sharee>>;

    /// Reads the public right of a calendar.
    async fn get_public_right(&self, calendar_path: &str) -> Result<Option<PublicRight>>;

    /// Saves the public right of a calendar from a DAV privilege string;
    /// `None` (or empty) revokes it and cascades subscriber cleanup.
    async fn save_public_right(&self, calendar_path: &str, privilege: Option<&str>) -> Result<()>;

    /// Updates the invite status on the calendar's owner-bound instance.
    async fn save_invite_status(&self, calendar_path: &str, status: InviteStatus) -> Result<()>;
}

/// Scheduling inbox operations.
#[async_trait]
pub trait SchedulingSupport: Send + Sync {
    /// Fetches one inbox message.
    async fn get_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
    ) -> Result<Option<SchedulingObject>>;

    /// All inbox messages of a principal.
    async fn get_scheduling_objects(&self, principal_uri: &str) -> Result<Vec<SchedulingObject>>;

    /// Delivers an iTip message into the principal's inbox.
    async fn create_scheduling_object(
        &self,
        principal_uri: &str,
        uri: &str,
        raw_data: &str,
    ) -> Result<()>;

    /// Removes one inbox message.
    async fn delete_scheduling_object(&self, principal_uri: &str, uri: &str) -> Result<()>;
}

/// External-subscription operations.
#[async_trait]
pub trait SubscriptionSupport: Send + Sync {
    /// All subscriptions of a principal.
    async fn get_subscriptions_for_user(&self, principal_uri: &str) -> Result<Vec<Subscription>>;

    /// Creates a subscription from a property map; `source` is required.
    async fn create_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: &PropertySet,
    ) -> Result<Uuid>;

    /// Applies a property map to an existing subscription.
    async fn update_subscription(
        &self,
        principal_uri: &str,
        uri: &str,
        properties: &PropertySet,
    ) -> Result<()>;

    /// Deletes one subscription.
    async fn delete_subscription(&self, principal_uri: &str, uri: &str) -> Result<()>;

    /// All subscriptions mirroring the given calendar path.
    async fn get_subscribers(&self, source: &str) -> Result<Vec<Subscription>>;
}

/// Port to the external principal directory service.
///
/// Lookups may be served from a best-effort cache; callers must tolerate
/// staleness.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Resolves a principal URI to its directory entry.
    async fn get_principal(&self, principal_uri: &str) -> Result<Option<Principal>>;
}

/// Port for cascading removal of subscriptions that mirror a calendar.
#[async_trait]
pub trait SubscriberCleanup: Send + Sync {
    /// Deletes every subscription whose source equals the given path;
    /// returns how many were removed.
    async fn delete_subscribers(&self, source: &str) -> Result<u64>;
}
