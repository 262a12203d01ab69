use std::sync::Arc;

use uuid::Uuid;

use calvault_core::contract::{PrincipalDirectory, SubscriberCleanup};
use calvault_core::entity::{
    calendar_source_path, AccessLevel, CalendarInstance, InviteStatus, PublicRight, Sharee,
    ShareeSet,
};
use calvault_core::store::{CalendarInstanceStore, Result, StoreError};

use crate::events::{DomainEvent, EventBus};

/// Service for the sharing lifecycle: invites, invite status and the
/// calendar-wide public right.
pub struct SharingService {
    instances: Arc<dyn CalendarInstanceStore>,
    principals: Arc<dyn PrincipalDirectory>,
    subscribers: Arc<dyn SubscriberCleanup>,
    events: EventBus,
}

impl SharingService {
    /// Creates the service over its store and collaborator ports.
    pub fn new(
        instances: Arc<dyn CalendarInstanceStore>,
        principals: Arc<dyn PrincipalDirectory>,
        subscribers: Arc<dyn SubscriberCleanup>,
        events: EventBus,
    ) -> Self {
        Self {
            instances,
            principals,
            subscribers,
            events,
        }
    }

    /// Applies a batch of sharee grants/revocations to a calendar.
    ///
    /// A sharee with [`AccessLevel::NoAccess`] is removed; revoking an
    /// absent share is a no-op. A grant for an href that already has an
    /// instance updates it in place; otherwise a new sharee instance is
    /// cloned from the owner binding. An unresolvable sharee principal is
    /// stored with [`InviteStatus::Invalid`].
    pub async fn update_invites(&self, calendar_id: Uuid, sharees: &[ShareeSet]) -> Result<()> {
        let owner = self
            .instances
            .find_owner_instance(calendar_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity_type: "Calendar",
                id: calendar_id.to_string(),
            })?;

        for sharee in sharees {
            if sharee.access == AccessLevel::NoAccess {
                match self
                    .instances
                    .delete_by_share_href(calendar_id, &sharee.href)
                    .await
                {
                    Ok(()) => {
                        tracing::debug!(calendar_id = %calendar_id, href = %sharee.href, "Share removed");
                    }
                    Err(StoreError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
                continue;
            }

            if let Some(mut existing) = self
                .instances
                .find_by_share_href(calendar_id, &sharee.href)
                .await?
            {
                existing.access = sharee.access;
                if sharee.display_name.is_some() {
                    existing.share_display_name = sharee.display_name.clone();
                }
                self.instances.update(&existing).await?;
                continue;
            }

            let principal_uri = sharee
                .principal
                .clone()
                .unwrap_or_else(|| sharee.href.clone());
            let resolved = self.principals.get_principal(&principal_uri).await?;

            let mut instance = CalendarInstance::sharee(
                calendar_id,
                principal_uri,
                owner.uri.clone(),
                sharee.access,
                sharee.href.clone(),
            );
            instance.share_display_name = sharee.display_name.clone();
            instance.public_right = owner.public_right;
            if resolved.is_none() {
                instance.invite_status = InviteStatus::Invalid;
            }
            self.instances.create(&instance).await?;
            tracing::debug!(
                calendar_id = %calendar_id,
                href = %sharee.href,
                access = ?sharee.access,
                "Share created"
            );
        }

        self.events
            .publish(DomainEvent::InvitesUpdated { calendar_id });
        Ok(())
    }

    /// All sharee descriptors of a calendar. The owner binding itself is
    /// not a sharee and is excluded.
    pub async fn get_invites(&self, calendar_id: Uuid) -> Result<Vec<Sharee>> {
        let instances = self.instances.find_by_calendar(calendar_id).await?;
        Ok(instances
            .into_iter()
            .filter(|i| !i.access.is_shared_owner())
            .map(|i| Sharee {
                href: i.share_href.unwrap_or_else(|| i.principal_uri.clone()),
                principal: Some(i.principal_uri),
                access: i.access,
                invite_status: i.invite_status,
                display_name: i.share_display_name,
            })
            .collect())
    }

    /// Translates a DAV privilege string into a public right. `None` and
    /// the empty string mean revocation; anything unknown is an
    /// [`StoreError::InvalidArgument`].
    pub fn parse_privilege(privilege: Option<&str>) -> Result<Option<PublicRight>> {
        match privilege.filter(|p| !p.is_empty()) {
            None => Ok(None),
            Some(p) => PublicRight::from_privilege(p).map(Some).ok_or_else(|| {
                StoreError::InvalidArgument(format!("unknown privilege: {p}"))
            }),
        }
    }

    /// Reads the public right of a calendar.
    pub async fn get_public_right(&self, calendar_id: Uuid) -> Result<Option<PublicRight>> {
        let owner = self.instances.find_owner_instance(calendar_id).await?;
        Ok(owner.and_then(|i| i.public_right))
    }

    /// Saves the public right across all instances of a calendar.
    ///
    /// Revocation cascades through the [`SubscriberCleanup`] port so
    /// subscriptions mirroring a no-longer-public calendar disappear
    /// with the right that allowed them.
    pub async fn save_public_right(
        &self,
        calendar_id: Uuid,
        privilege: Option<&str>,
    ) -> Result<()> {
        let right = Self::parse_privilege(privilege)?;
        self.instances.set_public_right(calendar_id, right).await?;

        if right.is_none() {
            if let Some(owner) = self.instances.find_owner_instance(calendar_id).await? {
                let source = calendar_source_path(&owner.principal_uri, &owner.uri);
                let removed = self.subscribers.delete_subscribers(&source).await?;
                tracing::debug!(
                    calendar_id = %calendar_id,
                    source = %source,
                    removed,
                    "Public right revoked, subscribers removed"
                );
            }
        }

        self.events
            .publish(DomainEvent::PublicRightChanged { calendar_id, right });
        Ok(())
    }

    /// Updates the invite status on the calendar's owner-bound instance,
    /// for accept/decline flows.
    pub async fn save_invite_status(&self, calendar_id: Uuid, status: InviteStatus) -> Result<()> {
        let owner = self
            .instances
            .find_owner_instance(calendar_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity_type: "CalendarInstance",
                id: calendar_id.to_string(),
            })?;
        self.instances.set_invite_status(owner.id, status).await?;
        tracing::debug!(calendar_id = %calendar_id, ?status, "Invite status saved");
        Ok(())
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use calvault_core::entity::{Calendar, Principal, PrincipalKind, Subscription};
    use calvault_core::store::{CalendarStore, SubscriptionStore};

    use crate::storage::InMemoryStore;

    struct OpenDirectory;

    #[async_trait]
    impl PrincipalDirectory for OpenDirectory {
        async fn get_principal(&self, principal_uri: &str) -> Result<Option<Principal>> {
            if principal_uri.contains("ghost") {
                return Ok(None);
            }
            Ok(Some(Principal {
                uri: principal_uri.to_string(),
                display_name: None,
                kind: PrincipalKind::User,
            }))
        }
    }

    struct StoreCleanup {
        store: Arc<InMemoryStore>,
        calls: AtomicU64,
    }

    #[async_trait]
    impl SubscriberCleanup for StoreCleanup {
        async fn delete_subscribers(&self, source: &str) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let subscribers = self.store.find_by_source(source).await?;
            let removed = subscribers.len() as u64;
            for s in subscribers {
                SubscriptionStore::delete(self.store.as_ref(), &s.principal_uri, &s.uri).await?;
            }
            Ok(removed)
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        cleanup: Arc<StoreCleanup>,
        sharing: SharingService,
        calendar_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let cleanup = Arc::new(StoreCleanup {
            store: store.clone(),
            calls: AtomicU64::new(0),
        });
        let sharing = SharingService::new(
            store.clone(),
            Arc::new(OpenDirectory),
            cleanup.clone(),
            EventBus::new(16),
        );

        let calendar = Calendar::new("principals/users/alice", "Work");
        let calendar_id = CalendarStore::create(store.as_ref(), &calendar)
            .await
            .unwrap();
        let owner = CalendarInstance::owner(calendar_id, "principals/users/alice", "events");
        CalendarInstanceStore::create(store.as_ref(), &owner)
            .await
            .unwrap();

        Fixture {
            store,
            cleanup,
            sharing,
            calendar_id,
        }
    }

    #[tokio::test]
    async fn test_single_owner_invariant_across_sharing() {
        let f = fixture().await;

        f.sharing
            .update_invites(
                f.calendar_id,
                &[
                    ShareeSet::grant("principals/users/bob", AccessLevel::Read),
                    ShareeSet::grant("principals/users/carol", AccessLevel::ReadWrite),
                ],
            )
            .await
            .unwrap();

        let instances = f.store.find_by_calendar(f.calendar_id).await.unwrap();
        assert_eq!(instances.len(), 3);
        let owners: Vec<_> = instances
            .iter()
            .filter(|i| i.access.is_shared_owner())
            .collect();
        assert_eq!(owners.len(), 1);
    }

    #[tokio::test]
    async fn test_revoking_a_share_deletes_its_instance() {
        let f = fixture().await;
        f.sharing
            .update_invites(
                f.calendar_id,
                &[ShareeSet::grant("principals/users/bob", AccessLevel::Read)],
            )
            .await
            .unwrap();

        f.sharing
            .update_invites(f.calendar_id, &[ShareeSet::revoke("principals/users/bob")])
            .await
            .unwrap();

        let invites = f.sharing.get_invites(f.calendar_id).await.unwrap();
        assert!(invites.is_empty());

        // Revoking again is a no-op, not an error.
        f.sharing
            .update_invites(f.calendar_id, &[ShareeSet::revoke("principals/users/bob")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_regrant_updates_access_in_place() {
        let f = fixture().await;
        f.sharing
            .update_invites(
                f.calendar_id,
                &[ShareeSet::grant("principals/users/bob", AccessLevel::Read)],
            )
            .await
            .unwrap();
        f.sharing
            .update_invites(
                f.calendar_id,
                &[ShareeSet::grant("principals/users/bob", AccessLevel::ReadWrite)],
            )
            .await
            .unwrap();

        let invites = f.sharing.get_invites(f.calendar_id).await.unwrap();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].access, AccessLevel::ReadWrite);
    }

    #[tokio::test]
    async fn test_unresolvable_sharee_is_marked_invalid() {
        let f = fixture().await;
        f.sharing
            .update_invites(
                f.calendar_id,
                &[ShareeSet::grant("principals/users/ghost", AccessLevel::Read)],
            )
            .await
            .unwrap();

        let invites = f.sharing.get_invites(f.calendar_id).await.unwrap();
        assert_eq!(invites[0].invite_status, InviteStatus::Invalid);
    }

    #[tokio::test]
    async fn test_get_invites_excludes_owner_binding() {
        let f = fixture().await;
        f.sharing
            .update_invites(
                f.calendar_id,
                &[ShareeSet::grant("principals/users/bob", AccessLevel::FreeBusy)
                    .with_display_name("Bob")],
            )
            .await
            .unwrap();

        let invites = f.sharing.get_invites(f.calendar_id).await.unwrap();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].href, "principals/users/bob");
        assert_eq!(invites[0].access, AccessLevel::FreeBusy);
        assert_eq!(invites[0].invite_status, InviteStatus::Pending);
        assert_eq!(invites[0].display_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn test_public_right_round_trip() {
        let f = fixture().await;
        assert_eq!(f.sharing.get_public_right(f.calendar_id).await.unwrap(), None);

        f.sharing
            .save_public_right(f.calendar_id, Some("{DAV:}read"))
            .await
            .unwrap();

        assert_eq!(
            f.sharing.get_public_right(f.calendar_id).await.unwrap(),
            Some(PublicRight::Read)
        );
        // Granting does not touch subscribers.
        assert_eq!(f.cleanup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_privilege_is_invalid_argument() {
        let f = fixture().await;
        let result = f
            .sharing
            .save_public_right(f.calendar_id, Some("{DAV:}bind"))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_revoking_public_right_cascades_to_subscribers() {
        let f = fixture().await;
        // Two subscriptions mirror alice's calendar, one mirrors another.
        let mirrored = "calendars/alice/events";
        for (principal, uri, source) in [
            ("principals/users/bob", "alice-events", mirrored),
            ("principals/users/carol", "alice-events", mirrored),
            ("principals/users/dave", "other", "calendars/erin/events"),
        ] {
            SubscriptionStore::create(
                f.store.as_ref(),
                &Subscription::new(principal, uri, source),
            )
            .await
            .unwrap();
        }

        f.sharing
            .save_public_right(f.calendar_id, Some("{DAV:}read"))
            .await
            .unwrap();
        f.sharing.save_public_right(f.calendar_id, None).await.unwrap();

        assert_eq!(f.cleanup.calls.load(Ordering::SeqCst), 1);
        assert!(f.store.find_by_source(mirrored).await.unwrap().is_empty());
        assert_eq!(
            f.store
                .find_by_source("calendars/erin/events")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_save_invite_status_targets_owner_instance() {
        let f = fixture().await;
        f.sharing
            .save_invite_status(f.calendar_id, InviteStatus::Accepted)
            .await
            .unwrap();

        let owner = f
            .store
            .find_owner_instance(f.calendar_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.invite_status, InviteStatus::Accepted);
    }
}
