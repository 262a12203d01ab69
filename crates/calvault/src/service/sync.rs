use std::sync::Arc;

use uuid::Uuid;

use calvault_core::entity::{collapse_changes, ChangeSet};
use calvault_core::store::{
    CalendarObjectStore, CalendarStore, ChangeLogStore, Result, StoreError,
};

/// Computes sync deltas from the change log.
pub struct SyncService {
    calendars: Arc<dyn CalendarStore>,
    objects: Arc<dyn CalendarObjectStore>,
    changes: Arc<dyn ChangeLogStore>,
}

impl SyncService {
    /// Creates the service over its stores.
    pub fn new(
        calendars: Arc<dyn CalendarStore>,
        objects: Arc<dyn CalendarObjectStore>,
        changes: Arc<dyn ChangeLogStore>,
    ) -> Self {
        Self {
            calendars,
            objects,
            changes,
        }
    }

    /// Computes the delta for a calendar since `client_token`.
    ///
    /// Returns `None` when the calendar is unknown (the protocol engine
    /// reports "sync not supported" in that case). An empty or absent
    /// token is an initial sync: every current object uri comes back as
    /// `added`. Otherwise the window `[client_token, current)` is read
    /// from the change log and collapsed to the last operation per uri.
    pub async fn changes_for_calendar(
        &self,
        calendar_id: Uuid,
        client_token: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Option<ChangeSet>> {
        let Some(current) = self.calendars.get_sync_token(calendar_id).await? else {
            tracing::debug!(calendar_id = %calendar_id, "Sync requested for unknown calendar");
            return Ok(None);
        };

        let client_token = client_token.filter(|t| !t.is_empty());
        let Some(token) = client_token else {
            let mut set = ChangeSet::empty(current);
            let objects = self.objects.find_by_calendar(calendar_id).await?;
            set.added = objects.into_iter().map(|o| o.uri).collect();
            tracing::debug!(
                calendar_id = %calendar_id,
                sync_token = current,
                added = set.added.len(),
                "Initial sync"
            );
            return Ok(Some(set));
        };

        let from: i64 = token
            .parse()
            .map_err(|_| StoreError::InvalidArgument(format!("unparsable sync token: {token}")))?;

        let records = self
            .changes
            .changes_in_window(calendar_id, from, current, limit)
            .await?;
        tracing::debug!(
            calendar_id = %calendar_id,
            from,
            to = current,
            records = records.len(),
            "Delta sync"
        );
        Ok(Some(collapse_changes(current, records)))
    }
}
