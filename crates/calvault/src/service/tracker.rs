use std::sync::Arc;

use uuid::Uuid;

use calvault_core::entity::ChangeOperation;
use calvault_core::store::{ChangeLogStore, Result};

/// Pairs every object mutation with exactly one change-log append.
///
/// The append advances the calendar's sync token as part of the same
/// atomic store operation, so callers only ever see the counter move
/// together with its record.
#[derive(Clone)]
pub struct ChangeTracker {
    changes: Arc<dyn ChangeLogStore>,
}

impl ChangeTracker {
    /// Creates a tracker over the given change log.
    pub fn new(changes: Arc<dyn ChangeLogStore>) -> Self {
        Self { changes }
    }

    /// Records one mutation; returns the calendar's new sync token.
    pub async fn record(
        &self,
        calendar_id: Uuid,
        uri: &str,
        operation: ChangeOperation,
    ) -> Result<i64> {
        let token = self.changes.append(calendar_id, uri, operation).await?;
        tracing::debug!(
            calendar_id = %calendar_id,
            uri = %uri,
            ?operation,
            sync_token = token,
            "Change recorded"
        );
        Ok(token)
    }
}
