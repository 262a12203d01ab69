use std::collections::HashMap;

use super::types::{ChangeOperation, ChangeRecord, ChangeSet};

/// Collapses an ascending run of change records into the delta reported
/// to a client.
///
/// Later records overwrite earlier ones, so only the most recent
/// operation per URI survives in one sync window: a URI created and
/// deleted inside the window shows up under `deleted` only.
pub fn collapse_changes(current_token: i64, records: Vec<ChangeRecord>) -> ChangeSet {
    let mut last_seen: HashMap<String, ChangeOperation> = HashMap::new();
    for record in records {
        last_seen.insert(record.uri, record.operation);
    }

    let mut set = ChangeSet::empty(current_token);
    for (uri, operation) in last_seen {
        match operation {
            ChangeOperation::Added => set.added.push(uri),
            ChangeOperation::Modified => set.modified.push(uri),
            ChangeOperation::Deleted => set.deleted.push(uri),
        }
    }
    set.added.sort();
    set.modified.sort();
    set.deleted.sort();
    set
}

/// Extracts the local identifier from a principal URI.
///
/// `principals/users/alice` yields `alice`; a bare name yields itself.
pub fn principal_local_name(principal_uri: &str) -> &str {
    principal_uri
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(principal_uri)
}

/// Builds the path a calendar is addressed by from the outside, the form
/// subscription `source` fields use.
pub fn calendar_source_path(principal_uri: &str, calendar_uri: &str) -> String {
    format!(
        "calendars/{}/{}",
        principal_local_name(principal_uri),
        calendar_uri
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(calendar_id: Uuid, uri: &str, sync_token: i64, operation: ChangeOperation) -> ChangeRecord {
        ChangeRecord {
            calendar_id,
            uri: uri.to_string(),
            sync_token,
            operation,
        }
    }

    #[test]
    fn test_collapse_keeps_last_operation_per_uri() {
        let calendar_id = Uuid::new_v4();
        let records = vec![
            record(calendar_id, "a.ics", 0, ChangeOperation::Added),
            record(calendar_id, "a.ics", 1, ChangeOperation::Modified),
            record(calendar_id, "a.ics", 2, ChangeOperation::Deleted),
            record(calendar_id, "b.ics", 3, ChangeOperation::Added),
        ];

        let set = collapse_changes(4, records);

        assert_eq!(set.sync_token, 4);
        assert_eq!(set.added, vec!["b.ics".to_string()]);
        assert!(set.modified.is_empty());
        assert_eq!(set.deleted, vec!["a.ics".to_string()]);
    }

    #[test]
    fn test_collapse_buckets_by_operation() {
        let calendar_id = Uuid::new_v4();
        let records = vec![
            record(calendar_id, "new.ics", 5, ChangeOperation::Added),
            record(calendar_id, "edited.ics", 6, ChangeOperation::Modified),
            record(calendar_id, "gone.ics", 7, ChangeOperation::Deleted),
        ];

        let set = collapse_changes(8, records);

        assert_eq!(set.added, vec!["new.ics".to_string()]);
        assert_eq!(set.modified, vec!["edited.ics".to_string()]);
        assert_eq!(set.deleted, vec!["gone.ics".to_string()]);
    }

    #[test]
    fn test_collapse_empty_window() {
        let set = collapse_changes(3, Vec::new());
        assert_eq!(set, ChangeSet::empty(3));
    }

    #[test]
    fn test_principal_local_name() {
        assert_eq!(principal_local_name("principals/users/alice"), "alice");
        assert_eq!(principal_local_name("principals/resources/room-1/"), "room-1");
        assert_eq!(principal_local_name("alice"), "alice");
    }

    #[test]
    fn test_calendar_source_path() {
        assert_eq!(
            calendar_source_path("principals/users/alice", "events"),
            "calendars/alice/events"
        );
    }
}
