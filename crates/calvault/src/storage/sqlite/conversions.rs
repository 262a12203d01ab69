//! SQLite row conversion functions.
//!
//! Pure functions for converting between SQLite rows and entity types,
//! testable in isolation without database access.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use calvault_core::entity::{
    AccessLevel, Calendar, CalendarInstance, CalendarObject, ChangeOperation, ChangeRecord,
    ComponentType, InviteStatus, PublicRight, SchedulingObject, Subscription,
};

/// Convert a SQLite row to a Calendar.
///
/// Expected columns: id, owner_principal, display_name, description,
/// color, display_order, timezone, sync_token
pub fn row_to_calendar(row: &Row) -> rusqlite::Result<Calendar> {
    let id: String = row.get(0)?;

    Ok(Calendar {
        id: parse_uuid(&id)?,
        owner_principal: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        order: row.get(5)?,
        timezone: row.get(6)?,
        sync_token: row.get(7)?,
    })
}

/// Convert a SQLite row to a CalendarInstance.
///
/// Expected columns: id, calendar_id, principal_uri, uri, access,
/// share_href, share_display_name, invite_status, public_right
pub fn row_to_instance(row: &Row) -> rusqlite::Result<CalendarInstance> {
    let id: String = row.get(0)?;
    let calendar_id: String = row.get(1)?;
    let access: i64 = row.get(4)?;
    let invite_status: i64 = row.get(7)?;
    let public_right: Option<String> = row.get(8)?;

    Ok(CalendarInstance {
        id: parse_uuid(&id)?,
        calendar_id: parse_uuid(&calendar_id)?,
        principal_uri: row.get(2)?,
        uri: row.get(3)?,
        access: parse_access(access)?,
        share_href: row.get(5)?,
        share_display_name: row.get(6)?,
        invite_status: parse_invite_status(invite_status)?,
        public_right: public_right.as_deref().map(parse_public_right).transpose()?,
    })
}

/// Convert a SQLite row to a CalendarObject.
///
/// Expected columns: calendar_id, uri, uid, component_type,
/// first_occurrence, last_occurrence, raw_data, etag, size, last_modified
pub fn row_to_object(row: &Row) -> rusqlite::Result<CalendarObject> {
    let calendar_id: String = row.get(0)?;
    let component_type: String = row.get(3)?;
    let first_occurrence: Option<String> = row.get(4)?;
    let last_occurrence: Option<String> = row.get(5)?;
    let last_modified: String = row.get(9)?;

    Ok(CalendarObject {
        calendar_id: parse_uuid(&calendar_id)?,
        uri: row.get(1)?,
        uid: row.get(2)?,
        component_type: parse_component_type(&component_type)?,
        first_occurrence: first_occurrence.as_deref().map(parse_datetime).transpose()?,
        last_occurrence: last_occurrence.as_deref().map(parse_datetime).transpose()?,
        raw_data: row.get(6)?,
        etag: row.get(7)?,
        size: row.get(8)?,
        last_modified: parse_datetime(&last_modified)?,
    })
}

/// Convert a SQLite row to a ChangeRecord.
///
/// Expected columns: calendar_id, uri, sync_token, operation
pub fn row_to_change(row: &Row) -> rusqlite::Result<ChangeRecord> {
    let calendar_id: String = row.get(0)?;
    let operation: i64 = row.get(3)?;

    Ok(ChangeRecord {
        calendar_id: parse_uuid(&calendar_id)?,
        uri: row.get(1)?,
        sync_token: row.get(2)?,
        operation: parse_operation(operation)?,
    })
}

/// Convert a SQLite row to a SchedulingObject.
///
/// Expected columns: principal_uri, uri, raw_data, date_created
pub fn row_to_scheduling_object(row: &Row) -> rusqlite::Result<SchedulingObject> {
    let date_created: String = row.get(3)?;

    Ok(SchedulingObject {
        principal_uri: row.get(0)?,
        uri: row.get(1)?,
        raw_data: row.get(2)?,
        date_created: parse_datetime(&date_created)?,
    })
}

/// Convert a SQLite row to a Subscription.
///
/// Expected columns: id, principal_uri, uri, display_name, refresh_rate,
/// color, display_order, strip_todos, strip_alarms, strip_attachments,
/// source
pub fn row_to_subscription(row: &Row) -> rusqlite::Result<Subscription> {
    let id: String = row.get(0)?;

    Ok(Subscription {
        id: parse_uuid(&id)?,
        principal_uri: row.get(1)?,
        uri: row.get(2)?,
        display_name: row.get(3)?,
        refresh_rate: row.get(4)?,
        color: row.get(5)?,
        order: row.get(6)?,
        strip_todos: row.get(7)?,
        strip_alarms: row.get(8)?,
        strip_attachments: row.get(9)?,
        source: row.get(10)?,
    })
}

/// Format a datetime for SQLite storage (RFC 3339).
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Format an optional datetime for SQLite storage.
pub fn format_optional_datetime(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(format_datetime)
}

/// Serialize a public right to its stored privilege string.
pub fn public_right_to_string(right: &Option<PublicRight>) -> Option<&'static str> {
    right.map(PublicRight::as_privilege)
}

// ============================================================================
// Helper functions
// ============================================================================

fn conversion_error(what: &str, value: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid {what}: {value}"),
        )),
    )
}

/// Parse a UUID from string.
fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a datetime from RFC 3339 string.
fn parse_datetime(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_access(code: i64) -> rusqlite::Result<AccessLevel> {
    AccessLevel::from_code(code).ok_or_else(|| conversion_error("access level", code))
}

fn parse_invite_status(code: i64) -> rusqlite::Result<InviteStatus> {
    InviteStatus::from_code(code).ok_or_else(|| conversion_error("invite status", code))
}

fn parse_operation(code: i64) -> rusqlite::Result<ChangeOperation> {
    ChangeOperation::from_code(code).ok_or_else(|| conversion_error("change operation", code))
}

fn parse_component_type(s: &str) -> rusqlite::Result<ComponentType> {
    ComponentType::parse(s).ok_or_else(|| conversion_error("component type", s))
}

fn parse_public_right(s: &str) -> rusqlite::Result<PublicRight> {
    PublicRight::from_privilege(s).ok_or_else(|| conversion_error("public right", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse_datetime_round_trip() {
        let dt = DateTime::parse_from_rfc3339("2024-06-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_datetime(&format_datetime(&dt)).unwrap(), dt);
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("not-a-date").is_err());
    }

    #[test]
    fn test_parse_access_rejects_unknown_code() {
        assert!(parse_access(0).is_err());
        assert_eq!(parse_access(2).unwrap(), AccessLevel::SharedOwner);
    }

    #[test]
    fn test_parse_operation_codes() {
        assert_eq!(parse_operation(1).unwrap(), ChangeOperation::Added);
        assert_eq!(parse_operation(3).unwrap(), ChangeOperation::Deleted);
        assert!(parse_operation(9).is_err());
    }

    #[test]
    fn test_public_right_storage_round_trip() {
        let stored = public_right_to_string(&Some(PublicRight::Write)).unwrap();
        assert_eq!(parse_public_right(stored).unwrap(), PublicRight::Write);
        assert_eq!(public_right_to_string(&None), None);
    }
}
