//! SQLite schema definitions and SQL statement constants.
//!
//! All SQL used by the SQLite store lives here, pure data with no I/O.
//! Index creation is split from table creation so steady-state
//! deployments can skip it (both are idempotent).

/// SQL statement to create all tables.
pub const CREATE_TABLES: &str = r#"
-- Calendar documents
CREATE TABLE IF NOT EXISTS calendars (
    id TEXT PRIMARY KEY,
    owner_principal TEXT NOT NULL,
    display_name TEXT NOT NULL,
    description TEXT,
    color TEXT,
    display_order INTEGER,
    timezone TEXT,
    sync_token INTEGER NOT NULL DEFAULT 0
);

-- Per-principal calendar bindings
CREATE TABLE IF NOT EXISTS calendar_instances (
    id TEXT PRIMARY KEY,
    calendar_id TEXT NOT NULL,
    principal_uri TEXT NOT NULL,
    uri TEXT NOT NULL,
    access INTEGER NOT NULL,
    share_href TEXT,
    share_display_name TEXT,
    invite_status INTEGER NOT NULL,
    public_right TEXT,
    FOREIGN KEY (calendar_id) REFERENCES calendars(id) ON DELETE CASCADE
);

-- Event resources
CREATE TABLE IF NOT EXISTS calendar_objects (
    calendar_id TEXT NOT NULL,
    uri TEXT NOT NULL,
    uid TEXT NOT NULL,
    component_type TEXT NOT NULL,
    first_occurrence TEXT,
    last_occurrence TEXT,
    raw_data TEXT NOT NULL,
    etag TEXT NOT NULL,
    size INTEGER NOT NULL,
    last_modified TEXT NOT NULL,
    PRIMARY KEY (calendar_id, uri)
);

-- Append-only change history
CREATE TABLE IF NOT EXISTS calendar_changes (
    calendar_id TEXT NOT NULL,
    uri TEXT NOT NULL,
    sync_token INTEGER NOT NULL,
    operation INTEGER NOT NULL
);

-- Scheduling inboxes
CREATE TABLE IF NOT EXISTS scheduling_objects (
    principal_uri TEXT NOT NULL,
    uri TEXT NOT NULL,
    raw_data TEXT NOT NULL,
    date_created TEXT NOT NULL,
    PRIMARY KEY (principal_uri, uri)
);

-- External-subscription mirrors
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    principal_uri TEXT NOT NULL,
    uri TEXT NOT NULL,
    display_name TEXT,
    refresh_rate TEXT,
    color TEXT,
    display_order INTEGER,
    strip_todos INTEGER NOT NULL DEFAULT 0,
    strip_alarms INTEGER NOT NULL DEFAULT 0,
    strip_attachments INTEGER NOT NULL DEFAULT 0,
    source TEXT NOT NULL
);
"#;

/// SQL statement to create all supporting indexes.
pub const CREATE_INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_instances_principal_uri ON calendar_instances(principal_uri, uri);
CREATE INDEX IF NOT EXISTS idx_instances_calendar ON calendar_instances(calendar_id);
CREATE INDEX IF NOT EXISTS idx_objects_calendar ON calendar_objects(calendar_id);
CREATE INDEX IF NOT EXISTS idx_objects_range ON calendar_objects(calendar_id, component_type, first_occurrence, last_occurrence);
CREATE INDEX IF NOT EXISTS idx_objects_uid ON calendar_objects(uid);
CREATE INDEX IF NOT EXISTS idx_changes_calendar_token ON calendar_changes(calendar_id, sync_token);
CREATE INDEX IF NOT EXISTS idx_scheduling_date_created ON scheduling_objects(date_created);
CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_principal_uri ON subscriptions(principal_uri, uri);
CREATE INDEX IF NOT EXISTS idx_subscriptions_source ON subscriptions(source);
"#;

// Calendar queries
pub const INSERT_CALENDAR: &str = r#"
INSERT INTO calendars (id, owner_principal, display_name, description, color, display_order, timezone, sync_token)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;

pub const SELECT_CALENDAR_BY_ID: &str = r#"
SELECT id, owner_principal, display_name, description, color, display_order, timezone, sync_token
FROM calendars
WHERE id = ?1
"#;

pub const UPDATE_CALENDAR: &str = r#"
UPDATE calendars
SET owner_principal = ?2, display_name = ?3, description = ?4, color = ?5, display_order = ?6, timezone = ?7
WHERE id = ?1
"#;

pub const DELETE_CALENDAR: &str = r#"
DELETE FROM calendars
WHERE id = ?1
"#;

pub const SELECT_SYNC_TOKEN: &str = r#"
SELECT sync_token
FROM calendars
WHERE id = ?1
"#;

pub const BUMP_SYNC_TOKEN: &str = r#"
UPDATE calendars
SET sync_token = sync_token + 1
WHERE id = ?1
RETURNING sync_token
"#;

// Instance queries
pub const INSERT_INSTANCE: &str = r#"
INSERT INTO calendar_instances (id, calendar_id, principal_uri, uri, access, share_href, share_display_name, invite_status, public_right)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#;

pub const SELECT_INSTANCES_BY_PRINCIPAL: &str = r#"
SELECT id, calendar_id, principal_uri, uri, access, share_href, share_display_name, invite_status, public_right
FROM calendar_instances
WHERE principal_uri = ?1
ORDER BY uri ASC
"#;

pub const SELECT_INSTANCE_BY_PRINCIPAL_AND_URI: &str = r#"
SELECT id, calendar_id, principal_uri, uri, access, share_href, share_display_name, invite_status, public_right
FROM calendar_instances
WHERE principal_uri = ?1 AND uri = ?2
"#;

pub const SELECT_INSTANCES_BY_CALENDAR: &str = r#"
SELECT id, calendar_id, principal_uri, uri, access, share_href, share_display_name, invite_status, public_right
FROM calendar_instances
WHERE calendar_id = ?1
ORDER BY principal_uri ASC
"#;

pub const SELECT_OWNER_INSTANCE: &str = r#"
SELECT id, calendar_id, principal_uri, uri, access, share_href, share_display_name, invite_status, public_right
FROM calendar_instances
WHERE calendar_id = ?1 AND access = ?2
"#;

pub const SELECT_INSTANCE_BY_SHARE_HREF: &str = r#"
SELECT id, calendar_id, principal_uri, uri, access, share_href, share_display_name, invite_status, public_right
FROM calendar_instances
WHERE calendar_id = ?1 AND share_href = ?2
"#;

pub const UPDATE_INSTANCE: &str = r#"
UPDATE calendar_instances
SET calendar_id = ?2, principal_uri = ?3, uri = ?4, access = ?5, share_href = ?6, share_display_name = ?7, invite_status = ?8, public_right = ?9
WHERE id = ?1
"#;

pub const UPDATE_INSTANCE_INVITE_STATUS: &str = r#"
UPDATE calendar_instances
SET invite_status = ?2
WHERE id = ?1
"#;

pub const UPDATE_INSTANCES_PUBLIC_RIGHT: &str = r#"
UPDATE calendar_instances
SET public_right = ?2
WHERE calendar_id = ?1
"#;

pub const DELETE_INSTANCE: &str = r#"
DELETE FROM calendar_instances
WHERE id = ?1
"#;

pub const DELETE_INSTANCE_BY_SHARE_HREF: &str = r#"
DELETE FROM calendar_instances
WHERE calendar_id = ?1 AND share_href = ?2
"#;

pub const DELETE_INSTANCES_BY_CALENDAR: &str = r#"
DELETE FROM calendar_instances
WHERE calendar_id = ?1
"#;

// Object queries
pub const INSERT_OBJECT: &str = r#"
INSERT INTO calendar_objects (calendar_id, uri, uid, component_type, first_occurrence, last_occurrence, raw_data, etag, size, last_modified)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

pub const SELECT_OBJECT: &str = r#"
SELECT calendar_id, uri, uid, component_type, first_occurrence, last_occurrence, raw_data, etag, size, last_modified
FROM calendar_objects
WHERE calendar_id = ?1 AND uri = ?2
"#;

pub const SELECT_OBJECTS_BY_CALENDAR: &str = r#"
SELECT calendar_id, uri, uid, component_type, first_occurrence, last_occurrence, raw_data, etag, size, last_modified
FROM calendar_objects
WHERE calendar_id = ?1
ORDER BY uri ASC
"#;

pub const SELECT_OBJECTS_BY_UID: &str = r#"
SELECT calendar_id, uri, uid, component_type, first_occurrence, last_occurrence, raw_data, etag, size, last_modified
FROM calendar_objects
WHERE uid = ?1
"#;

pub const SELECT_OBJECTS_BY_COMPONENT: &str = r#"
SELECT calendar_id, uri, uid, component_type, first_occurrence, last_occurrence, raw_data, etag, size, last_modified
FROM calendar_objects
WHERE calendar_id = ?1 AND component_type = ?2
ORDER BY uri ASC
"#;

pub const SELECT_OBJECTS_IN_RANGE: &str = r#"
SELECT calendar_id, uri, uid, component_type, first_occurrence, last_occurrence, raw_data, etag, size, last_modified
FROM calendar_objects
WHERE calendar_id = ?1
  AND first_occurrence IS NOT NULL AND first_occurrence < ?2
  AND last_occurrence IS NOT NULL AND last_occurrence > ?3
ORDER BY uri ASC
"#;

pub const SELECT_OBJECTS_BY_COMPONENT_IN_RANGE: &str = r#"
SELECT calendar_id, uri, uid, component_type, first_occurrence, last_occurrence, raw_data, etag, size, last_modified
FROM calendar_objects
WHERE calendar_id = ?1 AND component_type = ?2
  AND first_occurrence IS NOT NULL AND first_occurrence < ?3
  AND last_occurrence IS NOT NULL AND last_occurrence > ?4
ORDER BY uri ASC
"#;

pub const UPDATE_OBJECT: &str = r#"
UPDATE calendar_objects
SET uid = ?3, component_type = ?4, first_occurrence = ?5, last_occurrence = ?6, raw_data = ?7, etag = ?8, size = ?9, last_modified = ?10
WHERE calendar_id = ?1 AND uri = ?2
"#;

pub const DELETE_OBJECT: &str = r#"
DELETE FROM calendar_objects
WHERE calendar_id = ?1 AND uri = ?2
"#;

pub const DELETE_OBJECTS_BY_CALENDAR: &str = r#"
DELETE FROM calendar_objects
WHERE calendar_id = ?1
"#;

// Change-log queries
pub const INSERT_CHANGE: &str = r#"
INSERT INTO calendar_changes (calendar_id, uri, sync_token, operation)
VALUES (?1, ?2, ?3, ?4)
"#;

pub const SELECT_CHANGES_IN_WINDOW: &str = r#"
SELECT calendar_id, uri, sync_token, operation
FROM calendar_changes
WHERE calendar_id = ?1 AND sync_token >= ?2 AND sync_token < ?3
ORDER BY sync_token ASC
LIMIT ?4
"#;

pub const DELETE_CHANGES_BY_CALENDAR: &str = r#"
DELETE FROM calendar_changes
WHERE calendar_id = ?1
"#;

// Scheduling queries
pub const INSERT_SCHEDULING_OBJECT: &str = r#"
INSERT INTO scheduling_objects (principal_uri, uri, raw_data, date_created)
VALUES (?1, ?2, ?3, ?4)
"#;

pub const SELECT_SCHEDULING_OBJECT: &str = r#"
SELECT principal_uri, uri, raw_data, date_created
FROM scheduling_objects
WHERE principal_uri = ?1 AND uri = ?2
"#;

pub const SELECT_SCHEDULING_OBJECTS_BY_PRINCIPAL: &str = r#"
SELECT principal_uri, uri, raw_data, date_created
FROM scheduling_objects
WHERE principal_uri = ?1
ORDER BY uri ASC
"#;

pub const DELETE_SCHEDULING_OBJECT: &str = r#"
DELETE FROM scheduling_objects
WHERE principal_uri = ?1 AND uri = ?2
"#;

pub const DELETE_EXPIRED_SCHEDULING_OBJECTS: &str = r#"
DELETE FROM scheduling_objects
WHERE date_created < ?1
"#;

// Subscription queries
pub const INSERT_SUBSCRIPTION: &str = r#"
INSERT INTO subscriptions (id, principal_uri, uri, display_name, refresh_rate, color, display_order, strip_todos, strip_alarms, strip_attachments, source)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#;

pub const SELECT_SUBSCRIPTION: &str = r#"
SELECT id, principal_uri, uri, display_name, refresh_rate, color, display_order, strip_todos, strip_alarms, strip_attachments, source
FROM subscriptions
WHERE principal_uri = ?1 AND uri = ?2
"#;

pub const SELECT_SUBSCRIPTIONS_BY_PRINCIPAL: &str = r#"
SELECT id, principal_uri, uri, display_name, refresh_rate, color, display_order, strip_todos, strip_alarms, strip_attachments, source
FROM subscriptions
WHERE principal_uri = ?1
ORDER BY uri ASC
"#;

pub const SELECT_SUBSCRIPTIONS_BY_SOURCE: &str = r#"
SELECT id, principal_uri, uri, display_name, refresh_rate, color, display_order, strip_todos, strip_alarms, strip_attachments, source
FROM subscriptions
WHERE source = ?1
"#;

pub const UPDATE_SUBSCRIPTION: &str = r#"
UPDATE subscriptions
SET display_name = ?3, refresh_rate = ?4, color = ?5, display_order = ?6, strip_todos = ?7, strip_alarms = ?8, strip_attachments = ?9, source = ?10
WHERE principal_uri = ?1 AND uri = ?2
"#;

pub const DELETE_SUBSCRIPTION: &str = r#"
DELETE FROM subscriptions
WHERE principal_uri = ?1 AND uri = ?2
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_covers_every_collection() {
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS calendars"));
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS calendar_instances"));
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS calendar_objects"));
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS calendar_changes"));
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS scheduling_objects"));
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS subscriptions"));
    }

    #[test]
    fn test_instance_uniqueness_is_a_unique_index() {
        assert!(CREATE_INDEXES
            .contains("CREATE UNIQUE INDEX IF NOT EXISTS idx_instances_principal_uri"));
    }

    #[test]
    fn test_bump_statement_is_a_single_atomic_update() {
        assert!(BUMP_SYNC_TOKEN.contains("sync_token = sync_token + 1"));
        assert!(BUMP_SYNC_TOKEN.contains("RETURNING"));
    }

    #[test]
    fn test_change_window_is_half_open_and_ordered() {
        assert!(SELECT_CHANGES_IN_WINDOW.contains("sync_token >= ?2"));
        assert!(SELECT_CHANGES_IN_WINDOW.contains("sync_token < ?3"));
        assert!(SELECT_CHANGES_IN_WINDOW.contains("ORDER BY sync_token ASC"));
    }

    #[test]
    fn test_instance_selects_share_one_column_list() {
        let columns = "access, share_href, share_display_name, invite_status, public_right";
        for stmt in [
            SELECT_INSTANCES_BY_PRINCIPAL,
            SELECT_INSTANCES_BY_CALENDAR,
            SELECT_OWNER_INSTANCE,
            SELECT_INSTANCE_BY_SHARE_HREF,
        ] {
            assert!(stmt.contains(columns));
        }
    }
}
