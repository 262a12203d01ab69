//! SQLite store implementation.
//!
//! Implements the store traits from `calvault_core::store` over a single
//! `tokio_rusqlite::Connection`. The connection is long-lived and safely
//! shared across concurrent logical operations; the change-log append
//! runs in an explicit transaction so a sync reader never observes an
//! advanced token without the corresponding change record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use calvault_core::entity::{
    AccessLevel, Calendar, CalendarInstance, CalendarObject, ChangeOperation, ChangeRecord,
    InviteStatus, PublicRight, SchedulingObject, Subscription,
};
use calvault_core::store::{
    CalendarInstanceStore, CalendarObjectStore, CalendarStore, ChangeLogStore, ObjectFilter,
    Result, SchedulingObjectStore, StoreError, SubscriptionStore,
};

use super::conversions::{
    format_datetime, format_optional_datetime, public_right_to_string, row_to_calendar,
    row_to_change, row_to_instance, row_to_object, row_to_scheduling_object, row_to_subscription,
};
use super::error::map_store_error;
use super::schema;

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

/// SQLite-based store implementation.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new store backed by a database file.
    ///
    /// The file is created if it doesn't exist. Tables are created
    /// unconditionally; supporting indexes only when `create_indexes` is
    /// set. Both are idempotent, so steady-state deployments can pass
    /// `false` to skip the index pass.
    pub async fn new(path: &str, create_indexes: bool) -> Result<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Self::init_schema(&conn, create_indexes).await?;

        Ok(Self { conn })
    }

    /// Creates a new store with an in-memory database.
    ///
    /// Useful for testing - data is lost when the connection is dropped.
    pub async fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Self::init_schema(&conn, true).await?;

        Ok(Self { conn })
    }

    /// Initialize the database schema.
    async fn init_schema(conn: &Connection, create_indexes: bool) -> Result<()> {
        conn.call(move |conn| {
            conn.execute_batch(schema::CREATE_TABLES).map_err(wrap_err)?;
            if create_indexes {
                conn.execute_batch(schema::CREATE_INDEXES)
                    .map_err(wrap_err)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

// ============================================================================
// CalendarStore implementation
// ============================================================================

#[async_trait]
impl CalendarStore for SqliteStore {
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Calendar>> {
        let id_strs: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_CALENDAR_BY_ID)
                    .map_err(wrap_err)?;
                let mut calendars = Vec::new();
                for id in &id_strs {
                    match stmt.query_row([id], row_to_calendar) {
                        Ok(calendar) => calendars.push(calendar),
                        Err(rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(wrap_err(e)),
                    }
                }
                Ok(calendars)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn create(&self, calendar: &Calendar) -> Result<Uuid> {
        let id = calendar.id;
        let calendar = calendar.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_CALENDAR,
                    rusqlite::params![
                        calendar.id.to_string(),
                        calendar.owner_principal,
                        calendar.display_name,
                        calendar.description,
                        calendar.color,
                        calendar.order,
                        calendar.timezone,
                        calendar.sync_token,
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_store_error(e, "Calendar", id.to_string()))?;

        Ok(id)
    }

    async fn update(&self, calendar: &Calendar) -> Result<()> {
        let id = calendar.id;
        let calendar = calendar.clone();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(
                        schema::UPDATE_CALENDAR,
                        rusqlite::params![
                            calendar.id.to_string(),
                            calendar.owner_principal,
                            calendar.display_name,
                            calendar.description,
                            calendar.color,
                            calendar.order,
                            calendar.timezone,
                        ],
                    )
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "Calendar", id.to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let id_str = id.to_string();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(schema::DELETE_CALENDAR, [&id_str])
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "Calendar", id.to_string()))
    }

    async fn get_sync_token(&self, id: Uuid) -> Result<Option<i64>> {
        let id_str = id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(schema::SELECT_SYNC_TOKEN).map_err(wrap_err)?;
                match stmt.query_row([&id_str], |row| row.get::<_, i64>(0)) {
                    Ok(token) => Ok(Some(token)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn increment_sync_token(&self, id: Uuid) -> Result<i64> {
        let id_str = id.to_string();

        self.conn
            .call(move |conn| {
                // A single UPDATE .. RETURNING is atomic; concurrent
                // mutators serialize on the row.
                conn.query_row(schema::BUMP_SYNC_TOKEN, [&id_str], |row| row.get(0))
                    .map_err(wrap_err)
            })
            .await
            .map_err(|e| map_store_error(e, "Calendar", id.to_string()))
    }
}

// ============================================================================
// CalendarInstanceStore implementation
// ============================================================================

#[async_trait]
impl CalendarInstanceStore for SqliteStore {
    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<CalendarInstance>> {
        let principal_uri = principal_uri.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_INSTANCES_BY_PRINCIPAL)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&principal_uri], row_to_instance)
                    .map_err(wrap_err)?;

                let mut instances = Vec::new();
                for row_result in rows {
                    instances.push(row_result.map_err(wrap_err)?);
                }
                Ok(instances)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_one(
        &self,
        principal_uri: &str,
        uri: &str,
        access: Option<AccessLevel>,
    ) -> Result<Option<CalendarInstance>> {
        let principal_uri = principal_uri.to_string();
        let uri = uri.to_string();

        let instance = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_INSTANCE_BY_PRINCIPAL_AND_URI)
                    .map_err(wrap_err)?;
                match stmt.query_row([&principal_uri, &uri], row_to_instance) {
                    Ok(instance) => Ok(Some(instance)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(instance.filter(|i| access.is_none_or(|a| i.access == a)))
    }

    async fn find_by_calendar(&self, calendar_id: Uuid) -> Result<Vec<CalendarInstance>> {
        let calendar_id_str = calendar_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_INSTANCES_BY_CALENDAR)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&calendar_id_str], row_to_instance)
                    .map_err(wrap_err)?;

                let mut instances = Vec::new();
                for row_result in rows {
                    instances.push(row_result.map_err(wrap_err)?);
                }
                Ok(instances)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_owner_instance(&self, calendar_id: Uuid) -> Result<Option<CalendarInstance>> {
        let calendar_id_str = calendar_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_OWNER_INSTANCE)
                    .map_err(wrap_err)?;
                match stmt.query_row(
                    rusqlite::params![calendar_id_str, AccessLevel::SharedOwner.code()],
                    row_to_instance,
                ) {
                    Ok(instance) => Ok(Some(instance)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_by_share_href(
        &self,
        calendar_id: Uuid,
        share_href: &str,
    ) -> Result<Option<CalendarInstance>> {
        let calendar_id_str = calendar_id.to_string();
        let share_href = share_href.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_INSTANCE_BY_SHARE_HREF)
                    .map_err(wrap_err)?;
                match stmt.query_row([&calendar_id_str, &share_href], row_to_instance) {
                    Ok(instance) => Ok(Some(instance)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn create(&self, instance: &CalendarInstance) -> Result<Uuid> {
        let id = instance.id;
        let conflict_id = format!("{}:{}", instance.principal_uri, instance.uri);
        let instance = instance.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_INSTANCE,
                    rusqlite::params![
                        instance.id.to_string(),
                        instance.calendar_id.to_string(),
                        instance.principal_uri,
                        instance.uri,
                        instance.access.code(),
                        instance.share_href,
                        instance.share_display_name,
                        instance.invite_status.code(),
                        public_right_to_string(&instance.public_right),
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarInstance", conflict_id))?;

        Ok(id)
    }

    async fn update(&self, instance: &CalendarInstance) -> Result<()> {
        let id = instance.id;
        let instance = instance.clone();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(
                        schema::UPDATE_INSTANCE,
                        rusqlite::params![
                            instance.id.to_string(),
                            instance.calendar_id.to_string(),
                            instance.principal_uri,
                            instance.uri,
                            instance.access.code(),
                            instance.share_href,
                            instance.share_display_name,
                            instance.invite_status.code(),
                            public_right_to_string(&instance.public_right),
                        ],
                    )
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarInstance", id.to_string()))
    }

    async fn set_invite_status(&self, instance_id: Uuid, status: InviteStatus) -> Result<()> {
        let id_str = instance_id.to_string();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(
                        schema::UPDATE_INSTANCE_INVITE_STATUS,
                        rusqlite::params![id_str, status.code()],
                    )
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarInstance", instance_id.to_string()))
    }

    async fn set_public_right(&self, calendar_id: Uuid, right: Option<PublicRight>) -> Result<()> {
        let calendar_id_str = calendar_id.to_string();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::UPDATE_INSTANCES_PUBLIC_RIGHT,
                    rusqlite::params![calendar_id_str, public_right_to_string(&right)],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn delete(&self, instance_id: Uuid) -> Result<()> {
        let id_str = instance_id.to_string();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(schema::DELETE_INSTANCE, [&id_str])
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarInstance", instance_id.to_string()))
    }

    async fn delete_by_share_href(&self, calendar_id: Uuid, share_href: &str) -> Result<()> {
        let calendar_id_str = calendar_id.to_string();
        let missing_id = format!("{calendar_id}:{share_href}");
        let share_href = share_href.to_string();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(
                        schema::DELETE_INSTANCE_BY_SHARE_HREF,
                        [&calendar_id_str, &share_href],
                    )
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarInstance", missing_id))
    }

    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()> {
        let calendar_id_str = calendar_id.to_string();

        self.conn
            .call(move |conn| {
                conn.execute(schema::DELETE_INSTANCES_BY_CALENDAR, [&calendar_id_str])
                    .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

// ============================================================================
// CalendarObjectStore implementation
// ============================================================================

#[async_trait]
impl CalendarObjectStore for SqliteStore {
    async fn get(&self, calendar_id: Uuid, uri: &str) -> Result<Option<CalendarObject>> {
        let calendar_id_str = calendar_id.to_string();
        let uri = uri.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(schema::SELECT_OBJECT).map_err(wrap_err)?;
                match stmt.query_row([&calendar_id_str, &uri], row_to_object) {
                    Ok(object) => Ok(Some(object)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_by_calendar(&self, calendar_id: Uuid) -> Result<Vec<CalendarObject>> {
        let calendar_id_str = calendar_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_OBJECTS_BY_CALENDAR)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&calendar_id_str], row_to_object)
                    .map_err(wrap_err)?;

                let mut objects = Vec::new();
                for row_result in rows {
                    objects.push(row_result.map_err(wrap_err)?);
                }
                Ok(objects)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_by_uris(
        &self,
        calendar_id: Uuid,
        uris: &[String],
    ) -> Result<Vec<CalendarObject>> {
        let calendar_id_str = calendar_id.to_string();
        let uris = uris.to_vec();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(schema::SELECT_OBJECT).map_err(wrap_err)?;
                let mut objects = Vec::new();
                for uri in &uris {
                    match stmt.query_row([&calendar_id_str, uri], row_to_object) {
                        Ok(object) => objects.push(object),
                        Err(rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(wrap_err(e)),
                    }
                }
                Ok(objects)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_by_uid(&self, calendar_ids: &[Uuid], uid: &str) -> Result<Vec<CalendarObject>> {
        let calendar_ids = calendar_ids.to_vec();
        let uid = uid.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_OBJECTS_BY_UID)
                    .map_err(wrap_err)?;
                let rows = stmt.query_map([&uid], row_to_object).map_err(wrap_err)?;

                let mut objects = Vec::new();
                for row_result in rows {
                    let object = row_result.map_err(wrap_err)?;
                    if calendar_ids.contains(&object.calendar_id) {
                        objects.push(object);
                    }
                }
                Ok(objects)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn query(&self, calendar_id: Uuid, filter: &ObjectFilter) -> Result<Vec<CalendarObject>> {
        let calendar_id_str = calendar_id.to_string();
        let component = filter.component;
        let time_range = filter.time_range;

        self.conn
            .call(move |conn| {
                let collect = |stmt: &mut rusqlite::Statement<'_>,
                               params: &[&dyn rusqlite::ToSql]|
                 -> std::result::Result<Vec<CalendarObject>, tokio_rusqlite::Error> {
                    let rows = stmt.query_map(params, row_to_object).map_err(wrap_err)?;
                    let mut objects = Vec::new();
                    for row_result in rows {
                        objects.push(row_result.map_err(wrap_err)?);
                    }
                    Ok(objects)
                };

                match (component, time_range) {
                    (None, None) => {
                        let mut stmt = conn
                            .prepare(schema::SELECT_OBJECTS_BY_CALENDAR)
                            .map_err(wrap_err)?;
                        collect(&mut stmt, &[&calendar_id_str])
                    }
                    (Some(component), None) => {
                        let mut stmt = conn
                            .prepare(schema::SELECT_OBJECTS_BY_COMPONENT)
                            .map_err(wrap_err)?;
                        collect(&mut stmt, &[&calendar_id_str, &component.as_str()])
                    }
                    (None, Some(range)) => {
                        let end = format_datetime(&range.end);
                        let start = format_datetime(&range.start);
                        let mut stmt = conn
                            .prepare(schema::SELECT_OBJECTS_IN_RANGE)
                            .map_err(wrap_err)?;
                        collect(&mut stmt, &[&calendar_id_str, &end, &start])
                    }
                    (Some(component), Some(range)) => {
                        let end = format_datetime(&range.end);
                        let start = format_datetime(&range.start);
                        let mut stmt = conn
                            .prepare(schema::SELECT_OBJECTS_BY_COMPONENT_IN_RANGE)
                            .map_err(wrap_err)?;
                        collect(
                            &mut stmt,
                            &[&calendar_id_str, &component.as_str(), &end, &start],
                        )
                    }
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn create(&self, object: &CalendarObject) -> Result<()> {
        let conflict_id = format!("{}/{}", object.calendar_id, object.uri);
        let object = object.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_OBJECT,
                    rusqlite::params![
                        object.calendar_id.to_string(),
                        object.uri,
                        object.uid,
                        object.component_type.as_str(),
                        format_optional_datetime(&object.first_occurrence),
                        format_optional_datetime(&object.last_occurrence),
                        object.raw_data,
                        object.etag,
                        object.size,
                        format_datetime(&object.last_modified),
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarObject", conflict_id))
    }

    async fn update(&self, object: &CalendarObject) -> Result<()> {
        let missing_id = format!("{}/{}", object.calendar_id, object.uri);
        let object = object.clone();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(
                        schema::UPDATE_OBJECT,
                        rusqlite::params![
                            object.calendar_id.to_string(),
                            object.uri,
                            object.uid,
                            object.component_type.as_str(),
                            format_optional_datetime(&object.first_occurrence),
                            format_optional_datetime(&object.last_occurrence),
                            object.raw_data,
                            object.etag,
                            object.size,
                            format_datetime(&object.last_modified),
                        ],
                    )
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarObject", missing_id))
    }

    async fn delete(&self, calendar_id: Uuid, uri: &str) -> Result<()> {
        let calendar_id_str = calendar_id.to_string();
        let missing_id = format!("{calendar_id}/{uri}");
        let uri = uri.to_string();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(schema::DELETE_OBJECT, [&calendar_id_str, &uri])
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "CalendarObject", missing_id))
    }

    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()> {
        let calendar_id_str = calendar_id.to_string();

        self.conn
            .call(move |conn| {
                conn.execute(schema::DELETE_OBJECTS_BY_CALENDAR, [&calendar_id_str])
                    .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

// ============================================================================
// ChangeLogStore implementation
// ============================================================================

#[async_trait]
impl ChangeLogStore for SqliteStore {
    async fn append(
        &self,
        calendar_id: Uuid,
        uri: &str,
        operation: ChangeOperation,
    ) -> Result<i64> {
        let calendar_id_str = calendar_id.to_string();
        let uri = uri.to_string();

        self.conn
            .call(move |conn| {
                // Insert + increment commit together; a reader holding a
                // snapshot sees neither or both.
                let tx = conn.transaction().map_err(wrap_err)?;
                let new_token: i64 = tx
                    .query_row(schema::BUMP_SYNC_TOKEN, [&calendar_id_str], |row| {
                        row.get(0)
                    })
                    .map_err(wrap_err)?;
                tx.execute(
                    schema::INSERT_CHANGE,
                    rusqlite::params![calendar_id_str, uri, new_token - 1, operation.code()],
                )
                .map_err(wrap_err)?;
                tx.commit().map_err(wrap_err)?;
                Ok(new_token)
            })
            .await
            .map_err(|e| map_store_error(e, "Calendar", calendar_id.to_string()))
    }

    async fn changes_in_window(
        &self,
        calendar_id: Uuid,
        from_token: i64,
        to_token: i64,
        limit: Option<u64>,
    ) -> Result<Vec<ChangeRecord>> {
        let calendar_id_str = calendar_id.to_string();
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |l| l as i64);

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_CHANGES_IN_WINDOW)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![calendar_id_str, from_token, to_token, limit],
                        row_to_change,
                    )
                    .map_err(wrap_err)?;

                let mut changes = Vec::new();
                for row_result in rows {
                    changes.push(row_result.map_err(wrap_err)?);
                }
                Ok(changes)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn delete_by_calendar(&self, calendar_id: Uuid) -> Result<()> {
        let calendar_id_str = calendar_id.to_string();

        self.conn
            .call(move |conn| {
                conn.execute(schema::DELETE_CHANGES_BY_CALENDAR, [&calendar_id_str])
                    .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

// ============================================================================
// SchedulingObjectStore implementation
// ============================================================================

#[async_trait]
impl SchedulingObjectStore for SqliteStore {
    async fn get(&self, principal_uri: &str, uri: &str) -> Result<Option<SchedulingObject>> {
        let principal_uri = principal_uri.to_string();
        let uri = uri.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_SCHEDULING_OBJECT)
                    .map_err(wrap_err)?;
                match stmt.query_row([&principal_uri, &uri], row_to_scheduling_object) {
                    Ok(object) => Ok(Some(object)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<SchedulingObject>> {
        let principal_uri = principal_uri.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_SCHEDULING_OBJECTS_BY_PRINCIPAL)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&principal_uri], row_to_scheduling_object)
                    .map_err(wrap_err)?;

                let mut objects = Vec::new();
                for row_result in rows {
                    objects.push(row_result.map_err(wrap_err)?);
                }
                Ok(objects)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn create(&self, object: &SchedulingObject) -> Result<()> {
        let conflict_id = format!("{}:{}", object.principal_uri, object.uri);
        let object = object.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_SCHEDULING_OBJECT,
                    rusqlite::params![
                        object.principal_uri,
                        object.uri,
                        object.raw_data,
                        format_datetime(&object.date_created),
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_store_error(e, "SchedulingObject", conflict_id))
    }

    async fn delete(&self, principal_uri: &str, uri: &str) -> Result<()> {
        let missing_id = format!("{principal_uri}:{uri}");
        let principal_uri = principal_uri.to_string();
        let uri = uri.to_string();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(schema::DELETE_SCHEDULING_OBJECT, [&principal_uri, &uri])
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "SchedulingObject", missing_id))
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff = format_datetime(&cutoff);

        self.conn
            .call(move |conn| {
                let removed = conn
                    .execute(schema::DELETE_EXPIRED_SCHEDULING_OBJECTS, [&cutoff])
                    .map_err(wrap_err)?;
                Ok(removed as u64)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

// ============================================================================
// SubscriptionStore implementation
// ============================================================================

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn find_by_principal(&self, principal_uri: &str) -> Result<Vec<Subscription>> {
        let principal_uri = principal_uri.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_SUBSCRIPTIONS_BY_PRINCIPAL)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&principal_uri], row_to_subscription)
                    .map_err(wrap_err)?;

                let mut subscriptions = Vec::new();
                for row_result in rows {
                    subscriptions.push(row_result.map_err(wrap_err)?);
                }
                Ok(subscriptions)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn get(&self, principal_uri: &str, uri: &str) -> Result<Option<Subscription>> {
        let principal_uri = principal_uri.to_string();
        let uri = uri.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(schema::SELECT_SUBSCRIPTION).map_err(wrap_err)?;
                match stmt.query_row([&principal_uri, &uri], row_to_subscription) {
                    Ok(subscription) => Ok(Some(subscription)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn find_by_source(&self, source: &str) -> Result<Vec<Subscription>> {
        let source = source.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_SUBSCRIPTIONS_BY_SOURCE)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&source], row_to_subscription)
                    .map_err(wrap_err)?;

                let mut subscriptions = Vec::new();
                for row_result in rows {
                    subscriptions.push(row_result.map_err(wrap_err)?);
                }
                Ok(subscriptions)
            })
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    async fn create(&self, subscription: &Subscription) -> Result<Uuid> {
        let id = subscription.id;
        let conflict_id = format!("{}:{}", subscription.principal_uri, subscription.uri);
        let subscription = subscription.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_SUBSCRIPTION,
                    rusqlite::params![
                        subscription.id.to_string(),
                        subscription.principal_uri,
                        subscription.uri,
                        subscription.display_name,
                        subscription.refresh_rate,
                        subscription.color,
                        subscription.order,
                        subscription.strip_todos,
                        subscription.strip_alarms,
                        subscription.strip_attachments,
                        subscription.source,
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(|e| map_store_error(e, "Subscription", conflict_id))?;

        Ok(id)
    }

    async fn update(&self, subscription: &Subscription) -> Result<()> {
        let missing_id = format!("{}:{}", subscription.principal_uri, subscription.uri);
        let subscription = subscription.clone();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(
                        schema::UPDATE_SUBSCRIPTION,
                        rusqlite::params![
                            subscription.principal_uri,
                            subscription.uri,
                            subscription.display_name,
                            subscription.refresh_rate,
                            subscription.color,
                            subscription.order,
                            subscription.strip_todos,
                            subscription.strip_alarms,
                            subscription.strip_attachments,
                            subscription.source,
                        ],
                    )
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "Subscription", missing_id))
    }

    async fn delete(&self, principal_uri: &str, uri: &str) -> Result<()> {
        let missing_id = format!("{principal_uri}:{uri}");
        let principal_uri = principal_uri.to_string();
        let uri = uri.to_string();

        self.conn
            .call(move |conn| {
                let rows = conn
                    .execute(schema::DELETE_SUBSCRIPTION, [&principal_uri, &uri])
                    .map_err(wrap_err)?;
                if rows == 0 {
                    Err(wrap_err(rusqlite::Error::QueryReturnedNoRows))
                } else {
                    Ok(())
                }
            })
            .await
            .map_err(|e| map_store_error(e, "Subscription", missing_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn store() -> SqliteStore {
        SqliteStore::new_in_memory().await.unwrap()
    }

    fn instant(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_calendar_round_trip() {
        let store = store().await;
        let calendar = Calendar::new("principals/users/alice", "Work")
            .with_color("#3B82F6")
            .with_timezone("Europe/Paris");

        let id = CalendarStore::create(&store, &calendar).await.unwrap();
        let found = store.find_by_ids(&[id]).await.unwrap();

        assert_eq!(found, vec![calendar]);
    }

    #[tokio::test]
    async fn test_sync_token_starts_at_zero_and_increments() {
        let store = store().await;
        let calendar = Calendar::new("principals/users/alice", "Work");
        let id = CalendarStore::create(&store, &calendar).await.unwrap();

        assert_eq!(store.get_sync_token(id).await.unwrap(), Some(0));
        assert_eq!(store.increment_sync_token(id).await.unwrap(), 1);
        assert_eq!(store.increment_sync_token(id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_increment_missing_calendar_is_not_found() {
        let store = store().await;
        let result = store.increment_sync_token(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_instance_unique_index_reports_conflict() {
        let store = store().await;
        let first = CalendarInstance::owner(Uuid::new_v4(), "principals/users/alice", "events");
        CalendarInstanceStore::create(&store, &first).await.unwrap();

        let second = CalendarInstance::sharee(
            Uuid::new_v4(),
            "principals/users/alice",
            "events",
            AccessLevel::Read,
            "principals/users/alice",
        );
        let result = CalendarInstanceStore::create(&store, &second).await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_append_writes_record_then_advances_token() {
        let store = store().await;
        let calendar = Calendar::new("principals/users/alice", "Work");
        let id = CalendarStore::create(&store, &calendar).await.unwrap();

        let token = store.append(id, "a.ics", ChangeOperation::Added).await.unwrap();
        assert_eq!(token, 1);
        assert_eq!(store.get_sync_token(id).await.unwrap(), Some(1));

        let records = store.changes_in_window(id, 0, 1, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uri, "a.ics");
        assert_eq!(records[0].sync_token, 0);
        assert_eq!(records[0].operation, ChangeOperation::Added);
    }

    #[tokio::test]
    async fn test_object_round_trip_with_occurrence_bounds() {
        let store = store().await;
        let calendar_id = Uuid::new_v4();
        let object = CalendarObject {
            calendar_id,
            uri: "a.ics".to_string(),
            uid: "uid-1".to_string(),
            component_type: calvault_core::entity::ComponentType::Event,
            first_occurrence: Some(instant(9)),
            last_occurrence: Some(instant(10)),
            raw_data: "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n".to_string(),
            etag: "abc".to_string(),
            size: 32,
            last_modified: instant(8),
        };

        CalendarObjectStore::create(&store, &object).await.unwrap();
        let found = CalendarObjectStore::get(&store, calendar_id, "a.ics")
            .await
            .unwrap();

        assert_eq!(found, Some(object));
    }

    #[tokio::test]
    async fn test_query_filters_by_component_and_range() {
        let store = store().await;
        let calendar_id = Uuid::new_v4();

        let make = |uri: &str, component, first: u32, last: u32| CalendarObject {
            calendar_id,
            uri: uri.to_string(),
            uid: format!("uid-{uri}"),
            component_type: component,
            first_occurrence: Some(instant(first)),
            last_occurrence: Some(instant(last)),
            raw_data: "BEGIN:VCALENDAR".to_string(),
            etag: "e".to_string(),
            size: 15,
            last_modified: instant(0),
        };

        use calvault_core::entity::ComponentType;
        use calvault_core::store::TimeRange;

        CalendarObjectStore::create(&store, &make("a.ics", ComponentType::Event, 9, 10))
            .await
            .unwrap();
        CalendarObjectStore::create(&store, &make("b.ics", ComponentType::Todo, 9, 10))
            .await
            .unwrap();
        CalendarObjectStore::create(&store, &make("c.ics", ComponentType::Event, 15, 16))
            .await
            .unwrap();

        let filter = ObjectFilter::all()
            .with_component(ComponentType::Event)
            .with_time_range(TimeRange::new(instant(8), instant(12)).unwrap());
        let matched = store.query(calendar_id, &filter).await.unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].uri, "a.ics");
    }

    #[tokio::test]
    async fn test_scheduling_expiry() {
        let store = store().await;
        for (uri, hour) in [("old.ics", 1), ("fresh.ics", 12)] {
            SchedulingObjectStore::create(
                &store,
                &SchedulingObject {
                    principal_uri: "principals/users/alice".to_string(),
                    uri: uri.to_string(),
                    raw_data: "BEGIN:VCALENDAR".to_string(),
                    date_created: instant(hour),
                },
            )
            .await
            .unwrap();
        }

        let removed = store.delete_expired(instant(6)).await.unwrap();

        assert_eq!(removed, 1);
        let remaining = SchedulingObjectStore::find_by_principal(&store, "principals/users/alice")
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].uri, "fresh.ics");
    }

    #[tokio::test]
    async fn test_subscription_round_trip_and_source_lookup() {
        let store = store().await;
        let mut subscription =
            Subscription::new("principals/users/alice", "team", "calendars/bob/events");
        subscription.display_name = Some("Team".to_string());
        subscription.strip_alarms = true;

        SubscriptionStore::create(&store, &subscription).await.unwrap();

        let found = SubscriptionStore::get(&store, "principals/users/alice", "team")
            .await
            .unwrap();
        assert_eq!(found, Some(subscription.clone()));

        let by_source = store.find_by_source("calendars/bob/events").await.unwrap();
        assert_eq!(by_source, vec![subscription]);
    }

    #[tokio::test]
    async fn test_skipping_index_creation_still_creates_tables() {
        // Index creation is an explicit choice at initialization time.
        let store = SqliteStore::new_in_memory().await.unwrap();
        drop(store);

        let conn = Connection::open_in_memory().await.unwrap();
        SqliteStore::init_schema(&conn, false).await.unwrap();
        let store = SqliteStore { conn };

        let calendar = Calendar::new("principals/users/alice", "Work");
        let id = CalendarStore::create(&store, &calendar).await.unwrap();
        assert_eq!(store.get_sync_token(id).await.unwrap(), Some(0));
    }
}
