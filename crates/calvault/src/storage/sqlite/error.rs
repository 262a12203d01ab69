//! SQLite error mapping.
//!
//! Maps `tokio_rusqlite::Error` and `rusqlite::Error` to `StoreError`
//! from `calvault_core::store`. Unique-index violations become the
//! `Conflict` variant so callers can distinguish them from plain query
//! failures.

use calvault_core::store::StoreError;

/// Maps a rusqlite error to a StoreError.
///
/// - `SQLITE_CONSTRAINT_UNIQUE` / `SQLITE_CONSTRAINT_PRIMARYKEY` → `Conflict`
/// - `SQLITE_CONSTRAINT_FOREIGNKEY` → `InvalidArgument`
/// - `CannotOpen` → `ConnectionFailed`
/// - `QueryReturnedNoRows` → `NotFound`
/// - everything else → `QueryFailed`
fn map_rusqlite_error(
    err: &rusqlite::Error,
    entity_type: &'static str,
    id: &str,
) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Conflict {
                entity_type,
                id: id.to_string(),
            }
        }

        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            StoreError::InvalidArgument(format!(
                "foreign key constraint violation for {entity_type}"
            ))
        }

        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.code == rusqlite::ErrorCode::CannotOpen =>
        {
            StoreError::ConnectionFailed(format!("Cannot open database: {err}"))
        }

        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
            entity_type,
            id: id.to_string(),
        },

        _ => StoreError::QueryFailed(err.to_string()),
    }
}

/// Maps a tokio_rusqlite error to a StoreError.
///
/// This is the entry point for error mapping in async code. It extracts
/// the inner `rusqlite::Error` if present, otherwise maps to a generic
/// variant.
pub fn map_store_error(
    err: tokio_rusqlite::Error,
    entity_type: &'static str,
    id: impl Into<String>,
) -> StoreError {
    let id = id.into();
    match &err {
        tokio_rusqlite::Error::Rusqlite(rusqlite_err) => {
            map_rusqlite_error(rusqlite_err, entity_type, &id)
        }
        tokio_rusqlite::Error::Close(_) => {
            StoreError::ConnectionFailed("Connection closed unexpectedly".to_string())
        }
        _ => StoreError::QueryFailed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn sqlite_failure(extended_code: std::os::raw::c_int) -> tokio_rusqlite::Error {
        let sqlite_err = rusqlite::ffi::Error {
            code: rusqlite::ErrorCode::ConstraintViolation,
            extended_code,
        };
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(sqlite_err, None))
    }

    #[test]
    fn test_unique_constraint_maps_to_conflict() {
        let result = map_store_error(
            sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE),
            "CalendarInstance",
            "principals/users/alice:events",
        );

        assert_eq!(
            result,
            StoreError::Conflict {
                entity_type: "CalendarInstance",
                id: "principals/users/alice:events".to_string(),
            }
        );
    }

    #[test]
    fn test_primary_key_constraint_maps_to_conflict() {
        let result = map_store_error(
            sqlite_failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY),
            "CalendarObject",
            "a.ics",
        );

        assert!(matches!(result, StoreError::Conflict { .. }));
    }

    #[test]
    fn test_foreign_key_maps_to_invalid_argument() {
        let result = map_store_error(
            sqlite_failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY),
            "CalendarInstance",
            "x",
        );

        assert!(matches!(result, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_no_rows_maps_to_not_found_with_id() {
        let err = tokio_rusqlite::Error::Rusqlite(rusqlite::Error::QueryReturnedNoRows);
        let result = map_store_error(err, "Calendar", "abc-123");

        match result {
            StoreError::NotFound { entity_type, id } => {
                assert_eq!(entity_type, "Calendar");
                assert_eq!(id, "abc-123");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_other_errors_map_to_query_failed() {
        let err = tokio_rusqlite::Error::Other(Box::new(std::io::Error::other("test error")));
        let result = map_store_error(err, "Calendar", "abc");

        assert!(matches!(result, StoreError::QueryFailed(_)));
    }
}
