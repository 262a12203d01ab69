use thiserror::Error;

use crate::entity::PathError;

/// Errors that can occur during store operations.
///
/// Read paths report missing data as `Ok(None)` / empty collections;
/// `NotFound` is reserved for write paths targeting absent records.
/// `Conflict` covers unique-index violations and lost token races, and is
/// distinguishable so the facade can translate it to a protocol-level
/// response. `Unsupported` marks a capability gap, as opposed to a data
/// gap.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    Conflict {
        entity_type: &'static str,
        id: String,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<PathError> for StoreError {
    fn from(err: PathError) -> Self {
        StoreError::InvalidArgument(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::CalendarPath;

    #[test]
    fn test_not_found_display() {
        let error = StoreError::NotFound {
            entity_type: "Calendar",
            id: "abc-123".to_string(),
        };
        assert_eq!(error.to_string(), "Calendar not found: abc-123");
    }

    #[test]
    fn test_conflict_display() {
        let error = StoreError::Conflict {
            entity_type: "CalendarInstance",
            id: "principals/users/alice:events".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "CalendarInstance already exists: principals/users/alice:events"
        );
    }

    #[test]
    fn test_unsupported_is_distinct_from_not_found() {
        let unsupported = StoreError::Unsupported("publish status");
        assert!(matches!(unsupported, StoreError::Unsupported(_)));
        assert!(!matches!(unsupported, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_path_error_converts_to_invalid_argument() {
        let err = "no-instance-here".parse::<CalendarPath>().unwrap_err();
        let store_err: StoreError = err.into();
        assert!(matches!(store_err, StoreError::InvalidArgument(_)));
    }
}
