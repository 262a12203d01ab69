use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while parsing a composite calendar identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Calendar identifier is missing its instance component: {0}")]
    MissingInstance(String),
    #[error("Calendar identifier contains an invalid id: {0}")]
    InvalidId(String),
}

/// The composite identifier the protocol engine addresses calendars by:
/// `<calendarId>/<instanceId>`.
///
/// The calendar component names the shared [`Calendar`](super::Calendar)
/// document; the instance component names the caller's
/// [`CalendarInstance`](super::CalendarInstance) binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalendarPath {
    pub calendar_id: Uuid,
    pub instance_id: Uuid,
}

impl CalendarPath {
    /// Creates a path from its two components.
    pub fn new(calendar_id: Uuid, instance_id: Uuid) -> Self {
        Self {
            calendar_id,
            instance_id,
        }
    }
}

impl fmt::Display for CalendarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.calendar_id, self.instance_id)
    }
}

impl FromStr for CalendarPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (calendar, instance) = s
            .split_once('/')
            .ok_or_else(|| PathError::MissingInstance(s.to_string()))?;
        if instance.is_empty() {
            return Err(PathError::MissingInstance(s.to_string()));
        }
        let calendar_id =
            Uuid::parse_str(calendar).map_err(|_| PathError::InvalidId(calendar.to_string()))?;
        let instance_id =
            Uuid::parse_str(instance).map_err(|_| PathError::InvalidId(instance.to_string()))?;
        Ok(Self {
            calendar_id,
            instance_id,
        })
    }
}
