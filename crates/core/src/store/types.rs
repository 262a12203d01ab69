use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entity::{CalendarObject, ComponentType};

/// Errors that can occur when constructing a time range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("Invalid time range: start must be before or equal to end")]
    InvalidRange,
}

/// A half-open instant window used by calendar queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range, validating that start <= end.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeRangeError> {
        if start > end {
            return Err(TimeRangeError::InvalidRange);
        }
        Ok(Self { start, end })
    }
}

/// Restrictions applied by a calendar query.
///
/// A time range matches objects whose precomputed
/// `[first_occurrence, last_occurrence]` window overlaps it; objects
/// missing either bound never match a range filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectFilter {
    pub component: Option<ComponentType>,
    pub time_range: Option<TimeRange>,
}

impl ObjectFilter {
    /// Creates a filter matching everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the filter to one component type.
    pub fn with_component(mut self, component: ComponentType) -> Self {
        self.component = Some(component);
        self
    }

    /// Restricts the filter to objects overlapping the given window.
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Returns true if the object satisfies every restriction.
    pub fn matches(&self, object: &CalendarObject) -> bool {
        if let Some(component) = self.component {
            if object.component_type != component {
                return false;
            }
        }
        if let Some(range) = self.time_range {
            match (object.first_occurrence, object.last_occurrence) {
                (Some(first), Some(last)) => {
                    if first >= range.end || last <= range.start {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn instant(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, h, 0, 0).unwrap()
    }

    fn object(component: ComponentType, first: Option<u32>, last: Option<u32>) -> CalendarObject {
        CalendarObject {
            calendar_id: Uuid::new_v4(),
            uri: "a.ics".to_string(),
            uid: "uid-a".to_string(),
            component_type: component,
            first_occurrence: first.map(instant),
            last_occurrence: last.map(instant),
            raw_data: "BEGIN:VCALENDAR".to_string(),
            etag: "etag".to_string(),
            size: 15,
            last_modified: instant(0),
        }
    }

    #[test]
    fn test_valid_range_construction() {
        let range = TimeRange::new(instant(8), instant(12)).unwrap();
        assert_eq!(range.start, instant(8));
        assert_eq!(range.end, instant(12));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert_eq!(
            TimeRange::new(instant(12), instant(8)),
            Err(TimeRangeError::InvalidRange)
        );
    }

    #[test]
    fn test_component_filter() {
        let filter = ObjectFilter::all().with_component(ComponentType::Event);
        assert!(filter.matches(&object(ComponentType::Event, None, None)));
        assert!(!filter.matches(&object(ComponentType::Todo, None, None)));
    }

    #[test]
    fn test_time_range_overlap() {
        let filter =
            ObjectFilter::all().with_time_range(TimeRange::new(instant(9), instant(11)).unwrap());

        // Overlapping window matches.
        assert!(filter.matches(&object(ComponentType::Event, Some(10), Some(12))));
        // Fully before or after does not.
        assert!(!filter.matches(&object(ComponentType::Event, Some(6), Some(8))));
        assert!(!filter.matches(&object(ComponentType::Event, Some(12), Some(14))));
        // Missing bounds never match a range filter.
        assert!(!filter.matches(&object(ComponentType::Event, None, None)));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = ObjectFilter::all();
        assert!(filter.matches(&object(ComponentType::Journal, None, None)));
    }
}
