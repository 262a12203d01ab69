mod error;
mod traits;
mod types;

pub use error::{Result, StoreError};
pub use traits::{
    CalendarInstanceStore, CalendarObjectStore, CalendarStore, ChangeLogStore,
    SchedulingObjectStore, SubscriptionStore,
};
pub use types::{ObjectFilter, TimeRange, TimeRangeError};
