mod operations;
mod path;
mod types;

pub use operations::{calendar_source_path, collapse_changes, principal_local_name};
pub use path::{CalendarPath, PathError};
pub use types::{
    AccessLevel, Calendar, CalendarInstance, CalendarObject, ChangeOperation, ChangeRecord,
    ChangeSet, ComponentType, InviteStatus, ObjectMetadata, Principal, PrincipalKind, PublicRight,
    SchedulingObject, Sharee, ShareeSet, Subscription,
};
