use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A calendar document: shared metadata plus the synchronization counter.
///
/// One `Calendar` can be bound to many principals through
/// [`CalendarInstance`] records; the document itself is owned by the
/// principal that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: Uuid,
    pub owner_principal: String,
    pub display_name: String,
    pub description: Option<String>,
    /// CSS color value shown by clients.
    pub color: Option<String>,
    pub order: Option<i64>,
    /// Olson timezone identifier, e.g. `Europe/Paris`.
    pub timezone: Option<String>,
    /// Monotonically increasing change counter. Starts at 0 and advances
    /// by exactly 1 for every object mutation on this calendar.
    pub sync_token: i64,
}

impl Calendar {
    /// Creates a new calendar owned by the given principal.
    pub fn new(owner_principal: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_principal: owner_principal.into(),
            display_name: display_name.into(),
            description: None,
            color: None,
            order: None,
            timezone: None,
            sync_token: 0,
        }
    }

    /// Sets the description for this calendar.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the color for this calendar.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Sets the ordering hint for this calendar.
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the timezone for this calendar.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Sets a specific ID for this calendar (useful for testing).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

/// Access level carried by a [`CalendarInstance`].
///
/// `SharedOwner` marks the single instance representing true ownership of
/// the underlying calendar; every other level describes a received share.
/// The integer codes are the persisted wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    Owner,
    SharedOwner,
    Read,
    ReadWrite,
    Administration,
    FreeBusy,
    NoAccess,
}

impl AccessLevel {
    /// Returns the stable integer code for this access level.
    pub fn code(self) -> i64 {
        match self {
            AccessLevel::Owner => 1,
            AccessLevel::SharedOwner => 2,
            AccessLevel::Read => 3,
            AccessLevel::ReadWrite => 4,
            AccessLevel::Administration => 5,
            AccessLevel::FreeBusy => 6,
            AccessLevel::NoAccess => 7,
        }
    }

    /// Looks up an access level from its integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(AccessLevel::Owner),
            2 => Some(AccessLevel::SharedOwner),
            3 => Some(AccessLevel::Read),
            4 => Some(AccessLevel::ReadWrite),
            5 => Some(AccessLevel::Administration),
            6 => Some(AccessLevel::FreeBusy),
            7 => Some(AccessLevel::NoAccess),
            _ => None,
        }
    }

    /// Returns true for the instance bound to the calendar's real owner.
    pub fn is_shared_owner(self) -> bool {
        matches!(self, AccessLevel::SharedOwner)
    }
}

/// Lifecycle state of a share invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InviteStatus {
    NoInvite,
    Pending,
    Accepted,
    Declined,
    Invalid,
}

impl InviteStatus {
    /// Returns the stable integer code for this invite status.
    pub fn code(self) -> i64 {
        match self {
            InviteStatus::NoInvite => 1,
            InviteStatus::Pending => 2,
            InviteStatus::Accepted => 3,
            InviteStatus::Declined => 4,
            InviteStatus::Invalid => 5,
        }
    }

    /// Looks up an invite status from its integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(InviteStatus::NoInvite),
            2 => Some(InviteStatus::Pending),
            3 => Some(InviteStatus::Accepted),
            4 => Some(InviteStatus::Declined),
            5 => Some(InviteStatus::Invalid),
            _ => None,
        }
    }
}

/// A right granted to all authenticated principals on a calendar,
/// independent of individual shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicRight {
    Read,
    Write,
    All,
}

impl PublicRight {
    /// Returns the DAV privilege string for this right.
    pub fn as_privilege(self) -> &'static str {
        match self {
            PublicRight::Read => "{DAV:}read",
            PublicRight::Write => "{DAV:}write",
            PublicRight::All => "{DAV:}all",
        }
    }

    /// Parses a DAV privilege string into a public right.
    pub fn from_privilege(privilege: &str) -> Option<Self> {
        match privilege {
            "{DAV:}read" => Some(PublicRight::Read),
            "{DAV:}write" => Some(PublicRight::Write),
            "{DAV:}all" => Some(PublicRight::All),
            _ => None,
        }
    }
}

/// A binding of one [`Calendar`] to one principal.
///
/// Exactly one instance per calendar carries
/// [`AccessLevel::SharedOwner`]; all other instances for that calendar
/// are shares. `(principal_uri, uri)` pairs are unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInstance {
    pub id: Uuid,
    pub calendar_id: Uuid,
    pub principal_uri: String,
    pub uri: String,
    pub access: AccessLevel,
    pub share_href: Option<String>,
    pub share_display_name: Option<String>,
    pub invite_status: InviteStatus,
    pub public_right: Option<PublicRight>,
}

impl CalendarInstance {
    /// Creates the owner instance for a freshly created calendar.
    pub fn owner(
        calendar_id: Uuid,
        principal_uri: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            calendar_id,
            principal_uri: principal_uri.into(),
            uri: uri.into(),
            access: AccessLevel::SharedOwner,
            share_href: None,
            share_display_name: None,
            invite_status: InviteStatus::NoInvite,
            public_right: None,
        }
    }

    /// Creates a sharee instance for an invited principal.
    pub fn sharee(
        calendar_id: Uuid,
        principal_uri: impl Into<String>,
        uri: impl Into<String>,
        access: AccessLevel,
        share_href: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            calendar_id,
            principal_uri: principal_uri.into(),
            uri: uri.into(),
            access,
            share_href: Some(share_href.into()),
            share_display_name: None,
            invite_status: InviteStatus::Pending,
            public_right: None,
        }
    }

    /// Sets the display name shown to the sharee.
    pub fn with_share_display_name(mut self, name: impl Into<String>) -> Self {
        self.share_display_name = Some(name.into());
        self
    }

    /// Sets a specific ID for this instance (useful for testing).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

/// The iCalendar component kind stored in a [`CalendarObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentType {
    Event,
    Todo,
    Journal,
    FreeBusy,
}

impl ComponentType {
    /// Returns the iCalendar component name, e.g. `VEVENT`.
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Event => "VEVENT",
            ComponentType::Todo => "VTODO",
            ComponentType::Journal => "VJOURNAL",
            ComponentType::FreeBusy => "VFREEBUSY",
        }
    }

    /// Parses an iCalendar component name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VEVENT" => Some(ComponentType::Event),
            "VTODO" => Some(ComponentType::Todo),
            "VJOURNAL" => Some(ComponentType::Journal),
            "VFREEBUSY" => Some(ComponentType::FreeBusy),
            _ => None,
        }
    }
}

/// An event resource stored in a calendar.
///
/// `first_occurrence` / `last_occurrence` are precomputed by the caller
/// (recurrence expansion is not this backend's job) and enable range
/// queries without re-parsing `raw_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarObject {
    pub calendar_id: Uuid,
    pub uri: String,
    /// iCalendar UID, used for de-duplication across a principal's
    /// calendars.
    pub uid: String,
    pub component_type: ComponentType,
    pub first_occurrence: Option<DateTime<Utc>>,
    pub last_occurrence: Option<DateTime<Utc>>,
    pub raw_data: String,
    pub etag: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

/// Caller-precomputed metadata accompanying an object write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub uid: String,
    pub component_type: ComponentType,
    pub first_occurrence: Option<DateTime<Utc>>,
    pub last_occurrence: Option<DateTime<Utc>>,
}

impl ObjectMetadata {
    /// Creates metadata for a non-recurring component with no bounds.
    pub fn new(uid: impl Into<String>, component_type: ComponentType) -> Self {
        Self {
            uid: uid.into(),
            component_type,
            first_occurrence: None,
            last_occurrence: None,
        }
    }

    /// Sets the precomputed occurrence window.
    pub fn with_occurrences(mut self, first: DateTime<Utc>, last: DateTime<Utc>) -> Self {
        self.first_occurrence = Some(first);
        self.last_occurrence = Some(last);
        self
    }
}

/// The kind of mutation recorded in a [`ChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeOperation {
    Added,
    Modified,
    Deleted,
}

impl ChangeOperation {
    /// Returns the stable integer code for this operation.
    pub fn code(self) -> i64 {
        match self {
            ChangeOperation::Added => 1,
            ChangeOperation::Modified => 2,
            ChangeOperation::Deleted => 3,
        }
    }

    /// Looks up an operation from its integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ChangeOperation::Added),
            2 => Some(ChangeOperation::Modified),
            3 => Some(ChangeOperation::Deleted),
            _ => None,
        }
    }
}

/// One append-only entry in a calendar's change history.
///
/// `sync_token` equals the calendar's counter value at the moment the
/// change was recorded, i.e. before the paired increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub calendar_id: Uuid,
    pub uri: String,
    pub sync_token: i64,
    pub operation: ChangeOperation,
}

/// The delta reported to a synchronizing client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub sync_token: i64,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// Creates an empty change set at the given token.
    pub fn empty(sync_token: i64) -> Self {
        Self {
            sync_token,
            ..Self::default()
        }
    }
}

/// A pending iTip message sitting in a principal's scheduling inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingObject {
    pub principal_uri: String,
    pub uri: String,
    pub raw_data: String,
    pub date_created: DateTime<Utc>,
}

/// A mirror record for a calendar subscribed to from an external source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub principal_uri: String,
    pub uri: String,
    pub display_name: Option<String>,
    pub refresh_rate: Option<String>,
    pub color: Option<String>,
    pub order: Option<i64>,
    pub strip_todos: bool,
    pub strip_alarms: bool,
    pub strip_attachments: bool,
    /// Path of the calendar being mirrored.
    pub source: String,
}

impl Subscription {
    /// Creates a subscription to the given source.
    pub fn new(
        principal_uri: impl Into<String>,
        uri: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_uri: principal_uri.into(),
            uri: uri.into(),
            display_name: None,
            refresh_rate: None,
            color: None,
            order: None,
            strip_todos: false,
            strip_alarms: false,
            strip_attachments: false,
            source: source.into(),
        }
    }
}

/// A sharee descriptor reported to the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sharee {
    pub href: String,
    pub principal: Option<String>,
    pub access: AccessLevel,
    pub invite_status: InviteStatus,
    pub display_name: Option<String>,
}

/// A sharee mutation requested by the protocol engine.
///
/// `access` = [`AccessLevel::NoAccess`] removes the share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareeSet {
    pub href: String,
    pub principal: Option<String>,
    pub access: AccessLevel,
    pub display_name: Option<String>,
}

impl ShareeSet {
    /// Creates a grant request for the given href.
    pub fn grant(href: impl Into<String>, access: AccessLevel) -> Self {
        Self {
            href: href.into(),
            principal: None,
            access,
            display_name: None,
        }
    }

    /// Creates a removal request for the given href.
    pub fn revoke(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            principal: None,
            access: AccessLevel::NoAccess,
            display_name: None,
        }
    }

    /// Sets the resolved principal URI.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Sets the display name shown to the sharee.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// The kind of principal behind a principal URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrincipalKind {
    User,
    Resource,
}

/// A directory entry for a principal, as resolved by the external
/// directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uri: String,
    pub display_name: Option<String>,
    pub kind: PrincipalKind,
}
