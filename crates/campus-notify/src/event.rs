use campus_types::models::{Category, Role};
use uuid::Uuid;

/// Where a delivery event is addressed.
#[derive(Debug, Clone)]
pub enum Target {
    /// One recipient.
    User(Uuid),
    /// A fixed list of recipients (deduplicated during resolution).
    Users(Vec<Uuid>),
    /// Every member of one role.
    Role(Role),
    /// Every student, faculty member and parent.
    AllUsers,
    /// A single record with no recipient, visible to every admin at read
    /// time. Never fanned out into per-user rows.
    SystemWide,
}

/// Email content carried by an event when email dispatch is requested.
#[derive(Debug, Clone)]
pub struct EmailPayload {
    pub subject: String,
    pub title: String,
    pub body: String,
    pub action_link: Option<String>,
}

/// The unit the dispatch engine consumes. Ephemeral: built by a caller,
/// consumed once, discarded. Its durable trace is the notification records
/// it produces.
#[derive(Debug, Clone)]
pub struct DeliveryEvent {
    pub target: Target,
    pub message: String,
    pub category: Category,
    /// `Some` means email dispatch is requested for this event.
    pub email: Option<EmailPayload>,
}
