//! Database row types — these map directly to SQLite rows.
//! Distinct from campus-types API models to keep the DB layer independent.

use anyhow::{Context, Result};
use campus_types::models::{Category, Notification};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub email: Option<String>,
    pub email_opt_out: bool,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub recipient: Option<String>,
    pub message: String,
    pub category: String,
    pub read: bool,
    pub created_at: String,
}

impl NotificationRow {
    /// Convert a stored row into the API model.
    pub fn into_model(self) -> Result<Notification> {
        let id: Uuid = self
            .id
            .parse()
            .with_context(|| format!("corrupt notification id '{}'", self.id))?;

        let recipient = match &self.recipient {
            Some(r) => Some(
                r.parse::<Uuid>()
                    .with_context(|| format!("corrupt recipient '{}' on '{}'", r, self.id))?,
            ),
            None => None,
        };

        let category: Category = self
            .category
            .parse()
            .map_err(|e| anyhow::anyhow!("corrupt category on '{}': {}", self.id, e))?;

        let created_at = parse_timestamp(&self.created_at)
            .with_context(|| format!("corrupt created_at on '{}'", self.id))?;

        Ok(Notification {
            id,
            recipient,
            message: self.message,
            category,
            read: self.read,
            created_at,
        })
    }
}

/// SQLite may hold either RFC 3339 (our inserts) or the bare
/// "YYYY-MM-DD HH:MM:SS" form its `datetime('now')` default produces.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("unparseable timestamp '{s}'"))
}
