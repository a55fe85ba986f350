use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Portal roles. A closed set — audience resolution matches these
/// exhaustively rather than comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Faculty,
    Student,
    Parent,
}

impl Role {
    /// The roles an "all users" broadcast expands to. Admins are reached
    /// through system-wide records instead.
    pub const BROADCAST: [Role; 3] = [Role::Student, Role::Faculty, Role::Parent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Faculty => "faculty",
            Role::Student => "student",
            Role::Parent => "parent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Case-insensitive — role names arrive from route params and tokens.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "faculty" => Ok(Role::Faculty),
            "student" => Ok(Role::Student),
            "parent" => Ok(Role::Parent),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Notification category. Affects presentation only, never routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Info,
    Alert,
    Success,
    Academic,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Info => "info",
            Category::Alert => "alert",
            Category::Success => "success",
            Category::Academic => "academic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Category::Info),
            "alert" => Ok(Category::Alert),
            "success" => Ok(Category::Success),
            "academic" => Ok(Category::Academic),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// One entry of the persistent notification log.
///
/// `recipient = None` is the system-wide sentinel: the record is visible to
/// every admin through a read-time scope check and is never duplicated per
/// user. `read` is the only mutable field; Unread → Read is the only
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Option<Uuid>,
    pub message: String,
    pub category: Category,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Faculty".parse::<Role>().unwrap(), Role::Faculty);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("principal".parse::<Role>().is_err());
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in [Category::Info, Category::Alert, Category::Success, Category::Academic] {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
    }

    #[test]
    fn broadcast_roles_exclude_admin() {
        assert!(!Role::BROADCAST.contains(&Role::Admin));
        assert_eq!(Role::BROADCAST.len(), 3);
    }
}
