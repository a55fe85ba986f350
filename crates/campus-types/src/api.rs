use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Category, Role};

// -- JWT Claims --

/// JWT claims shared by campus-api (REST middleware) and campus-gateway
/// (WebSocket upgrade authentication). Canonical definition lives here to
/// avoid duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    /// Optional delivery address for the email channel.
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Notifications (read path) --

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailOptOutRequest {
    pub opt_out: bool,
}

// -- Notifications (publish path, admin only) --

/// Where a published notification is addressed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishTarget {
    User { id: Uuid },
    Users { ids: Vec<Uuid> },
    Role { role: Role },
    AllUsers,
    SystemWide,
}

#[derive(Debug, Deserialize)]
pub struct PublishEmail {
    pub subject: String,
    pub title: String,
    pub body: String,
    pub action_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub target: PublishTarget,
    pub message: String,
    pub category: Category,
    pub email: Option<PublishEmail>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub records_written: usize,
    pub system_wide: bool,
}
