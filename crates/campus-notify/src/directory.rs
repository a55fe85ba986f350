use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use campus_db::Database;
use campus_types::models::Role;

/// A recipient's email delivery preference.
#[derive(Debug, Clone)]
pub struct EmailPreference {
    pub address: Option<String>,
    pub opted_out: bool,
}

impl EmailPreference {
    /// The address to deliver to, or None when the recipient opted out or
    /// has no usable address.
    pub fn deliverable(&self) -> Option<&str> {
        if self.opted_out {
            return None;
        }
        self.address.as_deref().filter(|a| !a.is_empty())
    }
}

/// Lookup service for recipients: role membership and email preferences.
/// A seam so the engine can be exercised without a real user store.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn members_of(&self, role: Role) -> Result<Vec<Uuid>>;

    /// None when the user is unknown.
    async fn email_preference(&self, user: Uuid) -> Result<Option<EmailPreference>>;
}

/// Directory backed by the users table.
pub struct DbDirectory {
    db: Arc<Database>,
}

impl DbDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecipientDirectory for DbDirectory {
    async fn members_of(&self, role: Role) -> Result<Vec<Uuid>> {
        let db = self.db.clone();
        let ids = tokio::task::spawn_blocking(move || db.user_ids_by_role(role.as_str())).await??;

        let mut members = Vec::with_capacity(ids.len());
        for id in ids {
            match id.parse::<Uuid>() {
                Ok(uid) => members.push(uid),
                Err(e) => warn!("Skipping corrupt user id '{}': {}", id, e),
            }
        }
        Ok(members)
    }

    async fn email_preference(&self, user: Uuid) -> Result<Option<EmailPreference>> {
        let db = self.db.clone();
        let row =
            tokio::task::spawn_blocking(move || db.get_user_by_id(&user.to_string())).await??;

        Ok(row.map(|r| EmailPreference {
            address: r.email,
            opted_out: r.email_opt_out,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliverable_respects_opt_out_and_blank_addresses() {
        let pref = EmailPreference {
            address: Some("parent@example.edu".into()),
            opted_out: false,
        };
        assert_eq!(pref.deliverable(), Some("parent@example.edu"));

        let opted_out = EmailPreference {
            address: Some("parent@example.edu".into()),
            opted_out: true,
        };
        assert_eq!(opted_out.deliverable(), None);

        let blank = EmailPreference {
            address: Some(String::new()),
            opted_out: false,
        };
        assert_eq!(blank.deliverable(), None);

        let missing = EmailPreference {
            address: None,
            opted_out: false,
        };
        assert_eq!(missing.deliverable(), None);
    }

    #[tokio::test]
    async fn db_directory_resolves_roles_and_preferences() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let student = Uuid::new_v4();
        db.create_user(
            &student.to_string(),
            "ravi",
            "hash",
            "student",
            Some("ravi@example.edu"),
        )
        .unwrap();

        let dir = DbDirectory::new(db.clone());

        let members = dir.members_of(Role::Student).await.unwrap();
        assert_eq!(members, vec![student]);
        assert!(dir.members_of(Role::Parent).await.unwrap().is_empty());

        let pref = dir.email_preference(student).await.unwrap().unwrap();
        assert_eq!(pref.deliverable(), Some("ravi@example.edu"));

        assert!(
            dir.email_preference(Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }
}
