use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use campus_types::models::Role;

use crate::directory::RecipientDirectory;
use crate::event::Target;

/// Outcome of audience resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Concrete recipients, deduplicated, order preserved.
    /// May be empty — broadcasting to zero recipients is a valid no-op.
    Recipients(Vec<Uuid>),
    /// The system-wide sentinel passes through untouched.
    SystemWide,
}

/// Expands a delivery target into concrete recipient ids.
pub struct AudienceResolver {
    directory: Arc<dyn RecipientDirectory>,
}

impl AudienceResolver {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, target: &Target) -> Result<Resolved> {
        let recipients = match target {
            Target::User(id) => vec![*id],
            Target::Users(ids) => dedup(ids.iter().copied()),
            Target::Role(role) => self.directory.members_of(*role).await?,
            Target::AllUsers => {
                let mut all = Vec::new();
                for role in Role::BROADCAST {
                    all.extend(self.directory.members_of(role).await?);
                }
                dedup(all.into_iter())
            }
            Target::SystemWide => return Ok(Resolved::SystemWide),
        };

        Ok(Resolved::Recipients(recipients))
    }
}

fn dedup(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::EmailPreference;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeDirectory {
        members: HashMap<Role, Vec<Uuid>>,
    }

    #[async_trait]
    impl RecipientDirectory for FakeDirectory {
        async fn members_of(&self, role: Role) -> Result<Vec<Uuid>> {
            Ok(self.members.get(&role).cloned().unwrap_or_default())
        }

        async fn email_preference(&self, _user: Uuid) -> Result<Option<EmailPreference>> {
            Ok(None)
        }
    }

    fn resolver(members: HashMap<Role, Vec<Uuid>>) -> AudienceResolver {
        AudienceResolver::new(Arc::new(FakeDirectory { members }))
    }

    #[tokio::test]
    async fn single_user_passes_through() {
        let r = resolver(HashMap::new());
        let id = Uuid::new_v4();

        let resolved = r.resolve(&Target::User(id)).await.unwrap();
        assert_eq!(resolved, Resolved::Recipients(vec![id]));
    }

    #[tokio::test]
    async fn explicit_list_is_deduplicated_in_order() {
        let r = resolver(HashMap::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let resolved = r.resolve(&Target::Users(vec![a, b, a])).await.unwrap();
        assert_eq!(resolved, Resolved::Recipients(vec![a, b]));
    }

    #[tokio::test]
    async fn empty_role_is_an_empty_audience_not_an_error() {
        let r = resolver(HashMap::new());

        let resolved = r.resolve(&Target::Role(Role::Parent)).await.unwrap();
        assert_eq!(resolved, Resolved::Recipients(vec![]));
    }

    #[tokio::test]
    async fn all_users_unions_broadcast_roles() {
        let s = Uuid::new_v4();
        let f = Uuid::new_v4();
        let p = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let mut members = HashMap::new();
        members.insert(Role::Student, vec![s]);
        members.insert(Role::Faculty, vec![f]);
        members.insert(Role::Parent, vec![p, s]); // overlap: a student who is also listed as parent contact
        members.insert(Role::Admin, vec![admin]);

        let resolved = resolver(members).resolve(&Target::AllUsers).await.unwrap();
        let Resolved::Recipients(ids) = resolved else {
            panic!("expected recipients");
        };

        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&admin));
    }

    #[tokio::test]
    async fn system_wide_passes_through() {
        let r = resolver(HashMap::new());
        let resolved = r.resolve(&Target::SystemWide).await.unwrap();
        assert_eq!(resolved, Resolved::SystemWide);
    }
}
