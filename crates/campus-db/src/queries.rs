use crate::Database;
use crate::models::{NotificationRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        role: &str,
        email: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, role, email) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, password_hash, role, email],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Every user id holding the given role, for broadcast expansion.
    pub fn user_ids_by_role(&self, role: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users WHERE role = ?1")?;
            let ids = stmt
                .query_map([role], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Returns false if the user does not exist.
    pub fn set_email_opt_out(&self, user_id: &str, opt_out: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET email_opt_out = ?1 WHERE id = ?2",
                rusqlite::params![opt_out, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Notifications --

    pub fn insert_notification(
        &self,
        id: &str,
        recipient: Option<&str>,
        message: &str,
        category: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, recipient, message, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, recipient, message, category, created_at],
            )?;
            Ok(())
        })
    }

    /// Notifications visible to the requester, newest first.
    ///
    /// Visibility: own records always; system-wide records (recipient NULL)
    /// only when `is_admin` — a read-time join, not a stored fan-out.
    pub fn list_notifications(
        &self,
        user_id: &str,
        is_admin: bool,
        limit: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient, message, category, read, created_at
                 FROM notifications
                 WHERE recipient = ?1 OR (?2 AND recipient IS NULL)
                 ORDER BY created_at DESC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, is_admin, limit], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Mark one record read, scoped to what the requester may see.
    ///
    /// Returns None when the id is unknown OR outside the requester's scope —
    /// callers must not distinguish the two. Marking an already-read record
    /// is a no-op that still returns the record.
    pub fn mark_read(
        &self,
        id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> Result<Option<NotificationRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1
                 WHERE id = ?1 AND (recipient = ?2 OR (?3 AND recipient IS NULL))",
                rusqlite::params![id, user_id, is_admin],
            )?;

            if changed == 0 {
                return Ok(None);
            }

            let mut stmt = conn.prepare(
                "SELECT id, recipient, message, category, read, created_at
                 FROM notifications WHERE id = ?1",
            )?;
            let row = stmt.query_row([id], map_notification).optional()?;
            Ok(row)
        })
    }

    /// One bulk UPDATE across the requester's scope; returns rows changed.
    pub fn mark_all_read(&self, user_id: &str, is_admin: bool) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1
                 WHERE read = 0 AND (recipient = ?1 OR (?2 AND recipient IS NULL))",
                rusqlite::params![user_id, is_admin],
            )?;
            Ok(changed)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // column is a compile-time constant, never user input
    let sql = format!(
        "SELECT id, username, password, role, email, email_opt_out, created_at
         FROM users WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                role: row.get(3)?,
                email: row.get(4)?,
                email_opt_out: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient: row.get(1)?,
        message: row.get(2)?,
        category: row.get(3)?,
        read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use uuid::Uuid;

    fn seed_user(db: &Database, role: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, &format!("user-{id}"), "hash", role, None)
            .unwrap();
        id
    }

    fn seed_notification(db: &Database, recipient: Option<&str>) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_notification(
            &id,
            recipient,
            "exam timetable published",
            "info",
            &chrono::Utc::now().to_rfc3339(),
        )
        .unwrap();
        id
    }

    #[test]
    fn listing_is_scoped_to_requester() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "student");
        let bob = seed_user(&db, "student");

        seed_notification(&db, Some(&alice));
        seed_notification(&db, Some(&bob));
        seed_notification(&db, None); // system-wide

        let rows = db.list_notifications(&alice, false, 20).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].recipient.as_deref(), Some(alice.as_str()));
    }

    #[test]
    fn admin_sees_system_wide_records() {
        let db = Database::open_in_memory().unwrap();
        let admin = seed_user(&db, "admin");
        seed_notification(&db, Some(&admin));
        seed_notification(&db, None);

        let rows = db.list_notifications(&admin, true, 20).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn listing_is_newest_first_and_capped() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "faculty");

        for i in 0..5 {
            let id = Uuid::new_v4().to_string();
            let ts = format!("2026-01-0{}T00:00:00+00:00", i + 1);
            db.insert_notification(&id, Some(&user), "m", "info", &ts)
                .unwrap();
        }

        let rows = db.list_notifications(&user, false, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].created_at > rows[2].created_at);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "parent");
        let nid = seed_notification(&db, Some(&user));

        let first = db.mark_read(&nid, &user, false).unwrap().unwrap();
        assert!(first.read);

        let second = db.mark_read(&nid, &user, false).unwrap().unwrap();
        assert!(second.read);
    }

    #[test]
    fn mark_read_hides_other_users_records() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "student");
        let bob = seed_user(&db, "student");
        let nid = seed_notification(&db, Some(&alice));

        // Unknown id and out-of-scope id are indistinguishable
        assert!(db.mark_read(&nid, &bob, false).unwrap().is_none());
        assert!(
            db.mark_read(&Uuid::new_v4().to_string(), &bob, false)
                .unwrap()
                .is_none()
        );

        // Alice's record is still unread
        let rows = db.list_notifications(&alice, false, 20).unwrap();
        assert!(!rows[0].read);
    }

    #[test]
    fn non_admin_cannot_mark_system_wide() {
        let db = Database::open_in_memory().unwrap();
        let student = seed_user(&db, "student");
        let admin = seed_user(&db, "admin");
        let nid = seed_notification(&db, None);

        assert!(db.mark_read(&nid, &student, false).unwrap().is_none());
        assert!(db.mark_read(&nid, &admin, true).unwrap().is_some());
    }

    #[test]
    fn mark_all_read_counts_and_is_zero_when_clean() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "student");
        seed_notification(&db, Some(&user));
        seed_notification(&db, Some(&user));

        assert_eq!(db.mark_all_read(&user, false).unwrap(), 2);
        assert_eq!(db.mark_all_read(&user, false).unwrap(), 0);
    }

    #[test]
    fn user_ids_by_role_matches_exactly() {
        let db = Database::open_in_memory().unwrap();
        let s1 = seed_user(&db, "student");
        let s2 = seed_user(&db, "student");
        seed_user(&db, "faculty");

        let mut ids = db.user_ids_by_role("student").unwrap();
        ids.sort();
        let mut expected = vec![s1, s2];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(db.user_ids_by_role("janitor").unwrap().is_empty());
    }

    #[test]
    fn email_opt_out_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "parent");

        assert!(db.set_email_opt_out(&user, true).unwrap());
        let row = db.get_user_by_id(&user).unwrap().unwrap();
        assert!(row.email_opt_out);

        assert!(!db.set_email_opt_out("nobody", true).unwrap());
    }
}
