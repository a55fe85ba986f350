use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            role            TEXT NOT NULL,
            email           TEXT,
            email_opt_out   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_users_role
            ON users(role);

        -- recipient IS NULL marks a system-wide record, visible to admins
        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            recipient   TEXT REFERENCES users(id),
            message     TEXT NOT NULL,
            category    TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
