use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pairs (
            user_id     TEXT NOT NULL,
            partner_id  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, partner_id)
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id     TEXT PRIMARY KEY,
            endpoint    TEXT NOT NULL,
            keys_p256dh TEXT NOT NULL,
            keys_auth   TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS message_logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       TEXT NOT NULL,
            receiver_id     TEXT NOT NULL,
            message_type    TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_message_logs_receiver
            ON message_logs(receiver_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
