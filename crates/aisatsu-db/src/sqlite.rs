use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::models::{ReceivedMessageRow, SubscriptionRow, UserRow};
use crate::{PairOutcome, Store, migrations};

/// Embedded sqlite backend. A single connection behind a mutex is plenty at
/// this request volume (two users per pairing, a handful of sends per day).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-process database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

impl Store for SqliteStore {
    fn try_insert_user(&self, id: &str, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            match conn.execute("INSERT INTO users (id, name) VALUES (?1, ?2)", (id, name)) {
                Ok(_) => Ok(true),
                // Primary-key conflict: the candidate id is taken
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    fn link_partners(&self, user_id: &str, partner_id: &str) -> Result<PairOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM pairs WHERE user_id = ?1 AND partner_id = ?2",
                    (user_id, partner_id),
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(PairOutcome::AlreadyPaired);
            }

            // Supersede: drop every edge touching either user, including the
            // reciprocal edges held by former partners.
            tx.execute(
                "DELETE FROM pairs
                 WHERE user_id IN (?1, ?2) OR partner_id IN (?1, ?2)",
                (user_id, partner_id),
            )?;

            tx.execute(
                "INSERT INTO pairs (user_id, partner_id) VALUES (?1, ?2)",
                (user_id, partner_id),
            )?;
            tx.execute(
                "INSERT INTO pairs (user_id, partner_id) VALUES (?1, ?2)",
                (partner_id, user_id),
            )?;

            tx.commit()?;
            Ok(PairOutcome::Created)
        })
    }

    fn get_partner(&self, user_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.created_at
                 FROM pairs p
                 JOIN users u ON p.partner_id = u.id
                 WHERE p.user_id = ?1",
            )?;
            let row = stmt
                .query_row([user_id], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    fn upsert_subscription(
        &self,
        user_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO subscriptions (user_id, endpoint, keys_p256dh, keys_auth)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, endpoint, p256dh, auth],
            )?;
            Ok(())
        })
    }

    fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, endpoint, keys_p256dh, keys_auth
                 FROM subscriptions WHERE user_id = ?1",
            )?;
            let row = stmt
                .query_row([user_id], |row| {
                    Ok(SubscriptionRow {
                        user_id: row.get(0)?,
                        endpoint: row.get(1)?,
                        p256dh: row.get(2)?,
                        auth: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    fn append_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        message_type: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_logs (sender_id, receiver_id, message_type)
                 VALUES (?1, ?2, ?3)",
                params![sender_id, receiver_id, message_type],
            )?;
            Ok(())
        })
    }

    fn received_messages(
        &self,
        receiver_id: &str,
        limit: u32,
    ) -> Result<Vec<ReceivedMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, u.name, m.message_type, m.created_at
                 FROM message_logs m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.receiver_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![receiver_id, limit as i64], |row| {
                    Ok(ReceivedMessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        sender_name: row.get(2)?,
                        message_type: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}
