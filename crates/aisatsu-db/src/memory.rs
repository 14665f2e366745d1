use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use crate::models::{ReceivedMessageRow, SubscriptionRow, UserRow};
use crate::{PairOutcome, Store};

/// In-process backend with the same contract as [`crate::SqliteStore`].
/// Used by the test suites and for ephemeral runs (`AISATSU_STORE=memory`).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRow>,
    /// user_id -> partner_id. A map entry is one directed edge, so single
    /// outgoing partnership is structural here.
    pairs: HashMap<String, String>,
    subscriptions: HashMap<String, SubscriptionRow>,
    messages: Vec<LogEntry>,
    next_message_id: i64,
}

struct LogEntry {
    id: i64,
    sender_id: String,
    receiver_id: String,
    message_type: String,
    created_at: String,
}

/// Same shape sqlite's `datetime('now')` produces, so both backends hand the
/// API identical `createdAt` strings.
fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))
    }
}

impl Store for MemoryStore {
    fn try_insert_user(&self, id: &str, name: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.users.contains_key(id) {
            return Ok(false);
        }
        inner.users.insert(
            id.to_string(),
            UserRow {
                id: id.to_string(),
                name: name.to_string(),
                created_at: now(),
            },
        );
        Ok(true)
    }

    fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    fn link_partners(&self, user_id: &str, partner_id: &str) -> Result<PairOutcome> {
        let mut inner = self.lock()?;

        if inner.pairs.get(user_id).is_some_and(|p| p.as_str() == partner_id) {
            return Ok(PairOutcome::AlreadyPaired);
        }

        // Supersede prior pairings of both users, dropping the reciprocal
        // edges their ex-partners held.
        for id in [user_id, partner_id] {
            if let Some(old_partner) = inner.pairs.remove(id) {
                if inner.pairs.get(&old_partner).is_some_and(|p| p.as_str() == id) {
                    inner.pairs.remove(&old_partner);
                }
            }
        }

        inner.pairs.insert(user_id.to_string(), partner_id.to_string());
        inner.pairs.insert(partner_id.to_string(), user_id.to_string());
        Ok(PairOutcome::Created)
    }

    fn get_partner(&self, user_id: &str) -> Result<Option<UserRow>> {
        let inner = self.lock()?;
        Ok(inner
            .pairs
            .get(user_id)
            .and_then(|pid| inner.users.get(pid))
            .cloned())
    }

    fn upsert_subscription(
        &self,
        user_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<()> {
        self.lock()?.subscriptions.insert(
            user_id.to_string(),
            SubscriptionRow {
                user_id: user_id.to_string(),
                endpoint: endpoint.to_string(),
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
            },
        );
        Ok(())
    }

    fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRow>> {
        Ok(self.lock()?.subscriptions.get(user_id).cloned())
    }

    fn append_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        message_type: &str,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        inner.next_message_id += 1;
        let id = inner.next_message_id;
        inner.messages.push(LogEntry {
            id,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            message_type: message_type.to_string(),
            created_at: now(),
        });
        Ok(())
    }

    fn received_messages(
        &self,
        receiver_id: &str,
        limit: u32,
    ) -> Result<Vec<ReceivedMessageRow>> {
        let inner = self.lock()?;
        Ok(inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.receiver_id == receiver_id)
            .take(limit as usize)
            .map(|m| ReceivedMessageRow {
                id: m.id,
                sender_id: m.sender_id.clone(),
                sender_name: inner.users.get(&m.sender_id).map(|u| u.name.clone()),
                message_type: m.message_type.clone(),
                created_at: m.created_at.clone(),
            })
            .collect())
    }
}
