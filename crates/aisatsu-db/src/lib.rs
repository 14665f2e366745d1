pub mod memory;
pub mod migrations;
pub mod models;
pub mod sqlite;

use anyhow::Result;

pub use memory::MemoryStore;
pub use models::{ReceivedMessageRow, SubscriptionRow, UserRow};
pub use sqlite::SqliteStore;

/// Result of a pairing attempt against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Both directed edges were written.
    Created,
    /// The exact edge already existed; nothing was changed.
    AlreadyPaired,
}

/// Storage contract behind the identity / pairing / subscription / log
/// components. Backends are selected once at process start; all of them must
/// enforce id uniqueness and pairing atomicity inside the store itself, not
/// via check-then-act in callers.
///
/// Methods are blocking — async callers run them under `spawn_blocking`.
pub trait Store: Send + Sync {
    /// Insert a user with a caller-supplied candidate id. Returns `false`
    /// when the id is already taken (the caller retries with a new one).
    fn try_insert_user(&self, id: &str, name: &str) -> Result<bool>;

    fn get_user(&self, id: &str) -> Result<Option<UserRow>>;

    /// Create the symmetric pair (both directed edges) in one atomic unit.
    ///
    /// Idempotent: an existing `(user_id, partner_id)` edge is a no-op
    /// success. A new pair supersedes any previous pairing of either user —
    /// the ex-partner's reciprocal edge is removed as well, so nobody is
    /// left pointing at a user who has moved on.
    fn link_partners(&self, user_id: &str, partner_id: &str) -> Result<PairOutcome>;

    /// Follow the single outgoing edge from `user_id`.
    fn get_partner(&self, user_id: &str) -> Result<Option<UserRow>>;

    /// Insert-or-replace, keyed by user: a renewed browser subscription
    /// overwrites the previous one.
    fn upsert_subscription(
        &self,
        user_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<()>;

    fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRow>>;

    /// Append one immutable audit record. Never updated or deleted.
    fn append_message(&self, sender_id: &str, receiver_id: &str, message_type: &str)
    -> Result<()>;

    /// Most recent `limit` messages for a receiver, newest first, each with
    /// the sender's current display name resolved at read time.
    fn received_messages(&self, receiver_id: &str, limit: u32)
    -> Result<Vec<ReceivedMessageRow>>;
}
