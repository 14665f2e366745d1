/// Database row types — these map directly to store rows.
/// Distinct from aisatsu-types API models to keep the storage layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRow {
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// One history entry as seen by the receiver. The sender name is resolved at
/// read time, so later renames show up historically.
#[derive(Debug, Clone)]
pub struct ReceivedMessageRow {
    pub id: i64,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub message_type: String,
    pub created_at: String,
}
