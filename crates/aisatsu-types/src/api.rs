use serde::{Deserialize, Serialize};

use crate::models::User;

// -- Register --

/// Missing fields deserialize to `None` so the handlers can answer with the
/// app's own 400 payload instead of an axum rejection.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub user: RegisteredUser,
}

/// Registration echoes back only what the client needs to show the id screen.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: String,
    pub name: String,
}

// -- User lookup --

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
    pub partner: Option<User>,
}

// -- Pairing --

#[derive(Debug, Deserialize)]
pub struct PairRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "partnerId")]
    pub partner_id: Option<String>,
}

/// Mirrors the pairing registry result verbatim: an unknown partner id is a
/// `success:false` payload, not an HTTP error.
#[derive(Debug, Serialize)]
pub struct PairResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// -- Subscribe --

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    /// Kept as raw JSON so a malformed subscription maps to the same 400 as
    /// a missing one.
    pub subscription: Option<serde_json::Value>,
}

/// Browser push subscription as produced by `PushManager.subscribe()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPayload {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
}

// -- Send --

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "messageType")]
    pub message_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message: String,
    pub greeting: String,
    #[serde(rename = "partnerName")]
    pub partner_name: String,
}

// -- History --

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(rename = "senderName")]
    pub sender_name: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

// -- VAPID --

#[derive(Debug, Serialize)]
pub struct VapidPublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Error body shared by every failing endpoint. Internals never leak here;
/// the detailed cause goes to the server log.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
