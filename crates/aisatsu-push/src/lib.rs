//! Web push delivery: VAPID key management (RFC 8292) and encrypted
//! message dispatch (RFC 8030/8291).

pub mod client;
pub mod vapid;

pub use client::{PushClient, PushOutcome, WebPushClient};
pub use vapid::VapidKeys;

use serde::{Deserialize, Serialize};

/// A browser's push subscription: everything needed to address one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

/// Notification payload shown by the service worker.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub data: PushData,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushData {
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "senderName")]
    pub sender_name: String,
}
