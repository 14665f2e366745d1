//! Encrypted web push dispatch with VAPID authentication.
//!
//! Uses the `web-push` crate for RFC 8291 payload encryption and VAPID
//! signing, then delivers the HTTP request through a shared `reqwest::Client`
//! (the crate's built-in transport is disabled via `default-features = false`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;
use web_push::{ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder};

use crate::{PushPayload, PushSubscription, VapidKeys};

/// What became of a single delivery attempt. Transport and signing errors
/// surface as `Err`; callers treat all of it as non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The push service answered 410 Gone: the subscription is dead and a
    /// fresh one is needed before the next delivery can work.
    Gone,
}

/// Seam between the greeting service and the push transport, so tests can
/// substitute a fake and exercise the dispatch-failure paths offline.
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<PushOutcome>;
}

/// Production client: one VAPID keypair, one pooled HTTP client.
pub struct WebPushClient {
    http: reqwest::Client,
    private_key_b64: String,
    subject: String,
}

impl WebPushClient {
    /// `subject` is the VAPID `sub` claim, a `mailto:` or `https:` URI
    /// identifying the operator to the push service.
    pub fn new(keys: &VapidKeys, subject: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            private_key_b64: keys.private_key_base64url().to_string(),
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl PushClient for WebPushClient {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<PushOutcome> {
        let sub_info = SubscriptionInfo::new(
            &subscription.endpoint,
            &subscription.p256dh,
            &subscription.auth,
        );

        let body = serde_json::to_vec(payload)?;

        let mut sig_builder = VapidSignatureBuilder::from_base64(&self.private_key_b64, &sub_info)
            .context("Failed to build VAPID signature")?;
        sig_builder.add_claim("sub", self.subject.as_str());
        let sig = sig_builder.build().context("Failed to sign VAPID JWT")?;

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, &body);
        builder.set_vapid_signature(sig);
        builder.set_ttl(86400); // 24 hours

        let message = builder.build().context("Failed to build web push message")?;

        let mut request = self
            .http
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(push_payload) = message.payload {
            request = request
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            for (key, value) in &push_payload.crypto_headers {
                request = request.header(*key, value.as_str());
            }

            request = request.body(push_payload.content);
        }

        let response = request
            .send()
            .await
            .context("Web push HTTP request failed")?;
        let status = response.status().as_u16();

        match status {
            200..=299 => {
                info!("Push notification sent");
                Ok(PushOutcome::Delivered)
            }
            410 => {
                info!("Subscription expired (410 Gone)");
                Ok(PushOutcome::Gone)
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow::anyhow!("Web push send failed (HTTP {status}): {body}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_camel_case_data() {
        let payload = PushPayload {
            title: "🌅 おはよう！".to_string(),
            body: "Aliceさんからおはようメッセージ！".to_string(),
            icon: "/icons/icon-192.png".to_string(),
            data: crate::PushData {
                message_type: "morning".to_string(),
                sender_id: "482913".to_string(),
                sender_name: "Alice".to_string(),
            },
        };

        let json: serde_json::Value =
            serde_json::from_slice(&serde_json::to_vec(&payload).unwrap()).unwrap();
        assert_eq!(json["data"]["messageType"], "morning");
        assert_eq!(json["data"]["senderId"], "482913");
        assert_eq!(json["data"]["senderName"], "Alice");
        assert_eq!(json["icon"], "/icons/icon-192.png");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_not_a_panic() {
        let keys = VapidKeys::generate();
        let client = WebPushClient::new(&keys, "mailto:example@example.com");

        let sub = PushSubscription {
            endpoint: "http://127.0.0.1:1/push".to_string(),
            p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7tkg".to_string(),
            auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
        };
        let payload = PushPayload {
            title: "t".to_string(),
            body: "b".to_string(),
            icon: "/icons/icon-192.png".to_string(),
            data: crate::PushData {
                message_type: "night".to_string(),
                sender_id: "117205".to_string(),
                sender_name: "Bob".to_string(),
            },
        };

        assert!(client.send(&sub, &payload).await.is_err());
    }
}
