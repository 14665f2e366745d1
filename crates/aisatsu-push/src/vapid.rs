//! VAPID key generation and persistence for Web Push (RFC 8292).
//!
//! The keypair is process-lifetime state: browsers bind their subscriptions
//! to the public key, so regenerating it invalidates every stored
//! subscription. The keys are therefore persisted to a JSON file and loaded
//! back on restart.

use std::path::Path;

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// VAPID keypair for web push authentication.
///
/// The private key is a P-256 ECDSA signing key stored as the raw 32-byte
/// scalar (base64url) — the exact format `VapidSignatureBuilder::from_base64`
/// expects. The public key is the uncompressed SEC1 point (65 bytes).
#[derive(Debug, Serialize, Deserialize)]
pub struct VapidKeys {
    /// Uncompressed public key bytes (base64url, 65 bytes decoded).
    #[serde(rename = "publicKey")]
    public_key_b64: String,
    /// Raw 32-byte P-256 private key scalar (base64url).
    #[serde(rename = "privateKey")]
    private_key_b64: String,
}

impl VapidKeys {
    /// Generate a fresh VAPID keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        // SEC1 uncompressed public key (65 bytes: 0x04 || x || y)
        let public_bytes = verifying_key.to_encoded_point(false);

        Self {
            public_key_b64: BASE64URL.encode(public_bytes.as_bytes()),
            private_key_b64: BASE64URL.encode(signing_key.to_bytes().as_slice()),
        }
    }

    /// Load the keypair from `path`, or generate one and persist it there.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read VAPID keys from {}", path.display()))?;
            let keys: Self =
                serde_json::from_str(&raw).context("VAPID key file is not valid JSON")?;
            keys.validate()?;
            info!("VAPID keys loaded from {}", path.display());
            Ok(keys)
        } else {
            let keys = Self::generate();
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
            std::fs::write(path, serde_json::to_string_pretty(&keys)?)
                .with_context(|| format!("Failed to persist VAPID keys to {}", path.display()))?;
            info!("VAPID keys generated and saved to {}", path.display());
            Ok(keys)
        }
    }

    /// Base64url-encoded uncompressed public key (65 bytes decoded).
    ///
    /// Sent to browsers as the VAPID `applicationServerKey`.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    /// Base64url-encoded raw 32-byte private key scalar.
    pub fn private_key_base64url(&self) -> &str {
        &self.private_key_b64
    }

    fn validate(&self) -> Result<()> {
        let pub_bytes = BASE64URL
            .decode(&self.public_key_b64)
            .context("Invalid base64url for VAPID public key")?;
        anyhow::ensure!(
            pub_bytes.len() == 65 && pub_bytes[0] == 0x04,
            "VAPID public key must be 65-byte uncompressed P-256 point"
        );

        let priv_bytes = BASE64URL
            .decode(&self.private_key_b64)
            .context("Invalid base64url for VAPID private key")?;
        anyhow::ensure!(
            priv_bytes.len() == 32,
            "VAPID private key must be 32-byte P-256 scalar, got {} bytes",
            priv_bytes.len()
        );
        SigningKey::from_bytes(priv_bytes.as_slice().into())
            .context("VAPID private key is not a valid P-256 scalar")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_expected_shapes() {
        let keys = VapidKeys::generate();

        let pub_bytes = BASE64URL
            .decode(keys.public_key_base64url())
            .expect("decode public key");
        assert_eq!(pub_bytes.len(), 65, "uncompressed P-256 public key is 65 bytes");
        assert_eq!(pub_bytes[0], 0x04, "uncompressed point starts with 0x04");

        let priv_bytes = BASE64URL
            .decode(keys.private_key_base64url())
            .expect("decode private key");
        assert_eq!(priv_bytes.len(), 32, "raw P-256 scalar is 32 bytes");
    }

    #[test]
    fn keys_work_with_web_push_from_base64() {
        use web_push::{SubscriptionInfo, VapidSignatureBuilder};

        let keys = VapidKeys::generate();
        let sub = SubscriptionInfo::new(
            "https://push.example.com/test",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "AAAAAAAAAAAAAAAAAAAAAA",
        );
        let builder = VapidSignatureBuilder::from_base64(keys.private_key_base64url(), &sub);
        assert!(builder.is_ok(), "from_base64 should accept our raw key scalar");
    }

    #[test]
    fn load_or_generate_round_trips_through_the_file() {
        let path = std::env::temp_dir().join(format!("aisatsu-vapid-test-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let generated = VapidKeys::load_or_generate(&path).expect("generate");
        let loaded = VapidKeys::load_or_generate(&path).expect("load");

        // Same keys on the second load — restarts must not rotate the keypair
        assert_eq!(generated.public_key_base64url(), loaded.public_key_base64url());
        assert_eq!(generated.private_key_base64url(), loaded.private_key_base64url());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_key_file_is_rejected() {
        let bad = serde_json::json!({
            "publicKey": "not-a-point",
            "privateKey": "not-a-scalar",
        });
        let keys: VapidKeys = serde_json::from_value(bad).expect("deserialize");
        assert!(keys.validate().is_err());
    }
}
