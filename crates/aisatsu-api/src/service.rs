use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use aisatsu_db::{PairOutcome, Store, UserRow};
use aisatsu_push::{PushClient, PushData, PushPayload, PushSubscription};
use aisatsu_types::api::{
    HistoryEntry, HistoryResponse, PairResponse, RegisteredUser, SendResponse, SubscribeResponse,
    SubscriptionPayload, UserResponse,
};
use aisatsu_types::models::{MessageType, User};

use crate::error::ApiError;

/// Attempts at drawing a free 6-digit id before giving up. The id space has
/// 900,000 values, so hitting this bound means the space is effectively full.
const MAX_ID_ATTEMPTS: u32 = 16;

/// Default and maximum history page size.
pub const HISTORY_LIMIT: u32 = 20;

/// Orchestrates identity, pairing, subscriptions, push dispatch and the
/// audit log. The only component holding business logic; everything beneath
/// it is a capability behind a trait.
pub struct GreetingService {
    store: Arc<dyn Store>,
    push: Arc<dyn PushClient>,
}

impl GreetingService {
    pub fn new(store: Arc<dyn Store>, push: Arc<dyn PushClient>) -> Self {
        Self { store, push }
    }

    /// Run blocking store work off the async runtime. `public` is the
    /// generic message the client sees if storage fails.
    async fn with_store<T, F>(&self, public: &'static str, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> anyhow::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| {
                ApiError::internal(public, anyhow::anyhow!("spawn_blocking join error: {e}"))
            })?
            .map_err(|e| ApiError::internal(public, e))
    }

    /// Register a new user under a random free 6-digit id.
    pub async fn register(&self, name: Option<String>) -> Result<RegisteredUser, ApiError> {
        let name = name.map(|n| n.trim().to_string()).unwrap_or_default();
        if name.is_empty() {
            return Err(ApiError::EmptyName);
        }

        // Candidate generation and the uniqueness check are one atomic unit:
        // the store's primary key arbitrates, we just retry on collision.
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_user_id();
            let n = name.clone();
            let inserted = self
                .with_store("登録に失敗しました", move |store| {
                    store.try_insert_user(&id, &n).map(|ok| ok.then_some(id))
                })
                .await?;

            if let Some(id) = inserted {
                info!("Registered user {id}");
                return Ok(RegisteredUser { id, name });
            }
        }

        Err(ApiError::IdSpaceExhausted)
    }

    /// A user's own record plus their current partner, if any.
    pub async fn user_with_partner(&self, id: &str) -> Result<UserResponse, ApiError> {
        let id = id.to_string();
        let (user, partner) = self
            .with_store("ユーザー情報の取得に失敗しました", move |store| {
                let user = store.get_user(&id)?;
                let partner = store.get_partner(&id)?;
                Ok((user, partner))
            })
            .await?;

        let user = user.ok_or(ApiError::UserNotFound)?;
        Ok(UserResponse {
            user: to_user(user),
            partner: partner.map(to_user),
        })
    }

    /// Create (or re-confirm) the symmetric pairing. An unknown partner id
    /// is reported inside the response body, matching the registry contract.
    pub async fn pair(
        &self,
        user_id: Option<String>,
        partner_id: Option<String>,
    ) -> Result<PairResponse, ApiError> {
        let user_id = user_id.filter(|s| !s.is_empty()).ok_or(ApiError::MissingIds)?;
        let partner_id = partner_id.filter(|s| !s.is_empty()).ok_or(ApiError::MissingIds)?;
        if user_id == partner_id {
            return Err(ApiError::SelfPair);
        }

        self.with_store("ペアリングに失敗しました", move |store| {
            let Some(partner) = store.get_user(&partner_id)? else {
                return Ok(PairResponse {
                    success: false,
                    message: None,
                    partner: None,
                    error: Some("相手のIDが見つかりません".to_string()),
                });
            };

            let outcome = store.link_partners(&user_id, &partner_id)?;
            let message = match outcome {
                PairOutcome::Created => "ペアリングしました",
                PairOutcome::AlreadyPaired => "既にペアリング済みです",
            };

            Ok(PairResponse {
                success: true,
                message: Some(message.to_string()),
                partner: Some(to_user(partner)),
                error: None,
            })
        })
        .await
    }

    /// Persist a browser push subscription, replacing any previous one.
    pub async fn subscribe(
        &self,
        user_id: Option<String>,
        subscription: Option<serde_json::Value>,
    ) -> Result<SubscribeResponse, ApiError> {
        let user_id = user_id.filter(|s| !s.is_empty()).ok_or(ApiError::MissingData)?;
        let subscription: SubscriptionPayload = subscription
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or(ApiError::MissingData)?;

        self.with_store("通知の設定に失敗しました", move |store| {
            store.upsert_subscription(
                &user_id,
                &subscription.endpoint,
                &subscription.keys.p256dh,
                &subscription.keys.auth,
            )
        })
        .await?;

        Ok(SubscribeResponse {
            success: true,
            message: "通知を有効にしました".to_string(),
        })
    }

    /// Send a greeting to the caller's partner.
    ///
    /// Push delivery is a single best-effort attempt; once the sender,
    /// partner, subscription and message type have all resolved, the audit
    /// log entry is written whether or not the push went through — "sent"
    /// means routed, not delivered.
    pub async fn send(
        &self,
        user_id: Option<String>,
        message_type: Option<String>,
    ) -> Result<SendResponse, ApiError> {
        let user_id = user_id.filter(|s| !s.is_empty()).ok_or(ApiError::MissingData)?;
        let message_type = message_type.filter(|s| !s.is_empty()).ok_or(ApiError::MissingData)?;

        let uid = user_id.clone();
        let (sender, partner, subscription) = self
            .with_store("メッセージの送信に失敗しました", move |store| {
                let Some(sender) = store.get_user(&uid)? else {
                    return Ok((None, None, None));
                };
                let Some(partner) = store.get_partner(&uid)? else {
                    return Ok((Some(sender), None, None));
                };
                let subscription = store.get_subscription(&partner.id)?;
                Ok((Some(sender), Some(partner), subscription))
            })
            .await?;

        let sender = sender.ok_or(ApiError::UserNotFound)?;
        let partner = partner.ok_or(ApiError::NotPaired)?;
        let subscription = subscription.ok_or(ApiError::PartnerNotSubscribed)?;

        let message_type: MessageType = message_type
            .parse()
            .map_err(|_| ApiError::InvalidMessageType)?;
        let greeting = message_type.template(&sender.name);

        let payload = PushPayload {
            title: greeting.title.clone(),
            body: greeting.body.clone(),
            icon: "/icons/icon-192.png".to_string(),
            data: PushData {
                message_type: message_type.as_str().to_string(),
                sender_id: sender.id.clone(),
                sender_name: sender.name.clone(),
            },
        };
        let push_sub = PushSubscription {
            endpoint: subscription.endpoint,
            p256dh: subscription.p256dh,
            auth: subscription.auth,
        };

        // Fire-and-forget: a failed push never fails the request.
        if let Err(e) = self.push.send(&push_sub, &payload).await {
            warn!("Push notification failed: {e:#}");
        }

        let sid = sender.id.clone();
        let rid = partner.id.clone();
        self.with_store("メッセージの送信に失敗しました", move |store| {
            store.append_message(&sid, &rid, message_type.as_str())
        })
        .await?;

        Ok(SendResponse {
            success: true,
            message: "メッセージを送信しました！".to_string(),
            greeting: greeting.greeting,
            partner_name: partner.name,
        })
    }

    /// Most recent greetings received by `user_id`, newest first.
    pub async fn history(&self, user_id: &str) -> Result<HistoryResponse, ApiError> {
        let user_id = user_id.to_string();
        let rows = self
            .with_store("履歴の取得に失敗しました", move |store| {
                store.received_messages(&user_id, HISTORY_LIMIT)
            })
            .await?;

        let messages = rows
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.id,
                // A sender missing from the identity store shows as the raw id
                sender_name: row.sender_name.unwrap_or_else(|| row.sender_id.clone()),
                message_type: row.message_type,
                created_at: row.created_at,
            })
            .collect();

        Ok(HistoryResponse {
            success: true,
            messages,
        })
    }
}

fn generate_user_id() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}

fn to_user(row: UserRow) -> User {
    User {
        id: row.id,
        name: row.name,
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use aisatsu_db::MemoryStore;
    use aisatsu_push::PushOutcome;

    /// Records every dispatch; optionally fails each attempt.
    struct FakePush {
        fail: bool,
        sent: Mutex<Vec<PushPayload>>,
    }

    impl FakePush {
        fn ok() -> Self {
            Self { fail: false, sent: Mutex::new(vec![]) }
        }

        fn failing() -> Self {
            Self { fail: true, sent: Mutex::new(vec![]) }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PushClient for FakePush {
        async fn send(
            &self,
            _subscription: &PushSubscription,
            payload: &PushPayload,
        ) -> anyhow::Result<PushOutcome> {
            self.sent.lock().unwrap().push(payload.clone());
            if self.fail {
                anyhow::bail!("push service unreachable")
            }
            Ok(PushOutcome::Delivered)
        }
    }

    fn service_with(push: Arc<FakePush>) -> GreetingService {
        GreetingService::new(Arc::new(MemoryStore::new()), push)
    }

    fn subscription_json() -> serde_json::Value {
        serde_json::json!({
            "endpoint": "https://push.example.com/abc",
            "keys": { "p256dh": "key-material", "auth": "auth-secret" }
        })
    }

    #[tokio::test]
    async fn register_assigns_distinct_six_digit_ids() {
        let svc = service_with(Arc::new(FakePush::ok()));

        let a = svc.register(Some("Alice".into())).await.unwrap();
        let b = svc.register(Some("Bob".into())).await.unwrap();

        assert_ne!(a.id, b.id);
        for id in [&a.id, &b.id] {
            assert_eq!(id.len(), 6);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
        }

        // Stable across lookups
        let looked_up = svc.user_with_partner(&a.id).await.unwrap();
        assert_eq!(looked_up.user.id, a.id);
        assert_eq!(looked_up.user.name, "Alice");
        assert!(looked_up.partner.is_none());
    }

    #[tokio::test]
    async fn register_rejects_blank_names() {
        let svc = service_with(Arc::new(FakePush::ok()));
        assert!(matches!(svc.register(None).await, Err(ApiError::EmptyName)));
        assert!(matches!(svc.register(Some("   ".into())).await, Err(ApiError::EmptyName)));
    }

    #[tokio::test]
    async fn pairing_is_symmetric_and_idempotent() {
        let svc = service_with(Arc::new(FakePush::ok()));
        let a = svc.register(Some("Alice".into())).await.unwrap();
        let b = svc.register(Some("Bob".into())).await.unwrap();

        let first = svc.pair(Some(a.id.clone()), Some(b.id.clone())).await.unwrap();
        assert!(first.success);
        assert_eq!(first.message.as_deref(), Some("ペアリングしました"));
        assert_eq!(first.partner.as_ref().unwrap().name, "Bob");

        // Both directions resolve
        assert_eq!(svc.user_with_partner(&a.id).await.unwrap().partner.unwrap().id, b.id);
        assert_eq!(svc.user_with_partner(&b.id).await.unwrap().partner.unwrap().id, a.id);

        // Second call: idempotent success
        let again = svc.pair(Some(a.id.clone()), Some(b.id.clone())).await.unwrap();
        assert!(again.success);
        assert_eq!(again.message.as_deref(), Some("既にペアリング済みです"));
    }

    #[tokio::test]
    async fn self_pair_is_rejected_before_storage() {
        let svc = service_with(Arc::new(FakePush::ok()));
        let a = svc.register(Some("Alice".into())).await.unwrap();

        let err = svc.pair(Some(a.id.clone()), Some(a.id.clone())).await.unwrap_err();
        assert!(matches!(err, ApiError::SelfPair));

        let err = svc.pair(None, Some(a.id.clone())).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingIds));
    }

    #[tokio::test]
    async fn unknown_partner_is_a_soft_failure() {
        let svc = service_with(Arc::new(FakePush::ok()));
        let a = svc.register(Some("Alice".into())).await.unwrap();

        let res = svc.pair(Some(a.id), Some("000000".into())).await.unwrap();
        assert!(!res.success);
        assert_eq!(res.error.as_deref(), Some("相手のIDが見つかりません"));
        assert!(res.partner.is_none());
    }

    #[tokio::test]
    async fn send_without_subscription_writes_no_log_entry() {
        let push = Arc::new(FakePush::ok());
        let svc = service_with(push.clone());
        let a = svc.register(Some("Alice".into())).await.unwrap();
        let b = svc.register(Some("Bob".into())).await.unwrap();
        svc.pair(Some(a.id.clone()), Some(b.id.clone())).await.unwrap();

        let err = svc.send(Some(a.id.clone()), Some("morning".into())).await.unwrap_err();
        assert!(matches!(err, ApiError::PartnerNotSubscribed));
        assert_eq!(push.sent_count(), 0);
        assert!(svc.history(&b.id).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn send_logs_exactly_once_even_when_push_fails() {
        let push = Arc::new(FakePush::failing());
        let svc = service_with(push.clone());
        let a = svc.register(Some("Alice".into())).await.unwrap();
        let b = svc.register(Some("Bob".into())).await.unwrap();
        svc.pair(Some(a.id.clone()), Some(b.id.clone())).await.unwrap();
        svc.subscribe(Some(b.id.clone()), Some(subscription_json())).await.unwrap();

        let res = svc.send(Some(a.id.clone()), Some("night".into())).await.unwrap();
        assert!(res.success);
        assert_eq!(res.greeting, "おやすみなさい！良い夢を！");
        assert_eq!(res.partner_name, "Bob");

        // Push was attempted once and failed, yet the audit trail has the entry
        assert_eq!(push.sent_count(), 1);
        let history = svc.history(&b.id).await.unwrap();
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].sender_name, "Alice");
        assert_eq!(history.messages[0].message_type, "night");
    }

    #[tokio::test]
    async fn send_rejects_unknown_message_types_without_logging() {
        let svc = service_with(Arc::new(FakePush::ok()));
        let a = svc.register(Some("Alice".into())).await.unwrap();
        let b = svc.register(Some("Bob".into())).await.unwrap();
        svc.pair(Some(a.id.clone()), Some(b.id.clone())).await.unwrap();
        svc.subscribe(Some(b.id.clone()), Some(subscription_json())).await.unwrap();

        let err = svc.send(Some(a.id.clone()), Some("evening".into())).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidMessageType));
        assert!(svc.history(&b.id).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn send_from_unknown_or_unpaired_user_fails() {
        let svc = service_with(Arc::new(FakePush::ok()));
        let a = svc.register(Some("Alice".into())).await.unwrap();

        let err = svc.send(Some("999999".into()), Some("morning".into())).await.unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));

        let err = svc.send(Some(a.id), Some("morning".into())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotPaired));
    }

    #[tokio::test]
    async fn history_is_capped_and_newest_first() {
        let svc = service_with(Arc::new(FakePush::ok()));
        let a = svc.register(Some("Alice".into())).await.unwrap();
        let b = svc.register(Some("Bob".into())).await.unwrap();
        svc.pair(Some(a.id.clone()), Some(b.id.clone())).await.unwrap();
        svc.subscribe(Some(b.id.clone()), Some(subscription_json())).await.unwrap();

        for _ in 0..HISTORY_LIMIT + 5 {
            svc.send(Some(a.id.clone()), Some("morning".into())).await.unwrap();
        }
        svc.send(Some(a.id.clone()), Some("night".into())).await.unwrap();

        let history = svc.history(&b.id).await.unwrap();
        assert_eq!(history.messages.len(), HISTORY_LIMIT as usize);
        assert_eq!(history.messages[0].message_type, "night");
        assert!(history.messages.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn full_scenario_register_pair_subscribe_send_history() {
        let push = Arc::new(FakePush::ok());
        let svc = service_with(push.clone());

        let alice = svc.register(Some("Alice".into())).await.unwrap();
        let bob = svc.register(Some("Bob".into())).await.unwrap();

        let paired = svc.pair(Some(alice.id.clone()), Some(bob.id.clone())).await.unwrap();
        assert_eq!(paired.partner.unwrap().name, "Bob");

        svc.subscribe(Some(bob.id.clone()), Some(subscription_json())).await.unwrap();

        let sent = svc.send(Some(alice.id.clone()), Some("morning".into())).await.unwrap();
        assert!(sent.success);
        assert_eq!(sent.greeting, "おはようございます！良い一日を！");
        assert_eq!(sent.partner_name, "Bob");
        assert_eq!(push.sent_count(), 1);

        let history = svc.history(&bob.id).await.unwrap();
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].sender_name, "Alice");
        assert_eq!(history.messages[0].message_type, "morning");
    }
}
