pub mod error;
pub mod handlers;
pub mod service;

pub use error::ApiError;
pub use service::GreetingService;

use std::sync::Arc;

/// Shared request-handler state: the orchestration service plus the VAPID
/// public key browsers need to create subscriptions.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GreetingService>,
    pub vapid_public_key: String,
}
