use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use aisatsu_api::{AppState, GreetingService, handlers};
use aisatsu_db::{MemoryStore, SqliteStore, Store};
use aisatsu_push::{VapidKeys, WebPushClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aisatsu=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("AISATSU_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("AISATSU_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let store_kind = std::env::var("AISATSU_STORE").unwrap_or_else(|_| "sqlite".into());
    let db_path = std::env::var("AISATSU_DB_PATH").unwrap_or_else(|_| "aisatsu.db".into());
    let vapid_path = std::env::var("AISATSU_VAPID_PATH").unwrap_or_else(|_| "vapid-keys.json".into());
    let vapid_subject =
        std::env::var("AISATSU_VAPID_SUBJECT").unwrap_or_else(|_| "mailto:example@example.com".into());
    let static_dir = std::env::var("AISATSU_STATIC_DIR").unwrap_or_else(|_| "public".into());

    // Storage backend, chosen once at startup
    let store: Arc<dyn Store> = match store_kind.as_str() {
        "sqlite" => Arc::new(SqliteStore::open(&PathBuf::from(&db_path))?),
        "memory" => {
            info!("Using in-memory store; state is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
        other => anyhow::bail!("unknown AISATSU_STORE: {other} (expected sqlite or memory)"),
    };

    // VAPID keypair persists across restarts; a fresh one would invalidate
    // every subscription browsers already hold.
    let vapid_keys = VapidKeys::load_or_generate(&PathBuf::from(&vapid_path))?;
    let push = Arc::new(WebPushClient::new(&vapid_keys, vapid_subject));

    let state = AppState {
        service: Arc::new(GreetingService::new(store, push)),
        vapid_public_key: vapid_keys.public_key_base64url().to_string(),
    };

    // Routes; unknown paths fall back to the PWA shell
    let static_service = ServeDir::new(&static_dir)
        .not_found_service(ServeFile::new(PathBuf::from(&static_dir).join("index.html")));

    let app = Router::new()
        .route("/api/vapid-public-key", get(handlers::vapid_public_key))
        .route("/api/register", post(handlers::register))
        .route("/api/user/{id}", get(handlers::get_user))
        .route("/api/pair", post(handlers::pair))
        .route("/api/subscribe", post(handlers::subscribe))
        .route("/api/send", post(handlers::send))
        .route("/api/history/{user_id}", get(handlers::history))
        .with_state(state)
        .fallback_service(static_service)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Aisatsu server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
