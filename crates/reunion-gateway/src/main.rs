//! Reunion Gateway - HTTP/SSE API server
//!
//! This is the main entry point for the gateway service. Configuration is
//! read from the environment.
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to use a mock identity provider that
//! signs in any `code` passed to `/api/auth/callback` without network access
//! to SecondMe.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "dev-mode")]
use reunion_auth::MockIdentityProvider;
use reunion_auth::{AuthConfig, SessionSigner, DEV_SESSION_SECRET};
#[cfg(not(feature = "dev-mode"))]
use reunion_auth::SecondMeClient;
use reunion_control::{
    ChatClientConfig, ControlConfig, ControlService, DialogueConfig, DriftDetector,
    HttpChatClient,
};
use reunion_gateway::config::split_list;
use reunion_gateway::{create_router, GatewayConfig, GatewayState};
use reunion_store::RocksStore;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_required(key: &str) -> Result<String, String> {
    env_opt(key).ok_or_else(|| format!("{key} must be set"))
}

fn env_flag(key: &str) -> bool {
    env_opt(key).is_some_and(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reunion=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Reunion Gateway");

    // Load configuration from environment
    let data_dir = env_or("DATA_DIR", "./data/reunion");
    let api_base_url = env_required("SECONDME_API_BASE_URL")?;

    let gateway_config = GatewayConfig {
        listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:3000"),
        cors_origins: split_list(&env_or("CORS_ORIGINS", "*"), ','),
        admin_user_ids: split_list(&env_or("ADMIN_USER_IDS", ""), ','),
        cookie_secure: env_flag("COOKIE_SECURE"),
        ..GatewayConfig::default()
    };

    let auth_config = AuthConfig {
        api_base_url: api_base_url.clone(),
        oauth_url: env_required("SECONDME_OAUTH_URL")?,
        client_id: env_required("SECONDME_CLIENT_ID")?,
        client_secret: env_required("SECONDME_CLIENT_SECRET")?,
        redirect_uri: env_required("SECONDME_REDIRECT_URI")?,
        scopes: env_or("SECONDME_SCOPES", "user.info"),
        token_endpoint: env_opt("SECONDME_TOKEN_ENDPOINT"),
        ..AuthConfig::default()
    };

    let chat_config = ChatClientConfig {
        api_base_url,
        chat_endpoint: env_opt("SECONDME_CHAT_ENDPOINT"),
        ..ChatClientConfig::default()
    };

    let drift = match env_opt("ROLE_DRIFT_PATTERNS") {
        Some(raw) => DriftDetector::new(split_list(&raw, ';'))?,
        None => DriftDetector::default(),
    };

    let mut control_config = ControlConfig {
        dialogue: DialogueConfig {
            drift,
            ..DialogueConfig::default()
        },
        ..ControlConfig::default()
    };
    if let Some(delay_ms) = env_opt("STAGE_CHUNK_DELAY_MS") {
        control_config.chunk_delay = Duration::from_millis(delay_ms.trim().parse()?);
    }

    let session_secret = env_opt("SESSION_SECRET").unwrap_or_else(|| {
        tracing::warn!("SESSION_SECRET not set - using the development secret");
        DEV_SESSION_SECRET.to_string()
    });

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        data_dir = %data_dir,
        api_base_url = %auth_config.api_base_url,
        admins = gateway_config.admin_user_ids.len(),
        drift_patterns = control_config.dialogue.drift.len(),
        chunk_delay_ms = control_config.chunk_delay.as_millis(),
        "Gateway configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&data_dir)?);

    let chat = Arc::new(HttpChatClient::new(&chat_config));
    let control = Arc::new(ControlService::new(store, chat, control_config));
    tracing::info!("Control plane initialized");

    #[cfg(feature = "dev-mode")]
    let provider = {
        tracing::warn!("DEV MODE ENABLED - using mock identity provider");
        Arc::new(MockIdentityProvider::default())
    };

    #[cfg(not(feature = "dev-mode"))]
    let provider = Arc::new(SecondMeClient::new(auth_config));

    let signer = SessionSigner::new(&session_secret)?;

    let listen_addr = gateway_config.listen_addr.clone();
    let state = GatewayState::new(control, provider, signer, gateway_config);
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
