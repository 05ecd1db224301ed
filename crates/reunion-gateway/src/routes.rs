//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use reunion_auth::IdentityProvider;
use reunion_control::ControlPlane;

use crate::handlers::{account, agents, auth, catalog, chat, health, stage};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /api/auth/login` - Redirect to SecondMe
/// - `GET /api/auth/callback` - OAuth callback
/// - `GET|POST /api/auth/logout` - Clear the session cookie
/// - `GET /api/catalog` - Personas and scenarios
///
/// ## Account (signed in)
/// - `GET /api/me` - Current user
/// - `GET /api/user/info` - Provider user info
/// - `GET /api/user/shades` - Provider persona tags
///
/// ## Agents (signed in, admin for writes)
/// - `GET /api/agents/public` - Public agent directory
/// - `POST /api/agents/revoke` - Revoke an agent
/// - `POST /api/roles/bind` - Bind an agent to a persona
/// - `GET /api/roles/bindings` - All bindings
///
/// ## Chat (signed in)
/// - `POST /api/chat/sessions` - Open a session
/// - `GET /api/chat/sessions/recent` - Most recent session
/// - `GET /api/chat/sessions/:id/messages` - Session history
/// - `POST /api/chat/messages` - Send a message
/// - `POST /api/chat/auto` - Non-streaming dialogue
/// - `POST /api/stage/live/stream` - Live stage (SSE, no request timeout)
pub fn create_router<C, P>(state: GatewayState<C, P>) -> Router
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    let api = Router::new()
        .route("/health", get(health::health))
        // Auth
        .route("/api/auth/login", get(auth::login::<C, P>))
        .route("/api/auth/callback", get(auth::callback::<C, P>))
        .route(
            "/api/auth/logout",
            get(auth::logout_redirect).post(auth::logout),
        )
        // Account
        .route("/api/me", get(account::me::<C, P>))
        .route("/api/user/info", get(account::user_info::<C, P>))
        .route("/api/user/shades", get(account::user_shades::<C, P>))
        // Catalog and agents
        .route("/api/catalog", get(catalog::catalog))
        .route("/api/agents/public", get(agents::list_public::<C, P>))
        .route("/api/agents/revoke", post(agents::revoke::<C, P>))
        .route("/api/roles/bind", post(agents::bind_role::<C, P>))
        .route("/api/roles/bindings", get(agents::list_bindings::<C, P>))
        // Chat
        .route("/api/chat/sessions", post(chat::create_session::<C, P>))
        .route(
            "/api/chat/sessions/recent",
            get(chat::recent_session::<C, P>),
        )
        .route(
            "/api/chat/sessions/:id/messages",
            get(chat::session_history::<C, P>),
        )
        .route("/api/chat/messages", post(chat::post_message::<C, P>))
        .route("/api/chat/auto", post(chat::auto_dialogue::<C, P>))
        .layer(TimeoutLayer::new(request_timeout));

    let streaming = Router::new().route(
        "/api/stage/live/stream",
        post(stage::live_stream::<C, P>),
    );

    api.merge(streaming)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(CookieManagerLayer::new()),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        // Cookies only travel cross-origin with credentials, which rules out
        // wildcard methods and headers.
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    }
}
