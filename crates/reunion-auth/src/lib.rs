//! SecondMe OAuth and session cookies for reunion.
//!
//! This crate provides:
//!
//! - the [`IdentityProvider`] trait and its SecondMe implementation
//!   ([`SecondMeClient`]): authorize URL, code exchange, profile fetches
//! - [`SessionSigner`] for HMAC-signed session cookies
//! - OAuth state generation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│ IdentityProvider │
//! │   (HTTP)         │     │   (trait)        │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │                        │
//!          │               ┌────────▼─────────┐
//!          │               │  SecondMeClient  │
//!          │               └────────┬─────────┘
//!          │                        │ HTTPS
//! ┌────────▼─────────┐     ┌────────▼─────────┐
//! │  SessionSigner   │     │   SecondMe API   │
//! │  (cookie HMAC)   │     │                  │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use reunion_auth::{create_oauth_state, AuthConfig, IdentityProvider, SecondMeClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SecondMeClient::new(AuthConfig::default());
//!
//! let state = create_oauth_state();
//! println!("redirect to {}", client.authorize_url(&state)?);
//!
//! // Later, in the callback:
//! let grant = client.exchange_code("code-from-callback").await?;
//! let info = client.fetch_user_info(&grant.access_token).await?;
//! println!("{info}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod provider;
pub mod session;

pub use client::{parse_token_response, SecondMeClient};
pub use error::{AuthError, Result};
pub use provider::{
    resolve_provider_user_id, shades_from_payload, IdentityProvider, ProviderProfile, TokenGrant,
};
pub use session::{
    create_oauth_state, SessionSigner, DEV_SESSION_SECRET, OAUTH_STATE_COOKIE_NAME,
    OAUTH_STATE_MAX_AGE_SECS, SESSION_COOKIE_NAME, SESSION_MAX_AGE_SECS,
};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockIdentityProvider;

/// Path of the documented token endpoint.
const OFFICIAL_TOKEN_PATH: &str = "/api/oauth/token/code";

/// Legacy token path that some deployments are still configured with.
const LEGACY_TOKEN_SUFFIX: &str = "/api/oauth/token";

/// Configuration for the SecondMe OAuth client.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the SecondMe API.
    pub api_base_url: String,
    /// Authorize page the browser is redirected to.
    pub oauth_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    /// Comma-separated scopes.
    pub scopes: String,
    /// Token endpoint tried before the official one.
    pub token_endpoint: Option<String>,
    /// Timeout for provider requests, in seconds.
    pub request_timeout_secs: u64,
}

impl AuthConfig {
    /// Join `path` onto the API base URL.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        join_url(&self.api_base_url, path)
    }

    /// Scopes as sent to the provider: comma list turned space separated.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Token endpoints in the order they are tried.
    ///
    /// A configured endpoint comes first. If it uses the legacy
    /// `/api/oauth/token` path its `/code` variant follows. The official
    /// endpoint is always last unless already listed.
    #[must_use]
    pub fn token_endpoints(&self) -> Vec<String> {
        let official = self.api_url(OFFICIAL_TOKEN_PATH);
        let Some(configured) = self
            .token_endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
        else {
            return vec![official];
        };

        let mut endpoints = vec![configured.to_string()];
        if configured.ends_with(LEGACY_TOKEN_SUFFIX) {
            endpoints.push(format!("{configured}/code"));
        }
        if !endpoints.contains(&official) {
            endpoints.push(official);
        }
        endpoints
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8787".to_string(),
            oauth_url: "http://localhost:8787/oauth".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3000/api/auth/callback".to_string(),
            scopes: "user.info".to_string(),
            token_endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

/// Join a base URL and a path with exactly one slash between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
