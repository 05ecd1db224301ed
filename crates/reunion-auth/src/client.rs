//! SecondMe OAuth client.
//!
//! Implements [`IdentityProvider`] against the SecondMe HTTP API: the
//! authorization-code exchange and the user info and shades endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{AuthError, Result};
use crate::provider::{
    error_code, first_present, first_string, unwrap_data, IdentityProvider, TokenGrant,
    DEFAULT_EXPIRES_IN_SECS,
};
use crate::AuthConfig;

/// Client for the SecondMe OAuth and profile API.
pub struct SecondMeClient {
    config: AuthConfig,
    client: reqwest::Client,
}

impl SecondMeClient {
    /// Create a new client with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to create HTTP client");

        Self { config, client }
    }

    /// The configuration this client was built with.
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn post_token(&self, endpoint: &str, code: &str) -> Result<Value> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("request failed: {e} ({endpoint})")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::TokenExchange(format!(
                "token endpoint failed: {} ({endpoint})",
                status.as_u16()
            )));
        }

        // An unreadable success body is treated as empty and fails below.
        Ok(response
            .json::<Value>()
            .await
            .unwrap_or_else(|_| Value::Object(Map::new())))
    }

    async fn get_profile(&self, url: &str, access_token: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid response: {e}")))?;

        if !status.is_success() {
            return Err(AuthError::Provider(format!(
                "SecondMe API failed: {}",
                status.as_u16()
            )));
        }
        if let Some(code) = error_code(&body) {
            return Err(AuthError::Provider(format!("SecondMe API error code: {code}")));
        }

        Ok(body)
    }
}

/// Build a [`TokenGrant`] from a token endpoint response.
///
/// # Errors
///
/// Returns an error for a nonzero business code or a missing access token.
pub fn parse_token_response(body: &Value, endpoint: &str) -> Result<TokenGrant> {
    if let Some(code) = error_code(body) {
        return Err(AuthError::TokenExchange(format!(
            "token endpoint error code: {code} ({endpoint})"
        )));
    }

    let Some(payload) = unwrap_data(body).as_object() else {
        return Err(AuthError::MissingAccessToken);
    };

    let access_token = first_string(payload, &["access_token", "accessToken"])
        .ok_or(AuthError::MissingAccessToken)?;
    let refresh_token = first_string(payload, &["refresh_token", "refreshToken"]).unwrap_or_default();
    let expires_in = first_present(payload, &["expires_in", "expiresIn"])
        .and_then(parse_seconds)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let provider_user_id = first_string(payload, &["user_id", "userId", "sub"]);

    Ok(TokenGrant {
        access_token,
        refresh_token,
        expires_in,
        provider_user_id,
    })
}

/// Positive whole seconds from an integer or numeric string.
fn parse_seconds(value: &Value) -> Option<u64> {
    let seconds = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (seconds > 0).then_some(seconds)
}

#[async_trait]
impl IdentityProvider for SecondMeClient {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.config.oauth_url)
            .map_err(|e| AuthError::Config(format!("invalid oauth url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scope())
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let mut last_error = AuthError::TokenExchange("token endpoint request failed".to_string());

        for endpoint in self.config.token_endpoints() {
            match self.post_token(&endpoint, code).await {
                Ok(body) => {
                    tracing::debug!(%endpoint, "token endpoint accepted code");
                    return parse_token_response(&body, &endpoint);
                }
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "token endpoint failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<Value> {
        self.get_profile(&self.config.api_url("/api/secondme/user/info"), access_token)
            .await
    }

    async fn fetch_user_shades(&self, access_token: &str) -> Result<Value> {
        self.get_profile(&self.config.api_url("/api/secondme/user/shades"), access_token)
            .await
    }
}
