//! Identity provider abstraction and the parsing shared by implementations.
//!
//! Provider payloads use several spellings for the same field
//! (`access_token`/`accessToken`, `avatar`/`avatar_url`, ...). The helpers
//! here try each alias in order and treat anything else as absent.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

#[cfg(any(test, feature = "test-utils"))]
use crate::error::AuthError;

/// Access token lifetime assumed when the provider omits it.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 7200;

/// Credentials obtained by exchanging an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Bearer token for provider APIs.
    pub access_token: String,
    /// Refresh token, empty when the provider sent none.
    pub refresh_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    /// Provider-side user id, when the token response carried one.
    pub provider_user_id: Option<String>,
}

/// Profile fields extracted from a provider user-info payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderProfile {
    /// Provider-side user id.
    pub provider_user_id: Option<String>,
    /// Display name.
    pub nickname: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Long-term memory summary.
    pub soft_memory: Option<Value>,
}

impl ProviderProfile {
    /// Extract profile fields from a user-info response (wrapped in `data` or not).
    #[must_use]
    pub fn from_user_info(payload: &Value) -> Self {
        let Some(data) = unwrap_data(payload).as_object() else {
            return Self::default();
        };

        Self {
            provider_user_id: first_string(data, &["user_id", "userId", "id", "route", "email"]),
            nickname: first_string(data, &["nickname", "name"]),
            avatar_url: first_string(data, &["avatar", "avatar_url"]),
            soft_memory: first_present(data, &["softmemory", "soft_memory"]).cloned(),
        }
    }
}

/// Extract the persona tags from a shades response.
#[must_use]
pub fn shades_from_payload(payload: &Value) -> Option<Value> {
    unwrap_data(payload)
        .get("shades")
        .filter(|v| !v.is_null())
        .cloned()
}

/// Pick the provider user id for a login.
///
/// Prefers the token response, then the user-info payload, then an id
/// derived from the access token so a login never ends up anonymous.
#[must_use]
pub fn resolve_provider_user_id(grant: &TokenGrant, profile: &ProviderProfile) -> String {
    grant
        .provider_user_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| profile.provider_user_id.clone())
        .unwrap_or_else(|| {
            let digest = hex::encode(Sha256::digest(grant.access_token.as_bytes()));
            format!("token_{}", &digest[..24])
        })
}

/// Payload under `data` when present and non-null, otherwise the root.
pub(crate) fn unwrap_data(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(data) if !data.is_null() => data,
        _ => payload,
    }
}

/// First alias holding a non-empty string or a number, rendered as a string.
pub(crate) fn first_string(object: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First alias present with a non-null value.
pub(crate) fn first_present<'a>(object: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|key| object.get(*key).filter(|v| !v.is_null()))
}

/// Nonzero numeric business code carried by a provider response.
pub(crate) fn error_code(payload: &Value) -> Option<i64> {
    payload
        .get("code")
        .and_then(Value::as_i64)
        .filter(|code| *code != 0)
}

/// An OAuth identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The URL the browser is sent to for consent.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured authorize URL is invalid.
    fn authorize_url(&self, state: &str) -> Result<String>;

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if no token endpoint accepts the code.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    /// Fetch the raw user-info response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, HTTP failure or a nonzero code.
    async fn fetch_user_info(&self, access_token: &str) -> Result<Value>;

    /// Fetch the raw shades (persona tags) response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, HTTP failure or a nonzero code.
    async fn fetch_user_shades(&self, access_token: &str) -> Result<Value>;
}

/// In-memory provider for tests.
///
/// Any code exchanges to `token-<code>` for user `sm_<code>`, except the code
/// `bad`, which fails. Profile calls fail when `fail_profile` is set.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    /// Response returned by `fetch_user_info`.
    pub user_info: Value,
    /// Response returned by `fetch_user_shades`.
    pub shades: Value,
    /// Make both profile calls fail.
    pub fail_profile: bool,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self {
            user_info: serde_json::json!({
                "code": 0,
                "data": { "nickname": "测试用户", "avatar": "https://example.com/a.png" }
            }),
            shades: serde_json::json!({
                "code": 0,
                "data": { "shades": [{ "shadeName": "美食家" }] }
            }),
            fail_profile: false,
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorize_url(&self, state: &str) -> Result<String> {
        Ok(format!("https://mock.secondme.local/oauth?state={state}"))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        if code == "bad" {
            return Err(AuthError::TokenExchange("mock rejected code".to_string()));
        }
        Ok(TokenGrant {
            access_token: format!("token-{code}"),
            refresh_token: String::new(),
            expires_in: DEFAULT_EXPIRES_IN_SECS,
            provider_user_id: Some(format!("sm_{code}")),
        })
    }

    async fn fetch_user_info(&self, _access_token: &str) -> Result<Value> {
        if self.fail_profile {
            return Err(AuthError::Provider("mock user info unavailable".to_string()));
        }
        Ok(self.user_info.clone())
    }

    async fn fetch_user_shades(&self, _access_token: &str) -> Result<Value> {
        if self.fail_profile {
            return Err(AuthError::Provider("mock shades unavailable".to_string()));
        }
        Ok(self.shades.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_from_wrapped_payload() {
        let payload = json!({
            "code": 0,
            "data": {
                "name": "大侄子",
                "avatar_url": "https://example.com/x.png",
                "route": "nephew",
                "softmemory": ["爱吃饺子"]
            }
        });
        let profile = ProviderProfile::from_user_info(&payload);
        assert_eq!(profile.nickname.as_deref(), Some("大侄子"));
        assert_eq!(profile.avatar_url.as_deref(), Some("https://example.com/x.png"));
        assert_eq!(profile.provider_user_id.as_deref(), Some("nephew"));
        assert_eq!(profile.soft_memory, Some(json!(["爱吃饺子"])));
    }

    #[test]
    fn profile_aliases_prefer_first_non_empty() {
        let payload = json!({ "nickname": "", "name": "小红", "userId": 1024 });
        let profile = ProviderProfile::from_user_info(&payload);
        assert_eq!(profile.nickname.as_deref(), Some("小红"));
        assert_eq!(profile.provider_user_id.as_deref(), Some("1024"));
    }

    #[test]
    fn non_object_payload_yields_empty_profile() {
        assert_eq!(
            ProviderProfile::from_user_info(&json!("oops")),
            ProviderProfile::default()
        );
    }

    #[test]
    fn shades_extracted() {
        let payload = json!({ "code": 0, "data": { "shades": [1, 2] } });
        assert_eq!(shades_from_payload(&payload), Some(json!([1, 2])));
        assert_eq!(shades_from_payload(&json!({ "code": 0 })), None);
    }

    #[test]
    fn provider_user_id_resolution_order() {
        let mut grant = TokenGrant {
            access_token: "abc".to_string(),
            refresh_token: String::new(),
            expires_in: DEFAULT_EXPIRES_IN_SECS,
            provider_user_id: Some("from-token".to_string()),
        };
        let profile = ProviderProfile {
            provider_user_id: Some("from-info".to_string()),
            ..ProviderProfile::default()
        };

        assert_eq!(resolve_provider_user_id(&grant, &profile), "from-token");

        grant.provider_user_id = Some(String::new());
        assert_eq!(resolve_provider_user_id(&grant, &profile), "from-info");

        let fallback = resolve_provider_user_id(&grant, &ProviderProfile::default());
        assert!(fallback.starts_with("token_"));
        assert_eq!(fallback.len(), "token_".len() + 24);
        assert_eq!(
            fallback,
            resolve_provider_user_id(&grant, &ProviderProfile::default())
        );
    }

    #[test]
    fn error_code_detection() {
        assert_eq!(error_code(&json!({ "code": 0 })), None);
        assert_eq!(error_code(&json!({ "code": 40001 })), Some(40001));
        assert_eq!(error_code(&json!({ "code": "x" })), None);
    }

    #[tokio::test]
    async fn mock_provider_exchanges_codes() {
        let provider = MockIdentityProvider::default();
        let grant = provider.exchange_code("abc").await.unwrap();
        assert_eq!(grant.access_token, "token-abc");
        assert_eq!(grant.provider_user_id.as_deref(), Some("sm_abc"));
        assert!(provider.exchange_code("bad").await.is_err());
    }
}
