//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP/SSE gateway.

use std::time::Duration;

use reunion_core::UserId;
use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:3000").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds. Not applied to the live stage stream.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Platform user ids (hex) allowed to bind and revoke agents.
    /// Empty means every signed-in user is an admin.
    #[serde(default)]
    pub admin_user_ids: Vec<String>,

    /// Mark cookies `Secure`.
    #[serde(default)]
    pub cookie_secure: bool,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:3000".to_string()
    }

    const fn default_max_body() -> usize {
        64 * 1024
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Whether `user_id` may perform admin operations.
    #[must_use]
    pub fn is_admin(&self, user_id: &UserId) -> bool {
        if self.admin_user_ids.is_empty() {
            return true;
        }
        let hex = user_id.to_hex();
        self.admin_user_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(&hex))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            admin_user_ids: Vec::new(),
            cookie_secure: false,
        }
    }
}

/// Split a delimited environment value into trimmed, non-empty items.
#[must_use]
pub fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.max_body_bytes, 64 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert!(!config.cookie_secure);
    }

    #[test]
    fn empty_admin_list_admits_everyone() {
        let config = GatewayConfig::default();
        assert!(config.is_admin(&UserId::from_provider("anyone")));
    }

    #[test]
    fn admin_list_is_enforced() {
        let admin = UserId::from_provider("sm_admin");
        let config = GatewayConfig {
            admin_user_ids: vec![admin.to_hex().to_uppercase()],
            ..GatewayConfig::default()
        };
        assert!(config.is_admin(&admin));
        assert!(!config.is_admin(&UserId::from_provider("sm_guest")));
    }

    #[test]
    fn list_splitting() {
        assert_eq!(split_list(" a, b ,,c ", ','), vec!["a", "b", "c"]);
        assert_eq!(split_list("不想聊;换个话题", ';'), vec!["不想聊", "换个话题"]);
        assert!(split_list("", ',').is_empty());
    }
}
