//! Signed session cookies and OAuth state values.
//!
//! A session cookie carries `<user_id_hex>.<hmac_sha256_hex>`. The signature
//! covers the user id only; there is no server-side session table.

use hmac::{Hmac, Mac};
use rand::Rng;
use reunion_core::UserId;
use sha2::Sha256;

use crate::error::{AuthError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Name of the cookie holding the signed user id.
pub const SESSION_COOKIE_NAME: &str = "secondme_session";

/// Name of the cookie holding the pending OAuth state.
pub const OAUTH_STATE_COOKIE_NAME: &str = "secondme_oauth_state";

/// Lifetime of the session cookie: 30 days.
pub const SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 30;

/// Lifetime of the OAuth state cookie: 10 minutes.
pub const OAUTH_STATE_MAX_AGE_SECS: i64 = 60 * 10;

/// Secret used when none is configured. Only suitable for development.
pub const DEV_SESSION_SECRET: &str = "secondme-dev-secret-change-in-production";

/// Signs and verifies session cookie values.
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner").finish_non_exhaustive()
    }
}

impl SessionSigner {
    /// Create a signer from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the secret is empty.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(AuthError::Config("session secret is empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AuthError::Config(format!("session secret rejected: {e}")))?;
        Ok(Self { mac })
    }

    fn signature(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Produce the cookie value for `user_id`.
    #[must_use]
    pub fn sign(&self, user_id: &UserId) -> String {
        let payload = user_id.to_hex();
        let signature = self.signature(&payload);
        format!("{payload}.{signature}")
    }

    /// Verify a cookie value and return the user id it carries.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSession` if the value is malformed or the
    /// signature does not match.
    pub fn verify(&self, value: &str) -> Result<UserId> {
        let (payload, signature) = value.split_once('.').ok_or(AuthError::InvalidSession)?;
        if payload.is_empty() || signature.is_empty() {
            return Err(AuthError::InvalidSession);
        }

        let signature = hex::decode(signature).map_err(|_| AuthError::InvalidSession)?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSession)?;

        UserId::from_hex(payload).map_err(|_| AuthError::InvalidSession)
    }
}

/// Create a fresh OAuth state: 20 random bytes, hex encoded.
#[must_use]
pub fn create_oauth_state() -> String {
    let mut bytes = [0u8; 20];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let signer = SessionSigner::new("test-secret").unwrap();
        let user_id = UserId::from_provider("sm_42");

        let cookie = signer.sign(&user_id);
        assert!(cookie.starts_with(&user_id.to_hex()));
        assert_eq!(signer.verify(&cookie).unwrap(), user_id);
    }

    #[test]
    fn tampered_cookie_rejected() {
        let signer = SessionSigner::new("test-secret").unwrap();
        let cookie = signer.sign(&UserId::from_provider("sm_42"));
        let other = UserId::from_provider("sm_43").to_hex();
        let (_, signature) = cookie.split_once('.').unwrap();

        let forged = format!("{other}.{signature}");
        assert!(matches!(
            signer.verify(&forged),
            Err(AuthError::InvalidSession)
        ));
    }

    #[test]
    fn other_secret_rejected() {
        let a = SessionSigner::new("secret-a").unwrap();
        let b = SessionSigner::new("secret-b").unwrap();
        let cookie = a.sign(&UserId::from_provider("sm_42"));
        assert!(b.verify(&cookie).is_err());
    }

    #[test]
    fn malformed_values_rejected() {
        let signer = SessionSigner::new("test-secret").unwrap();
        for value in ["", "abc", ".", "abc.", ".abc", "abc.not-hex"] {
            assert!(signer.verify(value).is_err(), "accepted {value:?}");
        }
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(matches!(SessionSigner::new(""), Err(AuthError::Config(_))));
    }

    #[test]
    fn oauth_state_is_40_hex_chars() {
        let state = create_oauth_state();
        assert_eq!(state.len(), 40);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(state, create_oauth_state());
    }
}
