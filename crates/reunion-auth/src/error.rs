//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No session cookie was presented.
    #[error("not logged in")]
    MissingSession,

    /// The session cookie is malformed or its signature does not match.
    #[error("invalid session")]
    InvalidSession,

    /// Every token endpoint rejected the authorization code.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The token response did not carry an access token.
    #[error("token response missing access token")]
    MissingAccessToken,

    /// A provider API call failed or returned a nonzero business code.
    #[error("provider request failed: {0}")]
    Provider(String),

    /// Configuration is unusable (bad URL, empty secret).
    #[error("invalid auth configuration: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::MissingSession | Self::InvalidSession => 401,
            Self::TokenExchange(_) | Self::MissingAccessToken | Self::Provider(_) => 502,
            Self::Config(_) => 500,
        }
    }
}
