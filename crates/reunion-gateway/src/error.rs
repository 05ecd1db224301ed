//! API error types and the response envelope.
//!
//! Every JSON response is wrapped as `{ code, message?, data }`. Successful
//! responses carry code 0; errors carry either the HTTP status or a
//! business code (4001 blocked, 4002 agent revoked, 5001/5002 profile fetch).

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use reunion_auth::AuthError;
use reunion_control::ControlError;

/// Response envelope shared by success and error responses.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// 0 on success, otherwise an error code.
    pub code: u16,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload, `null` on error.
    pub data: T,
}

/// Wrap `data` in a success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        code: 0,
        message: None,
        data,
    })
}

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid session cookie.
    #[error("未登录")]
    Unauthorized,

    /// The user is not an admin.
    #[error("无权限")]
    Forbidden,

    /// Invalid request body or parameters.
    #[error("{0}")]
    BadRequest(String),

    /// The requested resource was not found.
    #[error("{0}")]
    NotFound(String),

    /// The message hit the blocklist.
    #[error("消息包含敏感内容，请换个说法")]
    Blocked {
        /// Blocked phrases found in the message.
        matched: Vec<&'static str>,
    },

    /// The session's agent withdrew consent.
    #[error("{0}")]
    AgentRevoked(String),

    /// Fetching the provider profile failed.
    #[error("{message}")]
    ProfileFetch {
        /// 5001 for user info, 5002 for shades.
        code: u16,
        /// Message shown to the client.
        message: &'static str,
    },

    /// An upstream service rejected the request.
    #[error("上游服务异常")]
    Upstream(String),

    /// Internal server error; the detail is logged, not returned.
    #[error("服务器内部错误")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Blocked { .. } | Self::AgentRevoked(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::ProfileFetch { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the envelope code for this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Blocked { .. } => 4001,
            Self::AgentRevoked(_) => 4002,
            Self::ProfileFetch { code, .. } => *code,
            _ => self.status_code().as_u16(),
        }
    }

    fn data(&self) -> Value {
        match self {
            Self::Blocked { matched } => json!({ "safetyFlags": matched }),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Envelope {
            code: self.code(),
            message: Some(self.to_string()),
            data: self.data(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingSession | AuthError::InvalidSession => Self::Unauthorized,
            AuthError::TokenExchange(_) | AuthError::MissingAccessToken | AuthError::Provider(_) => {
                tracing::warn!(error = %err, "Provider request failed");
                Self::Upstream(err.to_string())
            }
            AuthError::Config(_) => {
                tracing::error!(error = %err, "Auth configuration error");
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::SessionNotFound(_)
            | ControlError::AgentProfileNotFound(_)
            | ControlError::UserNotFound(_)
            | ControlError::NoAgentForRole(_) => Self::NotFound(err.to_string()),
            ControlError::AgentRevoked(_) => Self::AgentRevoked(err.to_string()),
            ControlError::Blocked { matched } => Self::Blocked { matched },
            ControlError::SessionClosed(_) | ControlError::Validation(_) => {
                Self::BadRequest(err.to_string())
            }
            ControlError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Upstream chat error");
                Self::Upstream(msg)
            }
            ControlError::Auth(auth_err) => Self::from(auth_err),
            ControlError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
            ControlError::StreamClosed | ControlError::Internal(_) => {
                tracing::error!(error = %err, "Internal error");
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Rejected request body");
        Self::BadRequest("请求体格式错误".to_string())
    }
}
