//! Error types for the control plane.
//!
//! This module defines all errors that can occur while resolving agents,
//! running dialogues and managing chat sessions.

use reunion_core::{AgentProfileId, SessionId, UserId};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The session does not exist or belongs to another viewer.
    #[error("会话不存在")]
    SessionNotFound(SessionId),

    /// The agent profile does not exist or has been revoked.
    #[error("Agent 不可用或已撤销")]
    AgentProfileNotFound(AgentProfileId),

    /// The user record is missing.
    #[error("用户不存在")]
    UserNotFound(UserId),

    /// No enabled binding with an active profile exists for a persona.
    #[error("角色 {0} 暂无可用 Agent")]
    NoAgentForRole(&'static str),

    /// The session's agent profile has withdrawn consent.
    #[error("该 Agent 已撤销授权，请更换角色")]
    AgentRevoked(AgentProfileId),

    /// The session is closed.
    #[error("会话已结束")]
    SessionClosed(SessionId),

    /// The message hit the blocklist.
    #[error("消息包含敏感内容，请换个说法")]
    Blocked {
        /// Blocked phrases found in the message.
        matched: Vec<&'static str>,
    },

    /// The request is malformed.
    #[error("{0}")]
    Validation(String),

    /// The upstream chat API failed.
    #[error("upstream chat failed: {0}")]
    Upstream(String),

    /// The event stream's receiver went away.
    #[error("stream receiver closed")]
    StreamClosed,

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] reunion_store::StoreError),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(#[from] reunion_auth::AuthError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reunion_core::CoreError> for ControlError {
    fn from(err: reunion_core::CoreError) -> Self {
        match err {
            reunion_core::CoreError::UnknownRole(_) => Self::Validation("无效角色".to_string()),
            reunion_core::CoreError::UnknownScenario(_) => Self::Validation("无效场景".to_string()),
            reunion_core::CoreError::InvalidId(e) => Self::Validation(e.to_string()),
        }
    }
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_)
            | Self::AgentProfileNotFound(_)
            | Self::UserNotFound(_)
            | Self::NoAgentForRole(_) => 404,
            Self::AgentRevoked(_)
            | Self::SessionClosed(_)
            | Self::Blocked { .. }
            | Self::Validation(_) => 400,
            Self::Auth(e) => e.http_status_code(),
            Self::Upstream(_) => 502,
            Self::StreamClosed | Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Envelope code for this error; matches the HTTP status except for the
    /// business-specific rejections.
    #[must_use]
    pub const fn api_code(&self) -> u16 {
        match self {
            Self::Blocked { .. } => 4001,
            Self::AgentRevoked(_) => 4002,
            _ => self.http_status_code(),
        }
    }
}
