//! Domain types stored in the database.
//!
//! Enum variants serialize in upper case (`ACTIVE`, `REVOKED`, ...) so the
//! same values can be handed to API clients unchanged.

use chrono::{DateTime, Utc};
use reunion_core::{AgentProfileId, BindingId, MessageId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// A platform user, created or refreshed on every OAuth login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Platform identifier, derived from `provider_user_id`.
    pub user_id: UserId,
    /// Identifier reported by the OAuth provider.
    pub provider_user_id: String,
    /// Display name.
    pub nickname: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// Cached persona tags from the provider.
    #[serde(default)]
    pub shades: Option<serde_json::Value>,
    /// Cached long-term memory summary from the provider.
    #[serde(default)]
    pub soft_memory: Option<serde_json::Value>,
    /// Delegated credential used when this user's agent speaks.
    pub access_token: String,
    /// Refresh credential, stored but never exercised.
    pub refresh_token: String,
    /// Expiry of `access_token`.
    pub token_expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Whether a profile owner still consents to their agent being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    /// Bindings of this profile may be used.
    Active,
    /// The profile has been withdrawn.
    Revoked,
}

/// Who can see a profile in the public directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Listed in the public directory.
    Public,
    /// Hidden from the directory.
    Private,
}

/// A user's opt-in to let their credential play personas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Profile identifier, derived from the owner.
    pub agent_profile_id: AgentProfileId,
    /// Owning user.
    pub owner_user_id: UserId,
    /// Consent state.
    pub consent_status: ConsentStatus,
    /// Directory visibility.
    pub visibility: Visibility,
    /// Name shown in the directory instead of the owner's nickname.
    pub display_alias: Option<String>,
    /// When consent was withdrawn.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AgentProfile {
    /// Whether the profile's bindings may be used.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.consent_status == ConsentStatus::Active
    }
}

/// Weighted assignment of an agent profile to a persona key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Binding identifier, derived from `(role_key, agent_profile_id)`.
    pub binding_id: BindingId,
    /// Persona key.
    pub role_key: String,
    /// Bound profile.
    pub agent_profile_id: AgentProfileId,
    /// Whether the binding takes part in selection.
    pub enabled: bool,
    /// Relative selection weight, at least 1.
    pub weight: u32,
    /// Admin who last wrote the binding.
    pub created_by: Option<UserId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// The session accepts messages.
    Active,
    /// The session has finished.
    Closed,
}

/// A chat session owned by one viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Session identifier.
    pub session_id: SessionId,
    /// The viewer who created the session.
    pub viewer_user_id: UserId,
    /// First persona of the session.
    pub role_key: String,
    /// Scenario key.
    pub scenario_key: String,
    /// Agent profile that plays `role_key`.
    pub agent_profile_id: AgentProfileId,
    /// Current status.
    pub status: SessionStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSender {
    /// The viewer.
    User,
    /// A persona.
    Agent,
}

/// One line of a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identifier.
    pub message_id: MessageId,
    /// Owning session.
    pub session_id: SessionId,
    /// Author.
    pub sender: MessageSender,
    /// Masked content.
    pub content: String,
    /// Whether the content went through the masking filter.
    pub masked: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
