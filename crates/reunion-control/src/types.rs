//! Request and response types for control plane operations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reunion_core::{AgentProfileId, BindingId, MessageId, SessionId, UserId};
use reunion_store::{
    AgentProfile, ChatMessage, ChatSession, ConsentStatus, MessageSender, RoleBinding,
    SessionStatus, User, Visibility,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::dialogue::{DialogueConfig, DialogueTurn};

/// Configuration for the control plane.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Round defaults and drift detection.
    pub dialogue: DialogueConfig,
    /// Characters per streamed chunk.
    pub chunk_size: usize,
    /// Pause after each streamed chunk.
    pub chunk_delay: Duration,
    /// Capacity of the per-stage event channel.
    pub event_buffer: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            dialogue: DialogueConfig::default(),
            chunk_size: 10,
            chunk_delay: Duration::from_millis(80),
            event_buffer: 64,
        }
    }
}

/// A persona key together with its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleView {
    /// Persona key.
    pub role_key: String,
    /// Display label.
    pub role_label: String,
}

impl RoleView {
    /// Build a view for a catalog key.
    #[must_use]
    pub fn for_key(role_key: &str) -> Self {
        Self {
            role_key: role_key.to_string(),
            role_label: reunion_core::role_label(role_key).to_string(),
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request to open a single-persona chat session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Persona to talk to.
    pub role_key: Option<String>,
    /// Scenario of the conversation.
    pub scenario_key: Option<String>,
}

/// Request to post a viewer message into a session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    /// Target session.
    pub session_id: Option<String>,
    /// Message text.
    pub content: Option<String>,
}

/// Request for a multi-persona dialogue, streamed or not.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueRequest {
    /// Personas taking part; duplicates and blanks are dropped.
    pub role_keys: Option<Vec<String>>,
    /// Scenario of the dinner.
    pub scenario_key: Option<String>,
    /// Number of turns; any JSON number is accepted and clamped to `[1, 20]`.
    ///
    /// Zero, like an absent or non-numeric value, selects the configured
    /// default rather than the lower bound.
    #[serde(default, deserialize_with = "lenient_number")]
    pub rounds: Option<f64>,
    /// Optional topic overriding the scenario label in the opening line.
    pub topic: Option<String>,
    /// Existing session to resume (live stage only).
    pub session_id: Option<String>,
}

impl DialogueRequest {
    /// Requested persona keys with blanks and duplicates removed, in order.
    #[must_use]
    pub fn distinct_role_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for key in self.role_keys.iter().flatten() {
            let key = key.trim();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }
}

/// Admin request to bind an agent profile to a persona.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindRoleRequest {
    /// Persona key.
    pub role_key: Option<String>,
    /// Profile to bind.
    pub agent_profile_id: Option<String>,
    /// Whether the binding is enabled; defaults to true.
    pub enabled: Option<bool>,
    /// Selection weight; any JSON number is accepted and clamped to at least 1.
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight: Option<f64>,
}

/// Admin request to revoke an agent profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    /// Profile to revoke.
    pub agent_profile_id: Option<String>,
}

/// Read a loosely typed numeric field.
///
/// Numbers of any size pass through as `f64`, numeric strings are parsed and
/// booleans count as 1 or 0. Anything else reads as absent.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|n| n.is_finite()))
}

// =============================================================================
// Responses
// =============================================================================

/// The signed-in user's own record, without credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// Platform user id.
    pub id: UserId,
    /// Provider-side user id.
    pub secondme_user_id: String,
    /// Display name.
    pub nickname: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Cached persona tags.
    pub shades: Option<serde_json::Value>,
    /// Cached memory summary.
    pub soft_memory: Option<serde_json::Value>,
    /// Access token expiry.
    pub token_expires_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.user_id,
            secondme_user_id: user.provider_user_id.clone(),
            nickname: user.nickname.clone(),
            avatar_url: user.avatar_url.clone(),
            shades: user.shades.clone(),
            soft_memory: user.soft_memory.clone(),
            token_expires_at: user.token_expires_at,
            updated_at: user.updated_at,
        }
    }
}

/// One enabled binding as shown in the public directory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRoleView {
    /// Binding id.
    pub id: BindingId,
    /// Persona key.
    pub role_key: String,
    /// Persona label.
    pub role_label: String,
    /// Selection weight.
    pub weight: u32,
}

/// A public, consenting agent profile and its enabled bindings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAgentView {
    /// Profile id.
    pub agent_profile_id: AgentProfileId,
    /// Consent state (always `ACTIVE` here).
    pub consent_status: ConsentStatus,
    /// Visibility (always `PUBLIC` here).
    pub visibility: Visibility,
    /// Directory alias.
    pub display_alias: Option<String>,
    /// Number of enabled bindings.
    pub role_count: usize,
    /// Enabled bindings.
    pub roles: Vec<PublicRoleView>,
}

impl PublicAgentView {
    /// Build a directory entry from a profile and its enabled bindings.
    #[must_use]
    pub fn new(profile: &AgentProfile, bindings: &[RoleBinding]) -> Self {
        let roles: Vec<PublicRoleView> = bindings
            .iter()
            .map(|b| PublicRoleView {
                id: b.binding_id,
                role_key: b.role_key.clone(),
                role_label: reunion_core::role_label(&b.role_key).to_string(),
                weight: b.weight,
            })
            .collect();

        Self {
            agent_profile_id: profile.agent_profile_id,
            consent_status: profile.consent_status,
            visibility: profile.visibility,
            display_alias: profile.display_alias.clone(),
            role_count: roles.len(),
            roles,
        }
    }
}

/// A role binding as listed to admins.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingView {
    /// Binding id.
    pub id: BindingId,
    /// Persona key.
    pub role_key: String,
    /// Persona label.
    pub role_label: String,
    /// Bound profile.
    pub agent_profile_id: AgentProfileId,
    /// Whether the binding is enabled.
    pub enabled: bool,
    /// Selection weight.
    pub weight: u32,
    /// Consent state of the bound profile, if the profile still exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_status: Option<ConsentStatus>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl BindingView {
    /// Build a view, attaching the profile's consent state when known.
    #[must_use]
    pub fn new(binding: &RoleBinding, consent_status: Option<ConsentStatus>) -> Self {
        Self {
            id: binding.binding_id,
            role_key: binding.role_key.clone(),
            role_label: reunion_core::role_label(&binding.role_key).to_string(),
            agent_profile_id: binding.agent_profile_id,
            enabled: binding.enabled,
            weight: binding.weight,
            consent_status,
            updated_at: binding.updated_at,
        }
    }
}

/// Response to opening a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    /// New session id.
    pub session_id: SessionId,
    /// Persona key.
    pub role_key: String,
    /// Persona label.
    pub role_label: String,
    /// Scenario key.
    pub scenario_key: String,
    /// Profile playing the persona.
    pub agent_profile_id: AgentProfileId,
}

impl From<&ChatSession> for SessionCreated {
    fn from(session: &ChatSession) -> Self {
        Self {
            session_id: session.session_id,
            role_key: session.role_key.clone(),
            role_label: reunion_core::role_label(&session.role_key).to_string(),
            scenario_key: session.scenario_key.clone(),
            agent_profile_id: session.agent_profile_id,
        }
    }
}

/// The viewer's most recently updated session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSession {
    /// Session id.
    pub session_id: SessionId,
    /// Persona key.
    pub role_key: String,
    /// Scenario key.
    pub scenario_key: String,
    /// Status.
    pub status: SessionStatus,
    /// Last update.
    pub updated_at: DateTime<Utc>,
    /// Content of the latest message, empty if none.
    pub last_message: String,
}

/// A transcript line as returned to the viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message id.
    pub id: MessageId,
    /// Author.
    pub sender: MessageSender,
    /// Masked content.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.message_id,
            sender: message.sender,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

/// A session with its full transcript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    /// Session id.
    pub session_id: SessionId,
    /// Persona key.
    pub role_key: String,
    /// Scenario key.
    pub scenario_key: String,
    /// Status.
    pub status: SessionStatus,
    /// Messages in creation order.
    pub messages: Vec<MessageView>,
}

/// Response to a posted viewer message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageResult {
    /// Id of the stored agent reply.
    pub message_id: MessageId,
    /// Masked reply.
    pub reply: String,
    /// Always empty for accepted messages.
    pub safety_flags: Vec<&'static str>,
    /// Whether the reply is the degraded template.
    pub fallback: bool,
}

/// A complete non-streamed dialogue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoDialogueResult {
    /// Scenario key.
    pub scenario_key: String,
    /// Scenario label.
    pub scenario_label: String,
    /// Personas in speaking order.
    pub selected_roles: Vec<RoleView>,
    /// Generated turns.
    pub transcript: Vec<DialogueTurn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_role_keys_keeps_first_occurrence() {
        let request = DialogueRequest {
            role_keys: Some(vec![
                "da-yi".into(),
                " ".into(),
                "er-yi".into(),
                "da-yi".into(),
            ]),
            ..DialogueRequest::default()
        };
        assert_eq!(request.distinct_role_keys(), vec!["da-yi", "er-yi"]);
        assert!(DialogueRequest::default().distinct_role_keys().is_empty());
    }

    #[test]
    fn requests_use_camel_case() {
        let request: BindRoleRequest = serde_json::from_str(
            r#"{"roleKey":"da-yi","agentProfileId":"ab","weight":0}"#,
        )
        .unwrap();
        assert_eq!(request.role_key.as_deref(), Some("da-yi"));
        assert_eq!(request.weight, Some(0.0));
        assert_eq!(request.enabled, None);
    }

    #[test]
    fn numeric_fields_accept_any_json_number() {
        let parse = |body: &str| serde_json::from_str::<DialogueRequest>(body).unwrap().rounds;
        assert_eq!(parse(r#"{"rounds":2.5}"#), Some(2.5));
        assert_eq!(parse(r#"{"rounds":1e3}"#), Some(1000.0));
        assert_eq!(parse(r#"{"rounds":99999999999999999999}"#), Some(1e20));
        assert_eq!(parse(r#"{"rounds":"6"}"#), Some(6.0));
        assert_eq!(parse(r#"{"rounds":"many"}"#), None);
        assert_eq!(parse(r#"{"rounds":null}"#), None);
        assert_eq!(parse(r#"{"rounds":[3]}"#), None);
        assert_eq!(parse("{}"), None);

        let bind: BindRoleRequest = serde_json::from_str(r#"{"weight":-2.7}"#).unwrap();
        assert_eq!(bind.weight, Some(-2.7));
    }

    #[test]
    fn default_config() {
        let config = ControlConfig::default();
        assert_eq!(config.dialogue.default_rounds, 8);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.chunk_delay, Duration::from_millis(80));
    }
}
