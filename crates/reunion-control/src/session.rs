//! Single-persona chat sessions.
//!
//! A session pins one persona to one agent profile for one viewer. Viewer
//! messages are screened against the blocklist, masked and stored; the
//! persona's reply is generated from the unmasked text and stored masked.

use chrono::Utc;
use rand::Rng;
use reunion_core::{MessageId, SessionId, UserId};
use reunion_store::{ChatMessage, ChatSession, MessageSender, SessionStatus, Store};

use crate::chat_client::{generate_reply, ChatClient, RoleplayPrompt};
use crate::error::{ControlError, Result};
use crate::registry;
use crate::types::{
    CreateSessionRequest, MessageView, PostMessageRequest, PostMessageResult, RecentSession,
    SessionCreated, SessionHistory,
};

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_session_id(raw: &str) -> Result<SessionId> {
    raw.parse()
        .map_err(|_| ControlError::Validation("无效 sessionId".to_string()))
}

/// Open a session with an agent drawn for the requested persona.
///
/// # Errors
///
/// - `ControlError::Validation` if the persona or scenario is missing or unknown
/// - `ControlError::NoAgentForRole` if no agent can play the persona
pub fn create_session<S, R>(
    store: &S,
    viewer: &UserId,
    request: &CreateSessionRequest,
    rng: &mut R,
) -> Result<ChatSession>
where
    S: Store,
    R: Rng + ?Sized,
{
    let (Some(role_key), Some(scenario_key)) = (
        required(request.role_key.as_deref()),
        required(request.scenario_key.as_deref()),
    ) else {
        return Err(ControlError::Validation(
            "roleKey 与 scenarioKey 必填".to_string(),
        ));
    };
    reunion_core::require_role(role_key)?;
    reunion_core::require_scenario(scenario_key)?;

    let picked = registry::pick_binding_for_role(store, role_key, rng)?;
    let now = Utc::now();
    let session = ChatSession {
        session_id: SessionId::generate(),
        viewer_user_id: *viewer,
        role_key: role_key.to_string(),
        scenario_key: scenario_key.to_string(),
        agent_profile_id: picked.binding.agent_profile_id,
        status: SessionStatus::Active,
        created_at: now,
        updated_at: now,
    };
    store.put_session(&session)?;

    tracing::info!(
        session_id = %session.session_id,
        viewer = %viewer,
        role_key = %role_key,
        agent_profile_id = %session.agent_profile_id,
        "Created chat session"
    );

    Ok(session)
}

/// Response body for a freshly created session.
#[must_use]
pub fn created_view(session: &ChatSession) -> SessionCreated {
    SessionCreated::from(session)
}

/// Get a session, hiding other viewers' sessions.
///
/// # Errors
///
/// Returns `ControlError::SessionNotFound` if the session doesn't exist or
/// belongs to someone else.
pub fn get_owned_session<S: Store>(
    store: &S,
    viewer: &UserId,
    session_id: &SessionId,
) -> Result<ChatSession> {
    store
        .get_session(session_id)?
        .filter(|s| s.viewer_user_id == *viewer)
        .ok_or(ControlError::SessionNotFound(*session_id))
}

/// A session and its transcript.
///
/// # Errors
///
/// Returns `ControlError::SessionNotFound` if the session isn't the viewer's.
pub fn history<S: Store>(store: &S, viewer: &UserId, session_id: &SessionId) -> Result<SessionHistory> {
    let session = get_owned_session(store, viewer, session_id)?;
    let messages = store
        .list_messages(session_id)?
        .into_iter()
        .map(MessageView::from)
        .collect();

    Ok(SessionHistory {
        session_id: session.session_id,
        role_key: session.role_key,
        scenario_key: session.scenario_key,
        status: session.status,
        messages,
    })
}

/// The viewer's most recently updated session, if any.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn recent<S: Store>(store: &S, viewer: &UserId) -> Result<Option<RecentSession>> {
    let Some(session) = store.list_sessions_by_viewer(viewer)?.into_iter().next() else {
        return Ok(None);
    };
    let last_message = store
        .last_message(&session.session_id)?
        .map(|m| m.content)
        .unwrap_or_default();

    Ok(Some(RecentSession {
        session_id: session.session_id,
        role_key: session.role_key,
        scenario_key: session.scenario_key,
        status: session.status,
        updated_at: session.updated_at,
        last_message,
    }))
}

fn store_message<S: Store>(
    store: &S,
    session_id: SessionId,
    sender: MessageSender,
    raw: &str,
) -> Result<ChatMessage> {
    let content = reunion_core::mask_sensitive(raw);
    let message = ChatMessage {
        message_id: MessageId::generate(),
        session_id,
        sender,
        masked: true,
        content,
        created_at: Utc::now(),
    };
    store.append_message(&message)?;
    Ok(message)
}

/// Post a viewer message and get the persona's reply.
///
/// # Errors
///
/// - `ControlError::Validation` if the session id or content is missing
/// - `ControlError::Blocked` if the content hits the blocklist
/// - `ControlError::SessionNotFound` if the session isn't the viewer's
/// - `ControlError::SessionClosed` if the session is closed
/// - `ControlError::AgentRevoked` if the session's profile withdrew consent
pub async fn post_message<S, C>(
    store: &S,
    client: &C,
    viewer: &UserId,
    request: &PostMessageRequest,
) -> Result<PostMessageResult>
where
    S: Store,
    C: ChatClient + ?Sized,
{
    let (Some(raw_session_id), Some(content)) = (
        required(request.session_id.as_deref()),
        required(request.content.as_deref()),
    ) else {
        return Err(ControlError::Validation(
            "sessionId 与 content 必填".to_string(),
        ));
    };

    let verdict = reunion_core::check_safety(content);
    if verdict.blocked {
        tracing::info!(viewer = %viewer, matched = ?verdict.matched, "Blocked chat message");
        return Err(ControlError::Blocked {
            matched: verdict.matched,
        });
    }

    let session_id = parse_session_id(raw_session_id)?;
    let session = get_owned_session(store, viewer, &session_id)?;
    if session.status != SessionStatus::Active {
        return Err(ControlError::SessionClosed(session_id));
    }

    let profile = store
        .get_agent_profile(&session.agent_profile_id)?
        .filter(reunion_store::AgentProfile::is_active)
        .ok_or(ControlError::AgentRevoked(session.agent_profile_id))?;
    let owner = store
        .get_user(&profile.owner_user_id)?
        .ok_or(ControlError::UserNotFound(profile.owner_user_id))?;

    store_message(store, session_id, MessageSender::User, content)?;

    let prompt = RoleplayPrompt {
        role_label: reunion_core::role_label(&session.role_key).to_string(),
        scenario_label: reunion_core::scenario_label(&session.scenario_key).to_string(),
        message: content.to_string(),
    };
    let reply = generate_reply(client, &owner.access_token, &prompt).await;
    let saved = store_message(store, session_id, MessageSender::Agent, &reply.reply)?;
    store.update_session_status(&session_id, SessionStatus::Active)?;

    tracing::debug!(
        session_id = %session_id,
        fallback = reply.fallback,
        "Recorded chat exchange"
    );

    Ok(PostMessageResult {
        message_id: saved.message_id,
        reply: saved.content,
        safety_flags: Vec::new(),
        fallback: reply.fallback,
    })
}
