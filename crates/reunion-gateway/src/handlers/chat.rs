//! Single-persona chat sessions and the non-streaming auto dialogue.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;

use reunion_auth::IdentityProvider;
use reunion_control::{
    ControlPlane, CreateSessionRequest, DialogueRequest, PostMessageRequest, SessionId,
};

use crate::auth::CurrentUser;
use crate::error::{ok, ApiError};
use crate::extract::ApiJson;
use crate::state::GatewayState;

/// Open a chat session with one persona.
///
/// `POST /api/chat/sessions`
///
/// # Request Body
///
/// ```json
/// { "roleKey": "da-yi", "scenarioKey": "marriage" }
/// ```
pub async fn create_session<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
    ApiJson(request): ApiJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let session = state
        .control
        .create_session(&current.user_id, request)
        .await?;
    Ok(ok(session))
}

/// The caller's most recent session, or `null`.
///
/// `GET /api/chat/sessions/recent`
pub async fn recent_session<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let recent = state.control.recent_session(&current.user_id).await?;
    Ok(ok(recent))
}

/// A session's messages, oldest first.
///
/// `GET /api/chat/sessions/:id/messages`
pub async fn session_history<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| ApiError::NotFound("会话不存在".to_string()))?;

    let history = state
        .control
        .session_history(&current.user_id, &session_id)
        .await?;
    Ok(ok(history))
}

/// Send a message and get the persona's reply.
///
/// `POST /api/chat/messages`
pub async fn post_message<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
    ApiJson(request): ApiJson<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let result = state
        .control
        .post_message(&current.user_id, request)
        .await?;
    Ok(ok(result))
}

/// Run a whole multi-persona dialogue and return the transcript.
///
/// `POST /api/chat/auto`
pub async fn auto_dialogue<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
    ApiJson(request): ApiJson<DialogueRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let transcript = state
        .control
        .auto_dialogue(&current.user_id, request)
        .await?;
    Ok(ok(transcript))
}
