//! Live stage streaming over server-sent events.
//!
//! Request validation and session setup happen before the response starts,
//! so those failures are ordinary JSON errors. Once the stream is open,
//! failures arrive as an `error` event followed by the end of the stream.
//!
//! Events are named `meta`, `chunk`, `error` and `end`; each carries one JSON
//! object as its data.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use reunion_auth::IdentityProvider;
use reunion_control::{ControlError, ControlPlane, DialogueRequest, StageEvent};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::GatewayState;

/// Stream a live stage.
///
/// `POST /api/stage/live/stream`
///
/// # Request Body
///
/// ```json
/// { "roleKeys": ["da-yi", "san-jiu"], "scenarioKey": "salary", "rounds": 6 }
/// ```
///
/// Dropping the connection stops the stage after the current turn and closes
/// its session.
pub async fn live_stream<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
    ApiJson(request): ApiJson<DialogueRequest>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let plan = state
        .control
        .prepare_stage(&current.user_id, request)
        .await?;
    let session_id = plan.session_id;

    tracing::info!(
        user_id = %current.user_id,
        session_id = %session_id,
        rounds = plan.rounds,
        actors = plan.actors.len(),
        "Live stage starting"
    );

    let (tx, rx) = mpsc::channel(state.control.stage_buffer().max(1));
    let control = Arc::clone(&state.control);
    tokio::spawn(async move {
        match control.run_stage(plan, tx).await {
            Ok(()) => tracing::debug!(session_id = %session_id, "Live stage finished"),
            Err(ControlError::StreamClosed) => {
                tracing::info!(session_id = %session_id, "Viewer left the live stage");
            }
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "Live stage failed");
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx).map(|event| to_sse(&event)))
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn to_sse(event: &StageEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.event_name()).json_data(event)
}

