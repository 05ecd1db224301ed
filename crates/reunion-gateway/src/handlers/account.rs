//! The signed-in user's account and cached provider profile.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use reunion_auth::IdentityProvider;
use reunion_control::{ControlPlane, UserSummary};

use crate::auth::CurrentUser;
use crate::error::{ok, ApiError};
use crate::state::GatewayState;

/// Get the current user.
///
/// `GET /api/me`
pub async fn me<C, P>(current: CurrentUser) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    Ok(ok(UserSummary::from(&current.user)))
}

/// Fetch and cache the provider's user info.
///
/// `GET /api/user/info`
///
/// Returns the provider's JSON unchanged.
pub async fn user_info<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
) -> Result<Json<Value>, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let user = current.user;
    let payload = state
        .provider
        .fetch_user_info(&user.access_token)
        .await
        .map_err(|err| {
            tracing::warn!(user_id = %user.user_id, error = %err, "User info fetch failed");
            ApiError::ProfileFetch {
                code: 5001,
                message: "获取用户信息失败",
            }
        })?;

    state.control.cache_user_info(&user.user_id, &payload).await?;
    Ok(Json(payload))
}

/// Fetch and cache the provider's persona tags.
///
/// `GET /api/user/shades`
pub async fn user_shades<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
) -> Result<Json<Value>, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let user = current.user;
    let payload = state
        .provider
        .fetch_user_shades(&user.access_token)
        .await
        .map_err(|err| {
            tracing::warn!(user_id = %user.user_id, error = %err, "Shades fetch failed");
            ApiError::ProfileFetch {
                code: 5002,
                message: "获取兴趣标签失败",
            }
        })?;

    state
        .control
        .cache_user_shades(&user.user_id, &payload)
        .await?;
    Ok(Json(payload))
}
