//! Agent directory and role bindings.
//!
//! Listing is open to any signed-in user. Binding and revoking require an
//! admin.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use reunion_auth::IdentityProvider;
use reunion_control::{BindRoleRequest, ControlPlane, RevokeRequest};

use crate::auth::{AdminUser, CurrentUser};
use crate::error::{ok, ApiError};
use crate::extract::ApiJson;
use crate::state::GatewayState;

/// List public agents.
///
/// `GET /api/agents/public`
///
/// Also re-activates the caller's own profile.
pub async fn list_public<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    current: CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let agents = state.control.list_public_agents(&current.user_id).await?;
    Ok(ok(agents))
}

/// Revoke an agent profile and disable its bindings.
///
/// `POST /api/agents/revoke`
pub async fn revoke<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    admin: AdminUser,
    ApiJson(request): ApiJson<RevokeRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    tracing::info!(
        admin = %admin.user_id,
        agent_profile_id = ?request.agent_profile_id,
        "Revoking agent"
    );
    state.control.revoke_agent(request).await?;
    Ok(ok(json!({ "ok": true })))
}

/// Bind an agent profile to a persona.
///
/// `POST /api/roles/bind`
pub async fn bind_role<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    admin: AdminUser,
    ApiJson(request): ApiJson<BindRoleRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let binding = state.control.bind_role(&admin.user_id, request).await?;
    Ok(ok(binding))
}

/// List every binding with its profile's consent status.
///
/// `GET /api/roles/bindings`
pub async fn list_bindings<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    _current: CurrentUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let bindings = state.control.list_bindings().await?;
    Ok(ok(bindings))
}
