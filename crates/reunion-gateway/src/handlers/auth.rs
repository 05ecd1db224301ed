//! SecondMe OAuth login, callback and logout.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::Cookies;

use reunion_auth::{
    create_oauth_state, IdentityProvider, OAUTH_STATE_COOKIE_NAME, SESSION_COOKIE_NAME,
};
use reunion_control::{ControlPlane, UserId};

use crate::auth::{expired_cookie, oauth_state_cookie, session_cookie};
use crate::error::{ok, ApiError};
use crate::handlers::found;
use crate::state::GatewayState;

/// Longest failure reason echoed back to the login page.
const MAX_REASON_CHARS: usize = 120;

/// Query parameters of the provider callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// OAuth state echoed by the provider.
    pub state: Option<String>,
}

/// Start the OAuth flow.
///
/// `GET /api/auth/login`
///
/// Sets a 10-minute state cookie and redirects to the provider.
pub async fn login<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    cookies: Cookies,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let oauth_state = create_oauth_state();
    let url = state.provider.authorize_url(&oauth_state)?;
    cookies.add(oauth_state_cookie(oauth_state, state.config.cookie_secure));

    Ok(found(&url))
}

/// Finish the OAuth flow.
///
/// `GET /api/auth/callback?code&state`
///
/// Always answers with a redirect: `/` on success, `/login?error=...`
/// otherwise.
pub async fn callback<C, P>(
    State(state): State<Arc<GatewayState<C, P>>>,
    cookies: Cookies,
    Query(params): Query<CallbackParams>,
) -> Response
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    let Some(code) = params.code.filter(|code| !code.is_empty()) else {
        return found("/login?error=missing_code");
    };

    let expected = cookies
        .get(OAUTH_STATE_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string());
    if expected.is_none() || expected != params.state {
        tracing::warn!(
            has_cookie = expected.is_some(),
            has_param = params.state.is_some(),
            "OAuth state mismatch, continuing"
        );
    }
    cookies.remove(expired_cookie(OAUTH_STATE_COOKIE_NAME));

    match complete_oauth(&state, &code).await {
        Ok(user_id) => {
            tracing::info!(user_id = %user_id, "User signed in");
            cookies.add(session_cookie(
                state.signer.sign(&user_id),
                state.config.cookie_secure,
            ));
            found("/")
        }
        Err(err) => {
            tracing::warn!(error = %err, "OAuth callback failed");
            let reason: String = err.to_string().chars().take(MAX_REASON_CHARS).collect();
            found(&format!(
                "/login?error=oauth_failed&reason={}",
                urlencoding::encode(&reason)
            ))
        }
    }
}

async fn complete_oauth<C, P>(
    state: &GatewayState<C, P>,
    code: &str,
) -> reunion_control::Result<UserId>
where
    C: ControlPlane,
    P: IdentityProvider,
{
    let grant = state.provider.exchange_code(code).await?;

    let user_info = match state.provider.fetch_user_info(&grant.access_token).await {
        Ok(payload) => Some(payload),
        Err(err) => {
            tracing::warn!(error = %err, "User info unavailable at login");
            None
        }
    };

    let user = state
        .control
        .complete_login(&grant, user_info.as_ref())
        .await?;
    Ok(user.user_id)
}

/// Sign out from a script.
///
/// `POST /api/auth/logout`
pub async fn logout(cookies: Cookies) -> impl IntoResponse {
    cookies.remove(expired_cookie(SESSION_COOKIE_NAME));
    ok(json!({ "ok": true }))
}

/// Sign out from a link.
///
/// `GET /api/auth/logout`
pub async fn logout_redirect(cookies: Cookies) -> Response {
    cookies.remove(expired_cookie(SESSION_COOKIE_NAME));
    found("/login")
}
