//! Session cookies and authentication extractors.
//!
//! The `CurrentUser` extractor reads the signed `secondme_session` cookie and
//! loads the user it names; a valid cookie for a user without a record is
//! rejected like a missing one. `AdminUser` additionally checks the admin
//! allow-list.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_cookies::cookie::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use reunion_auth::{
    IdentityProvider, OAUTH_STATE_COOKIE_NAME, OAUTH_STATE_MAX_AGE_SECS, SESSION_COOKIE_NAME,
    SESSION_MAX_AGE_SECS,
};
use reunion_control::{ControlError, ControlPlane, User};
use reunion_core::UserId;

use crate::error::ApiError;
use crate::state::GatewayState;

/// A signed-in user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// The platform user id from the session cookie.
    pub user_id: UserId,
    /// The stored user record.
    pub user: User,
}

/// A signed-in user on the admin allow-list.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser {
    /// The platform user id from the session cookie.
    pub user_id: UserId,
}

async fn request_cookies<S: Send + Sync>(parts: &mut Parts, state: &S) -> Result<Cookies, ApiError> {
    Cookies::from_request_parts(parts, state)
        .await
        .map_err(|(_, msg)| ApiError::Internal(msg.to_string()))
}

#[async_trait]
impl<C, P> FromRequestParts<Arc<GatewayState<C, P>>> for CurrentUser
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState<C, P>>,
    ) -> Result<Self, Self::Rejection> {
        let cookies = request_cookies(parts, state).await?;
        let cookie = cookies
            .get(SESSION_COOKIE_NAME)
            .ok_or(ApiError::Unauthorized)?;
        let user_id = state.signer.verify(cookie.value())?;

        let user = state.control.get_user(&user_id).await.map_err(|err| match err {
            ControlError::UserNotFound(_) => {
                tracing::debug!(user_id = %user_id, "Session names an unknown user");
                ApiError::Unauthorized
            }
            other => other.into(),
        })?;

        Ok(Self { user_id, user })
    }
}

#[async_trait]
impl<C, P> FromRequestParts<Arc<GatewayState<C, P>>> for AdminUser
where
    C: ControlPlane + 'static,
    P: IdentityProvider + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState<C, P>>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser { user_id, .. } = CurrentUser::from_request_parts(parts, state).await?;
        if !state.config.is_admin(&user_id) {
            tracing::warn!(user_id = %user_id, "Admin operation refused");
            return Err(ApiError::Forbidden);
        }
        Ok(Self { user_id })
    }
}

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie
}

/// The signed session cookie, valid for 30 days.
#[must_use]
pub fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE_NAME, value, secure);
    cookie.set_max_age(Duration::seconds(SESSION_MAX_AGE_SECS));
    cookie
}

/// The short-lived OAuth state cookie.
#[must_use]
pub fn oauth_state_cookie(state: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(OAUTH_STATE_COOKIE_NAME, state, secure);
    cookie.set_max_age(Duration::seconds(OAUTH_STATE_MAX_AGE_SECS));
    cookie
}

/// A cookie that, when removed through `Cookies`, clears `name` on the client.
#[must_use]
pub fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("abc.def".to_string(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE_NAME);
        assert_eq!(cookie.value(), "abc.def");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(
            cookie.max_age(),
            Some(Duration::seconds(SESSION_MAX_AGE_SECS))
        );
    }

    #[test]
    fn state_cookie_is_short_lived() {
        let cookie = oauth_state_cookie("s".to_string(), false);
        assert_eq!(cookie.name(), OAUTH_STATE_COOKIE_NAME);
        assert_eq!(cookie.max_age(), Some(Duration::seconds(600)));
        assert_eq!(cookie.secure(), Some(false));
    }
}
