//! User records created at login and refreshed from provider profiles.

use chrono::{Duration, Utc};
use reunion_auth::{resolve_provider_user_id, shades_from_payload, ProviderProfile, TokenGrant};
use reunion_core::UserId;
use reunion_store::{Store, User};
use serde_json::Value;

use crate::error::{ControlError, Result};
use crate::registry;

/// Longest token lifetime accepted from a provider, one year.
const MAX_TOKEN_LIFETIME_SECS: u64 = 60 * 60 * 24 * 365;

/// Upsert the user behind a token grant and opt them in as an agent.
///
/// `user_info` is the provider's user-info payload when it could be fetched.
/// Profile fields it leaves empty keep their stored values.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn complete_login<S: Store>(
    store: &S,
    grant: &TokenGrant,
    user_info: Option<&Value>,
) -> Result<User> {
    let profile = user_info.map(ProviderProfile::from_user_info).unwrap_or_default();
    let provider_user_id = resolve_provider_user_id(grant, &profile);
    let user_id = UserId::from_provider(&provider_user_id);

    let now = Utc::now();
    let lifetime = i64::try_from(grant.expires_in.min(MAX_TOKEN_LIFETIME_SECS)).unwrap_or(0);
    let existing = store.get_user(&user_id)?;

    let user = match existing {
        Some(mut user) => {
            user.nickname = profile.nickname.or(user.nickname);
            user.avatar_url = profile.avatar_url.or(user.avatar_url);
            user.soft_memory = profile.soft_memory.or(user.soft_memory);
            user.access_token.clone_from(&grant.access_token);
            user.refresh_token.clone_from(&grant.refresh_token);
            user.token_expires_at = now + Duration::seconds(lifetime);
            user.updated_at = now;
            user
        }
        None => User {
            user_id,
            provider_user_id: provider_user_id.clone(),
            nickname: profile.nickname,
            avatar_url: profile.avatar_url,
            shades: None,
            soft_memory: profile.soft_memory,
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            token_expires_at: now + Duration::seconds(lifetime),
            created_at: now,
            updated_at: now,
        },
    };
    store.put_user(&user)?;
    let profile = registry::ensure_agent_profile(store, &user.user_id)?;

    tracing::info!(
        user_id = %user.user_id,
        provider_user_id = %provider_user_id,
        agent_profile_id = %profile.agent_profile_id,
        "User signed in"
    );

    Ok(user)
}

/// Load a user record.
///
/// # Errors
///
/// Returns `ControlError::UserNotFound` if there is none.
pub fn get_user<S: Store>(store: &S, user_id: &UserId) -> Result<User> {
    store
        .get_user(user_id)?
        .ok_or(ControlError::UserNotFound(*user_id))
}

/// Cache nickname, avatar and memory summary from a user-info payload.
///
/// # Errors
///
/// Returns `ControlError::UserNotFound` if the user doesn't exist.
pub fn cache_user_info<S: Store>(store: &S, user_id: &UserId, payload: &Value) -> Result<User> {
    let mut user = get_user(store, user_id)?;
    let profile = ProviderProfile::from_user_info(payload);

    user.nickname = profile.nickname.or(user.nickname);
    user.avatar_url = profile.avatar_url.or(user.avatar_url);
    user.soft_memory = profile.soft_memory.or(user.soft_memory);
    user.updated_at = Utc::now();
    store.put_user(&user)?;

    tracing::debug!(user_id = %user_id, "Cached user info");
    Ok(user)
}

/// Cache the persona tags from a shades payload.
///
/// # Errors
///
/// Returns `ControlError::UserNotFound` if the user doesn't exist.
pub fn cache_user_shades<S: Store>(store: &S, user_id: &UserId, payload: &Value) -> Result<User> {
    let mut user = get_user(store, user_id)?;
    if let Some(shades) = shades_from_payload(payload) {
        user.shades = Some(shades);
        user.updated_at = Utc::now();
        store.put_user(&user)?;
        tracing::debug!(user_id = %user_id, "Cached user shades");
    }
    Ok(user)
}
