//! Agent profiles, role bindings and weighted agent selection.
//!
//! A profile is a user's opt-in to let their access token speak for a
//! persona. Admins bind profiles to persona keys with a weight; selection
//! draws one enabled binding per persona with probability proportional to
//! its weight, skipping profiles whose consent has been withdrawn.

use std::collections::HashMap;

use chrono::Utc;
use rand::Rng;
use reunion_core::{AgentProfileId, BindingId, UserId};
use reunion_store::{
    AgentProfile, ConsentStatus, RoleBinding, Store, StoreError, Visibility,
};

use crate::error::{ControlError, Result};
use crate::types::{BindRoleRequest, BindingView, PublicAgentView, RevokeRequest};

/// A binding chosen to play a persona, with the credential it speaks with.
#[derive(Debug, Clone)]
pub struct SelectedAgent {
    /// Persona key.
    pub role_key: String,
    /// Persona label.
    pub role_label: &'static str,
    /// The chosen binding.
    pub binding: RoleBinding,
    /// Access token of the profile owner.
    pub access_token: String,
}

/// Create the user's profile, or reactivate it, as `ACTIVE` and `PUBLIC`.
///
/// Bindings disabled by an earlier revoke stay disabled.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn ensure_agent_profile<S: Store>(store: &S, owner: &UserId) -> Result<AgentProfile> {
    let profile_id = AgentProfileId::for_owner(owner);
    let now = Utc::now();

    let profile = match store.get_agent_profile(&profile_id)? {
        Some(mut existing) => {
            existing.consent_status = ConsentStatus::Active;
            existing.visibility = Visibility::Public;
            existing.revoked_at = None;
            existing.updated_at = now;
            existing
        }
        None => AgentProfile {
            agent_profile_id: profile_id,
            owner_user_id: *owner,
            consent_status: ConsentStatus::Active,
            visibility: Visibility::Public,
            display_alias: None,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        },
    };

    store.put_agent_profile(&profile)?;
    Ok(profile)
}

/// Active public profiles, most recently updated first, with enabled bindings.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn list_public_profiles<S: Store>(store: &S) -> Result<Vec<PublicAgentView>> {
    let mut profiles: Vec<AgentProfile> = store
        .list_agent_profiles()?
        .into_iter()
        .filter(|p| p.is_active() && p.visibility == Visibility::Public)
        .collect();
    profiles.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    profiles
        .iter()
        .map(|profile| {
            let bindings: Vec<RoleBinding> = store
                .list_bindings_by_profile(&profile.agent_profile_id)?
                .into_iter()
                .filter(|b| b.enabled)
                .collect();
            Ok(PublicAgentView::new(profile, &bindings))
        })
        .collect()
}

fn parse_profile_id(raw: Option<&str>) -> Result<AgentProfileId> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        ControlError::Validation("agentProfileId 必填".to_string())
    })?;
    AgentProfileId::from_hex(raw)
        .map_err(|_| ControlError::Validation("无效 agentProfileId".to_string()))
}

/// Selection weight for a binding request: at least 1, fractions dropped.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_weight(requested: Option<f64>) -> u32 {
    match requested {
        Some(weight) if weight.is_finite() => weight.trunc().clamp(1.0, f64::from(u32::MAX)) as u32,
        _ => 1,
    }
}

/// Create or update the binding of a profile to a persona.
///
/// # Errors
///
/// - `ControlError::Validation` if a field is missing or the role is unknown
/// - `ControlError::AgentProfileNotFound` if the profile is missing or revoked
pub fn bind_role<S: Store>(
    store: &S,
    admin: &UserId,
    request: &BindRoleRequest,
) -> Result<BindingView> {
    let role_key = request
        .role_key
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let (Some(role_key), Some(_)) = (role_key, request.agent_profile_id.as_deref()) else {
        return Err(ControlError::Validation(
            "roleKey 与 agentProfileId 必填".to_string(),
        ));
    };
    reunion_core::require_role(role_key)?;
    let profile_id = parse_profile_id(request.agent_profile_id.as_deref())?;

    let profile = store
        .get_agent_profile(&profile_id)?
        .filter(AgentProfile::is_active)
        .ok_or(ControlError::AgentProfileNotFound(profile_id))?;

    let binding_id = BindingId::derive(role_key, &profile_id);
    let existing = store.get_role_binding(&binding_id)?;
    let now = Utc::now();
    let weight = clamp_weight(request.weight);

    let binding = RoleBinding {
        binding_id,
        role_key: role_key.to_string(),
        agent_profile_id: profile.agent_profile_id,
        enabled: request.enabled.unwrap_or(true),
        weight,
        created_by: existing
            .as_ref()
            .map_or(Some(*admin), |b| b.created_by.or(Some(*admin))),
        created_at: existing.as_ref().map_or(now, |b| b.created_at),
        updated_at: now,
    };
    store.put_role_binding(&binding)?;

    tracing::info!(
        binding_id = %binding.binding_id,
        role_key = %binding.role_key,
        agent_profile_id = %profile_id,
        weight = binding.weight,
        enabled = binding.enabled,
        "Bound role"
    );

    Ok(BindingView::new(&binding, None))
}

/// Every binding, by persona key and then most recently updated first.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn list_bindings<S: Store>(store: &S) -> Result<Vec<BindingView>> {
    let mut bindings = store.list_role_bindings()?;
    bindings.sort_by(|a, b| {
        a.role_key
            .cmp(&b.role_key)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });

    let mut consent: HashMap<AgentProfileId, Option<ConsentStatus>> = HashMap::new();
    bindings
        .iter()
        .map(|binding| {
            let status = match consent.get(&binding.agent_profile_id) {
                Some(status) => *status,
                None => {
                    let status = store
                        .get_agent_profile(&binding.agent_profile_id)?
                        .map(|p| p.consent_status);
                    consent.insert(binding.agent_profile_id, status);
                    status
                }
            };
            Ok(BindingView::new(binding, status))
        })
        .collect()
}

/// Withdraw a profile's consent and disable all of its bindings.
///
/// # Errors
///
/// - `ControlError::Validation` if the id is missing or malformed
/// - `ControlError::AgentProfileNotFound` if the profile doesn't exist
pub fn revoke_profile<S: Store>(store: &S, request: &RevokeRequest) -> Result<AgentProfile> {
    let profile_id = parse_profile_id(request.agent_profile_id.as_deref())?;
    let profile = store.revoke_agent_profile(&profile_id).map_err(|e| match e {
        StoreError::NotFound => ControlError::AgentProfileNotFound(profile_id),
        other => ControlError::Store(other),
    })?;

    tracing::info!(agent_profile_id = %profile_id, "Revoked agent profile");
    Ok(profile)
}

/// Pick one item with probability proportional to its weight.
///
/// Weights below 1 count as 1. Returns `None` only for an empty slice.
pub fn pick_weighted<'a, T, R>(
    items: &'a [T],
    weight: impl Fn(&T) -> u32,
    rng: &mut R,
) -> Option<&'a T>
where
    R: Rng + ?Sized,
{
    let total: f64 = items.iter().map(|item| f64::from(weight(item).max(1))).sum();
    let mut hit = rng.random::<f64>() * total;
    for item in items {
        hit -= f64::from(weight(item).max(1));
        if hit <= 0.0 {
            return Some(item);
        }
    }
    items.first()
}

/// Draw a binding for one persona.
///
/// Only enabled bindings whose profile is active and whose owner still has a
/// user record are candidates.
///
/// # Errors
///
/// Returns `ControlError::NoAgentForRole` if there is no candidate.
pub fn pick_binding_for_role<S, R>(store: &S, role_key: &str, rng: &mut R) -> Result<SelectedAgent>
where
    S: Store,
    R: Rng + ?Sized,
{
    let role_label = reunion_core::role_label(role_key);
    let mut candidates: Vec<(RoleBinding, String)> = Vec::new();

    for binding in store.list_bindings_by_role(role_key)? {
        if !binding.enabled {
            continue;
        }
        let Some(profile) = store.get_agent_profile(&binding.agent_profile_id)? else {
            continue;
        };
        if !profile.is_active() {
            continue;
        }
        let Some(owner) = store.get_user(&profile.owner_user_id)? else {
            continue;
        };
        candidates.push((binding, owner.access_token));
    }

    let (binding, access_token) = pick_weighted(&candidates, |(b, _)| b.weight, rng)
        .cloned()
        .ok_or(ControlError::NoAgentForRole(role_label))?;

    tracing::debug!(
        role_key = %role_key,
        binding_id = %binding.binding_id,
        candidates = candidates.len(),
        "Picked binding"
    );

    Ok(SelectedAgent {
        role_key: role_key.to_string(),
        role_label,
        binding,
        access_token,
    })
}

/// Draw one binding per persona, in order.
///
/// # Errors
///
/// Returns `ControlError::NoAgentForRole` for the first persona without a
/// candidate.
pub fn pick_bindings_for_roles<S, R>(
    store: &S,
    role_keys: &[String],
    rng: &mut R,
) -> Result<Vec<SelectedAgent>>
where
    S: Store,
    R: Rng + ?Sized,
{
    role_keys
        .iter()
        .map(|key| pick_binding_for_role(store, key, rng))
        .collect()
}
