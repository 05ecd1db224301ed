//! Fixtures shared by the unit tests.

use chrono::{Duration, Utc};
use reunion_core::{BindingId, UserId};
use reunion_store::{AgentProfile, RocksStore, RoleBinding, Store, User};
use tempfile::TempDir;

use crate::registry;

pub fn test_store() -> (RocksStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    (store, dir)
}

pub fn seed_user(store: &impl Store, provider_id: &str) -> User {
    let now = Utc::now();
    let user = User {
        user_id: UserId::from_provider(provider_id),
        provider_user_id: provider_id.to_string(),
        nickname: Some(provider_id.to_string()),
        avatar_url: None,
        shades: None,
        soft_memory: None,
        access_token: format!("token-{provider_id}"),
        refresh_token: String::new(),
        token_expires_at: now + Duration::hours(2),
        created_at: now,
        updated_at: now,
    };
    store.put_user(&user).unwrap();
    user
}

/// A user with an active profile bound to `role_key`.
pub fn seed_agent(
    store: &impl Store,
    provider_id: &str,
    role_key: &str,
    weight: u32,
) -> (User, AgentProfile) {
    let user = seed_user(store, provider_id);
    let profile = registry::ensure_agent_profile(store, &user.user_id).unwrap();
    let now = Utc::now();
    store
        .put_role_binding(&RoleBinding {
            binding_id: BindingId::derive(role_key, &profile.agent_profile_id),
            role_key: role_key.to_string(),
            agent_profile_id: profile.agent_profile_id,
            enabled: true,
            weight,
            created_by: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();
    (user, profile)
}
