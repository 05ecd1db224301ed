//! Key encoding for records and prefix-scannable indexes.

use reunion_core::{AgentProfileId, BindingId, MessageId, SessionId, UserId};

const HASH_ID_LEN: usize = 32;
const UUID_LEN: usize = 16;
const ROLE_SEPARATOR: u8 = 0x00;

/// Encode a user key.
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Encode an agent profile key.
#[must_use]
pub fn agent_profile_key(profile_id: &AgentProfileId) -> Vec<u8> {
    profile_id.as_bytes().to_vec()
}

/// Encode a role binding key.
#[must_use]
pub fn binding_key(binding_id: &BindingId) -> Vec<u8> {
    binding_id.as_bytes().to_vec()
}

/// Prefix shared by every binding of a persona: `role_key || 0x00`.
///
/// The separator keeps `da-yi` from matching a hypothetical `da-yi-2`.
#[must_use]
pub fn role_prefix(role_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(role_key.len() + 1);
    key.extend_from_slice(role_key.as_bytes());
    key.push(ROLE_SEPARATOR);
    key
}

/// Encode a role-binding index key: `role_key || 0x00 || binding_id`.
#[must_use]
pub fn role_binding_key(role_key: &str, binding_id: &BindingId) -> Vec<u8> {
    let mut key = role_prefix(role_key);
    key.extend_from_slice(binding_id.as_bytes());
    key
}

/// Encode a profile-binding index key: `agent_profile_id || binding_id`.
#[must_use]
pub fn profile_binding_key(profile_id: &AgentProfileId, binding_id: &BindingId) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_ID_LEN * 2);
    key.extend_from_slice(profile_id.as_bytes());
    key.extend_from_slice(binding_id.as_bytes());
    key
}

/// Prefix for scanning every binding of a profile.
#[must_use]
pub fn profile_prefix(profile_id: &AgentProfileId) -> Vec<u8> {
    profile_id.as_bytes().to_vec()
}

/// Extract the binding id from the tail of an index key.
///
/// Works for both binding indexes since the id is always the last 32 bytes.
#[must_use]
pub fn extract_binding_id(key: &[u8]) -> Option<BindingId> {
    let start = key.len().checked_sub(HASH_ID_LEN)?;
    let bytes: [u8; HASH_ID_LEN] = key[start..].try_into().ok()?;
    Some(BindingId::from_bytes(bytes))
}

/// Encode a session key.
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Encode a viewer-session index key: `user_id || session_id`.
#[must_use]
pub fn viewer_session_key(user_id: &UserId, session_id: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_ID_LEN + UUID_LEN);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Prefix for scanning every session of a viewer.
#[must_use]
pub fn viewer_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the session id from a viewer-session index key.
#[must_use]
pub fn extract_session_id(key: &[u8]) -> Option<SessionId> {
    let bytes: [u8; UUID_LEN] = key
        .get(HASH_ID_LEN..HASH_ID_LEN + UUID_LEN)?
        .try_into()
        .ok()?;
    Some(SessionId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Encode a message key: `session_id || created_at_nanos (BE) || message_id`.
///
/// Big-endian timestamps make lexicographic order match creation order.
#[must_use]
pub fn message_key(session_id: &SessionId, created_at_nanos: u64, message_id: &MessageId) -> Vec<u8> {
    let mut key = Vec::with_capacity(UUID_LEN + 8 + UUID_LEN);
    key.extend_from_slice(session_id.as_bytes());
    key.extend_from_slice(&created_at_nanos.to_be_bytes());
    key.extend_from_slice(message_id.as_bytes());
    key
}

/// Prefix for scanning every message of a session.
#[must_use]
pub fn session_prefix(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Used as the starting point of a reverse scan. `None` when the prefix is
/// all `0xff` bytes and has no successor.
#[must_use]
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Extract the timestamp from a message key.
#[must_use]
pub fn extract_message_nanos(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.get(UUID_LEN..UUID_LEN + 8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
