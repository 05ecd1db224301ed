//! Column family layout.
//!
//! Opening the database creates any missing column family, which is the only
//! schema initialization the store needs.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// User records, keyed by `user_id`.
    pub const USERS: &str = "users";

    /// Agent profiles, keyed by `agent_profile_id`.
    pub const AGENT_PROFILES: &str = "agent_profiles";

    /// Role bindings, keyed by `binding_id`.
    pub const BINDINGS: &str = "bindings";

    /// Index: bindings by persona, keyed by `role_key || 0x00 || binding_id`.
    pub const BINDINGS_BY_ROLE: &str = "bindings_by_role";

    /// Index: bindings by profile, keyed by `agent_profile_id || binding_id`.
    pub const BINDINGS_BY_PROFILE: &str = "bindings_by_profile";

    /// Chat sessions, keyed by `session_id`.
    pub const SESSIONS: &str = "sessions";

    /// Index: sessions by viewer, keyed by `user_id || session_id`.
    pub const SESSIONS_BY_VIEWER: &str = "sessions_by_viewer";

    /// Chat messages, keyed by `session_id || created_at_nanos || message_id`.
    pub const MESSAGES: &str = "messages";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::USERS,
        cf::AGENT_PROFILES,
        cf::BINDINGS,
        cf::BINDINGS_BY_ROLE,
        cf::BINDINGS_BY_PROFILE,
        cf::SESSIONS,
        cf::SESSIONS_BY_VIEWER,
        cf::MESSAGES,
    ]
}
