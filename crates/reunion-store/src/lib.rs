//! `RocksDB` storage layer for reunion.
//!
//! Persists users, agent profiles, role bindings, chat sessions and chat
//! messages using `RocksDB` column families with CBOR-encoded values.
//!
//! # Architecture
//!
//! - `users`: user records, keyed by `user_id`
//! - `agent_profiles`: profile records, keyed by `agent_profile_id`
//! - `bindings`: role bindings, keyed by `binding_id`
//! - `bindings_by_role` / `bindings_by_profile`: binding indexes
//! - `sessions`: chat sessions, keyed by `session_id`
//! - `sessions_by_viewer`: index for listing a viewer's sessions
//! - `messages`: transcript lines, keyed by session and creation time
//!
//! # Example
//!
//! ```no_run
//! use reunion_store::{RocksStore, Store};
//! use reunion_core::UserId;
//!
//! let store = RocksStore::open("/tmp/reunion-db").unwrap();
//!
//! let user_id = UserId::from_provider("sm_1024");
//! let sessions = store.list_sessions_by_viewer(&user_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{
    AgentProfile, ChatMessage, ChatSession, ConsentStatus, MessageSender, RoleBinding,
    SessionStatus, User, Visibility,
};

use reunion_core::{AgentProfileId, BindingId, SessionId, UserId};

/// The storage trait defining all database operations.
///
/// Implementations must be safe to share across tasks; the service holds a
/// single handle behind an `Arc`.
pub trait Store: Send + Sync {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert or update a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_user(&self, user: &User) -> Result<()>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    // =========================================================================
    // Agent Profile Operations
    // =========================================================================

    /// Insert or update an agent profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_agent_profile(&self, profile: &AgentProfile) -> Result<()>;

    /// Get an agent profile by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_agent_profile(&self, profile_id: &AgentProfileId) -> Result<Option<AgentProfile>>;

    /// List every agent profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_agent_profiles(&self) -> Result<Vec<AgentProfile>>;

    /// Withdraw consent for a profile.
    ///
    /// Marks the profile `REVOKED`, stamps `revoked_at` and disables every
    /// binding of the profile in a single atomic write.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the profile doesn't exist.
    fn revoke_agent_profile(&self, profile_id: &AgentProfileId) -> Result<AgentProfile>;

    // =========================================================================
    // Role Binding Operations
    // =========================================================================

    /// Insert or update a role binding, maintaining both binding indexes.
    ///
    /// The stored weight is clamped to at least 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_role_binding(&self, binding: &RoleBinding) -> Result<()>;

    /// Get a role binding by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_role_binding(&self, binding_id: &BindingId) -> Result<Option<RoleBinding>>;

    /// List every role binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_role_bindings(&self) -> Result<Vec<RoleBinding>>;

    /// List the bindings of one persona key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_bindings_by_role(&self, role_key: &str) -> Result<Vec<RoleBinding>>;

    /// List the bindings of one agent profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_bindings_by_profile(&self, profile_id: &AgentProfileId) -> Result<Vec<RoleBinding>>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert or update a session record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_session(&self, session: &ChatSession) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<ChatSession>>;

    /// Update a session's status and `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the session doesn't exist.
    fn update_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> Result<ChatSession>;

    /// List a viewer's sessions, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions_by_viewer(&self, user_id: &UserId) -> Result<Vec<ChatSession>>;

    // =========================================================================
    // Message Operations
    // =========================================================================

    /// Append a message to its session's transcript.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn append_message(&self, message: &ChatMessage) -> Result<()>;

    /// List a session's messages in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_messages(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>>;

    /// The most recent message of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn last_message(&self, session_id: &SessionId) -> Result<Option<ChatMessage>>;
}
