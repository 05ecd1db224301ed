//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reunion_core::{AgentProfileId, BindingId, SessionId, UserId};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{
    AgentProfile, ChatMessage, ChatSession, ConsentStatus, RoleBinding, SessionStatus, User,
};
use crate::Store;

type Entry = (Box<[u8]>, Box<[u8]>);

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// Missing column families are created on open.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;
        tracing::debug!("store opened");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn scan_all<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Collect every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Entry>> {
        let cf = self.cf(cf_name)?;
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }

        Ok(entries)
    }

    /// The last entry whose key starts with `prefix`.
    fn last_with_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Option<Entry>> {
        let cf = self.cf(cf_name)?;
        let upper = keys::prefix_upper_bound(prefix);
        let mode = match &upper {
            Some(upper) => IteratorMode::From(upper, Direction::Reverse),
            None => IteratorMode::End,
        };

        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                return Ok(Some((key, value)));
            }
            if key.as_ref() < prefix {
                break;
            }
        }

        Ok(None)
    }

    fn bindings_from_index(&self, cf_name: &'static str, prefix: &[u8]) -> Result<Vec<RoleBinding>> {
        let mut bindings = Vec::new();
        for (key, _) in self.scan_prefix(cf_name, prefix)? {
            let binding_id = keys::extract_binding_id(&key).ok_or(StoreError::CorruptKey(cf_name))?;
            if let Some(binding) = self.get_role_binding(&binding_id)? {
                bindings.push(binding);
            }
        }
        Ok(bindings)
    }

    fn binding_index_writes(
        &self,
        batch: &mut WriteBatch,
        binding: &RoleBinding,
        value: &[u8],
    ) -> Result<()> {
        let cf_bindings = self.cf(cf::BINDINGS)?;
        let cf_by_role = self.cf(cf::BINDINGS_BY_ROLE)?;
        let cf_by_profile = self.cf(cf::BINDINGS_BY_PROFILE)?;

        batch.put_cf(&cf_bindings, keys::binding_key(&binding.binding_id), value);
        batch.put_cf(
            &cf_by_role,
            keys::role_binding_key(&binding.role_key, &binding.binding_id),
            [],
        );
        batch.put_cf(
            &cf_by_profile,
            keys::profile_binding_key(&binding.agent_profile_id, &binding.binding_id),
            [],
        );
        Ok(())
    }
}

fn timestamp_nanos(at: DateTime<Utc>) -> u64 {
    at.timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

impl Store for RocksStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    fn put_user(&self, user: &User) -> Result<()> {
        let cf = self.cf(cf::USERS)?;
        self.db
            .put_cf(&cf, keys::user_key(&user.user_id), Self::serialize(user)?)?;
        Ok(())
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.get_value(cf::USERS, &keys::user_key(user_id))
    }

    // =========================================================================
    // Agent Profile Operations
    // =========================================================================

    fn put_agent_profile(&self, profile: &AgentProfile) -> Result<()> {
        let cf = self.cf(cf::AGENT_PROFILES)?;
        self.db.put_cf(
            &cf,
            keys::agent_profile_key(&profile.agent_profile_id),
            Self::serialize(profile)?,
        )?;
        Ok(())
    }

    fn get_agent_profile(&self, profile_id: &AgentProfileId) -> Result<Option<AgentProfile>> {
        self.get_value(cf::AGENT_PROFILES, &keys::agent_profile_key(profile_id))
    }

    fn list_agent_profiles(&self) -> Result<Vec<AgentProfile>> {
        self.scan_all(cf::AGENT_PROFILES)
    }

    fn revoke_agent_profile(&self, profile_id: &AgentProfileId) -> Result<AgentProfile> {
        let mut profile = self
            .get_agent_profile(profile_id)?
            .ok_or(StoreError::NotFound)?;
        let bindings = self.list_bindings_by_profile(profile_id)?;
        let now = Utc::now();

        profile.consent_status = ConsentStatus::Revoked;
        profile.revoked_at = Some(now);
        profile.updated_at = now;

        let cf_profiles = self.cf(cf::AGENT_PROFILES)?;
        let cf_bindings = self.cf(cf::BINDINGS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_profiles,
            keys::agent_profile_key(profile_id),
            Self::serialize(&profile)?,
        );
        for mut binding in bindings.iter().cloned() {
            binding.enabled = false;
            binding.updated_at = now;
            batch.put_cf(
                &cf_bindings,
                keys::binding_key(&binding.binding_id),
                Self::serialize(&binding)?,
            );
        }
        self.db.write(batch)?;

        tracing::debug!(
            agent_profile_id = %profile_id,
            bindings = bindings.len(),
            "agent profile revoked"
        );

        Ok(profile)
    }

    // =========================================================================
    // Role Binding Operations
    // =========================================================================

    fn put_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        let mut binding = binding.clone();
        binding.weight = binding.weight.max(1);
        let value = Self::serialize(&binding)?;

        let mut batch = WriteBatch::default();

        // The id is derived from role and profile, but a caller may still
        // rewrite a record under the same id with different fields.
        if let Some(old) = self.get_role_binding(&binding.binding_id)? {
            if old.role_key != binding.role_key {
                let cf_by_role = self.cf(cf::BINDINGS_BY_ROLE)?;
                batch.delete_cf(
                    &cf_by_role,
                    keys::role_binding_key(&old.role_key, &old.binding_id),
                );
            }
            if old.agent_profile_id != binding.agent_profile_id {
                let cf_by_profile = self.cf(cf::BINDINGS_BY_PROFILE)?;
                batch.delete_cf(
                    &cf_by_profile,
                    keys::profile_binding_key(&old.agent_profile_id, &old.binding_id),
                );
            }
        }

        self.binding_index_writes(&mut batch, &binding, &value)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn get_role_binding(&self, binding_id: &BindingId) -> Result<Option<RoleBinding>> {
        self.get_value(cf::BINDINGS, &keys::binding_key(binding_id))
    }

    fn list_role_bindings(&self) -> Result<Vec<RoleBinding>> {
        self.scan_all(cf::BINDINGS)
    }

    fn list_bindings_by_role(&self, role_key: &str) -> Result<Vec<RoleBinding>> {
        self.bindings_from_index(cf::BINDINGS_BY_ROLE, &keys::role_prefix(role_key))
    }

    fn list_bindings_by_profile(&self, profile_id: &AgentProfileId) -> Result<Vec<RoleBinding>> {
        self.bindings_from_index(cf::BINDINGS_BY_PROFILE, &keys::profile_prefix(profile_id))
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    fn put_session(&self, session: &ChatSession) -> Result<()> {
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_viewer = self.cf(cf::SESSIONS_BY_VIEWER)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_sessions,
            keys::session_key(&session.session_id),
            Self::serialize(session)?,
        );
        batch.put_cf(
            &cf_by_viewer,
            keys::viewer_session_key(&session.viewer_user_id, &session.session_id),
            [],
        );
        self.db.write(batch)?;
        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<ChatSession>> {
        self.get_value(cf::SESSIONS, &keys::session_key(session_id))
    }

    fn update_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> Result<ChatSession> {
        let mut session = self.get_session(session_id)?.ok_or(StoreError::NotFound)?;
        session.status = status;
        session.updated_at = Utc::now();
        self.put_session(&session)?;
        Ok(session)
    }

    fn list_sessions_by_viewer(&self, user_id: &UserId) -> Result<Vec<ChatSession>> {
        let mut sessions = Vec::new();
        for (key, _) in self.scan_prefix(cf::SESSIONS_BY_VIEWER, &keys::viewer_prefix(user_id))? {
            let session_id = keys::extract_session_id(&key)
                .ok_or(StoreError::CorruptKey(cf::SESSIONS_BY_VIEWER))?;
            if let Some(session) = self.get_session(&session_id)? {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    // =========================================================================
    // Message Operations
    // =========================================================================

    fn append_message(&self, message: &ChatMessage) -> Result<()> {
        let prefix = keys::session_prefix(&message.session_id);
        let mut nanos = timestamp_nanos(message.created_at);

        // Keep keys strictly increasing when two lines share a timestamp.
        if let Some((last_key, _)) = self.last_with_prefix(cf::MESSAGES, &prefix)? {
            let last = keys::extract_message_nanos(&last_key)
                .ok_or(StoreError::CorruptKey(cf::MESSAGES))?;
            if nanos <= last {
                nanos = last.saturating_add(1);
            }
        }

        let cf = self.cf(cf::MESSAGES)?;
        self.db.put_cf(
            &cf,
            keys::message_key(&message.session_id, nanos, &message.message_id),
            Self::serialize(message)?,
        )?;
        Ok(())
    }

    fn list_messages(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>> {
        self.scan_prefix(cf::MESSAGES, &keys::session_prefix(session_id))?
            .into_iter()
            .map(|(_, value)| Self::deserialize(&value))
            .collect()
    }

    fn last_message(&self, session_id: &SessionId) -> Result<Option<ChatMessage>> {
        self.last_with_prefix(cf::MESSAGES, &keys::session_prefix(session_id))?
            .map(|(_, value)| Self::deserialize(&value))
            .transpose()
    }
}
