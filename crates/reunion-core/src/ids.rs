//! Strongly-typed identifiers for reunion records.
//!
//! Hash-derived IDs (users, agent profiles, role bindings) are 32-byte blake3
//! digests rendered as hex. They are derived from natural keys, which makes
//! "one profile per user" and "one binding per (role, profile)" hold by
//! construction. Sessions and messages use random UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create the identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Parse the identifier from a 64-character hex string.
            ///
            /// # Errors
            ///
            /// Returns an error if the string is not valid hex or not exactly 32 bytes.
            pub fn from_hex(s: &str) -> Result<Self, IdError> {
                let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
                let arr: [u8; 32] = bytes.try_into().map_err(|_| IdError::InvalidLength {
                    expected: 32,
                    got: s.len() / 2,
                })?;
                Ok(Self(arr))
            }

            /// Return the underlying bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Return the hex-encoded representation.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_hex()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the bytes of the UUID.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

hash_id!(
    /// Platform user identifier, derived from the OAuth provider's user id.
    UserId
);

hash_id!(
    /// Agent profile identifier. Each user owns at most one profile.
    AgentProfileId
);

hash_id!(
    /// Role binding identifier, unique per `(role_key, agent_profile_id)`.
    BindingId
);

uuid_id!(
    /// Chat session identifier.
    SessionId
);

uuid_id!(
    /// Chat message identifier.
    MessageId
);

impl UserId {
    /// Derive the platform user id for a provider-side user id.
    #[must_use]
    pub fn from_provider(provider_user_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"reunion.user");
        hasher.update(provider_user_id.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

impl AgentProfileId {
    /// The profile id owned by `owner`.
    #[must_use]
    pub fn for_owner(owner: &UserId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"reunion.agent-profile");
        hasher.update(owner.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

impl BindingId {
    /// The binding id for a persona key on a given agent profile.
    #[must_use]
    pub fn derive(role_key: &str, agent_profile_id: &AgentProfileId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"reunion.role-binding");
        hasher.update(agent_profile_id.as_bytes());
        hasher.update(role_key.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}
