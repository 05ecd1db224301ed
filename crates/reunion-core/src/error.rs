//! Common error types for reunion.
//!
//! Errors shared by every crate that works with catalog keys or identifiers.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the reunion system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A persona key is not in the catalog.
    #[error("unknown role key: {0}")]
    UnknownRole(String),

    /// A scenario key is not in the catalog.
    #[error("unknown scenario key: {0}")]
    UnknownScenario(String),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}

/// Validate a persona key against the bindable catalog.
///
/// # Errors
///
/// Returns `CoreError::UnknownRole` if the key is not bindable.
pub fn require_role(key: &str) -> Result<&'static str> {
    if crate::catalog::is_role(key) {
        Ok(crate::catalog::role_label(key))
    } else {
        Err(CoreError::UnknownRole(key.to_string()))
    }
}

/// Validate a scenario key against the catalog.
///
/// # Errors
///
/// Returns `CoreError::UnknownScenario` if the key is unknown.
pub fn require_scenario(key: &str) -> Result<&'static str> {
    if crate::catalog::is_scenario(key) {
        Ok(crate::catalog::scenario_label(key))
    } else {
        Err(CoreError::UnknownScenario(key.to_string()))
    }
}
