//! Core types and utilities for reunion.
//!
//! This crate provides the foundational pieces shared by every other crate:
//!
//! - **Identifiers**: strongly-typed IDs for users, agent profiles, bindings,
//!   sessions and messages
//! - **Catalog**: the fixed persona and scenario lists
//! - **Safety**: the input blocklist and PII masking
//!
//! # Example
//!
//! ```
//! use reunion_core::{mask_sensitive, role_label, AgentProfileId, UserId};
//!
//! let user_id = UserId::from_provider("sm_1024");
//! let profile_id = AgentProfileId::for_owner(&user_id);
//! assert_eq!(profile_id, AgentProfileId::for_owner(&user_id));
//!
//! assert_eq!(role_label("da-yi"), "大姨");
//! assert_eq!(mask_sensitive("13812345678"), "1**********");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod ids;
pub mod safety;

pub use catalog::{
    is_role, is_scenario, role_label, scenario_label, CatalogEntry, ROLES, SCENARIOS,
    SELF_ROLE_KEY, SELF_ROLE_LABEL,
};
pub use error::{require_role, require_scenario, CoreError, Result};
pub use ids::{AgentProfileId, BindingId, IdError, MessageId, SessionId, UserId};
pub use safety::{check_safety, mask_sensitive, SafetyVerdict};
