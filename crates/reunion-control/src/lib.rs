//! Control plane for reunion family-dinner roleplay.
//!
//! This crate provides the business logic behind the HTTP gateway: user
//! accounts, the agent registry with weighted persona selection, single
//! persona chat sessions and multi-persona dialogues, streamed or not.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP/SSE)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ControlService                        │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌───────────────┐  │
//! │  │ Accounts │ │ Registry │ │ Sessions │ │ Dialogue/Stage│  │
//! │  └──────────┘ └──────────┘ └──────────┘ └───────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────────┐             ┌──────────────┐
//!        │    Store     │             │  ChatClient  │
//!        │  (RocksDB)   │             │  (SecondMe)  │
//!        └──────────────┘             └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use reunion_control::{
//!     ChatClientConfig, ControlConfig, ControlPlane, ControlService, CreateSessionRequest,
//!     HttpChatClient,
//! };
//! use reunion_store::RocksStore;
//! use reunion_core::UserId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/reunion")?);
//! let chat = Arc::new(HttpChatClient::new(&ChatClientConfig::default()));
//! let control = ControlService::new(store, chat, ControlConfig::default());
//!
//! let viewer = UserId::from_provider("sm_1024");
//! let request = CreateSessionRequest {
//!     role_key: Some("da-yi".to_string()),
//!     scenario_key: Some("marriage".to_string()),
//! };
//! let session = control.create_session(&viewer, request).await?;
//! println!("Talking to {} in {}", session.role_label, session.session_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Dialogue
//!
//! Personas speak round-robin, each seeing only the previous line. Replies
//! that slip out of character are retried once and then replaced with a
//! neutral line. See the [`dialogue`] module.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accounts;
pub mod chat_client;
pub mod dialogue;
pub mod error;
pub mod registry;
pub mod service;
pub mod session;
pub mod stage;
pub mod types;

#[cfg(test)]
mod test_support;

pub use chat_client::{
    AgentReply, ChatClient, ChatClientConfig, HttpChatClient, RoleplayPrompt,
};
pub use dialogue::{DialogueConfig, DialogueTurn, DriftDetector};
pub use error::{ControlError, Result};
pub use service::{ControlPlane, ControlService};
pub use stage::{StageEvent, StagePlan};
pub use types::{
    AutoDialogueResult, BindRoleRequest, BindingView, ControlConfig, CreateSessionRequest,
    DialogueRequest, PostMessageRequest, PostMessageResult, PublicAgentView, RecentSession,
    RevokeRequest, RoleView, SessionCreated, SessionHistory, UserSummary,
};

#[cfg(any(test, feature = "test-utils"))]
pub use chat_client::ScriptedChatClient;

// Re-export commonly used types from dependencies for convenience
pub use reunion_core::{AgentProfileId, SessionId, UserId};
pub use reunion_store::{SessionStatus, User};
