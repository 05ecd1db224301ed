//! HTTP and SSE gateway for the reunion family-dinner roleplay stage.
//!
//! This crate provides the public-facing API. It handles:
//!
//! - SecondMe OAuth login with a signed session cookie
//! - JSON endpoints wrapped in a `{ code, message?, data }` envelope
//! - The live stage as a server-sent event stream
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Browser                            │
//! │                     (fetch / EventSource)                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      reunion-gateway                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │   Cookie    │ │   Router    │ │    Stage stream     │   │
//! │  │  Extractor  │ │  + Handlers │ │    (SSE)            │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────────┐             ┌──────────────┐
//!        │   Control    │             │   SecondMe   │
//!        │    Plane     │             │    OAuth     │
//!        └──────────────┘             └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reunion_auth::{AuthConfig, SecondMeClient, SessionSigner};
//! use reunion_control::{ChatClientConfig, ControlConfig, ControlService, HttpChatClient};
//! use reunion_gateway::{create_router, GatewayConfig, GatewayState};
//! use reunion_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/reunion")?);
//! let chat = Arc::new(HttpChatClient::new(&ChatClientConfig::default()));
//! let control = Arc::new(ControlService::new(store, chat, ControlConfig::default()));
//! let provider = Arc::new(SecondMeClient::new(AuthConfig::default()));
//! let signer = SessionSigner::new("change-me")?;
//!
//! let state = GatewayState::new(control, provider, signer, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::{ApiError, Envelope};
pub use extract::ApiJson;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::{AdminUser, CurrentUser};
