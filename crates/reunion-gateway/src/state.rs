//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use reunion_auth::{IdentityProvider, SessionSigner};
use reunion_control::ControlPlane;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<C, P>
where
    C: ControlPlane,
    P: IdentityProvider,
{
    /// The control plane for agents, sessions and dialogues.
    pub control: Arc<C>,
    /// The OAuth identity provider.
    pub provider: Arc<P>,
    /// Signs and verifies session cookies.
    pub signer: SessionSigner,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<C, P> GatewayState<C, P>
where
    C: ControlPlane,
    P: IdentityProvider,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        control: Arc<C>,
        provider: Arc<P>,
        signer: SessionSigner,
        config: GatewayConfig,
    ) -> Self {
        Self {
            control,
            provider,
            signer,
            config,
        }
    }
}

impl<C, P> Clone for GatewayState<C, P>
where
    C: ControlPlane,
    P: IdentityProvider,
{
    fn clone(&self) -> Self {
        Self {
            control: Arc::clone(&self.control),
            provider: Arc::clone(&self.provider),
            signer: self.signer.clone(),
            config: self.config.clone(),
        }
    }
}
