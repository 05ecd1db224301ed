//! Control plane service implementation.
//!
//! This module provides the `ControlPlane` trait and `ControlService`, which
//! coordinates accounts, the agent registry, chat sessions and dialogues.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reunion_auth::TokenGrant;
use reunion_core::{SessionId, UserId};
use reunion_store::{Store, User};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::chat_client::ChatClient;
use crate::dialogue::{run_dialogue, validate_cast, Actor, DialogueSpec};
use crate::error::Result;
use crate::stage::{self, ChunkSettings, StageEvent, StagePlan};
use crate::types::{
    AutoDialogueResult, BindRoleRequest, BindingView, ControlConfig, CreateSessionRequest,
    DialogueRequest, PostMessageRequest, PostMessageResult, PublicAgentView, RecentSession,
    RevokeRequest, RoleView, SessionCreated, SessionHistory,
};
use crate::{accounts, registry, session};

/// Trait defining the control plane operations.
///
/// Every operation that acts for a signed-in user takes that user's id;
/// authentication and admin checks happen before these calls.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Record a successful OAuth login and opt the user in as an agent.
    async fn complete_login(&self, grant: &TokenGrant, user_info: Option<&Value>) -> Result<User>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::UserNotFound` if the user doesn't exist.
    async fn get_user(&self, user_id: &UserId) -> Result<User>;

    /// Cache profile fields from a provider user-info payload.
    async fn cache_user_info(&self, user_id: &UserId, payload: &Value) -> Result<User>;

    /// Cache persona tags from a provider shades payload.
    async fn cache_user_shades(&self, user_id: &UserId, payload: &Value) -> Result<User>;

    // =========================================================================
    // Agent Registry Operations
    // =========================================================================

    /// List the public agent directory, opting the viewer in first.
    async fn list_public_agents(&self, viewer: &UserId) -> Result<Vec<PublicAgentView>>;

    /// Bind an agent profile to a persona.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::AgentProfileNotFound` if the profile is missing
    /// or revoked.
    async fn bind_role(&self, admin: &UserId, request: BindRoleRequest) -> Result<BindingView>;

    /// List every role binding.
    async fn list_bindings(&self) -> Result<Vec<BindingView>>;

    /// Revoke an agent profile and disable its bindings.
    async fn revoke_agent(&self, request: RevokeRequest) -> Result<()>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Open a single-persona chat session.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoAgentForRole` if no agent can play the persona.
    async fn create_session(
        &self,
        viewer: &UserId,
        request: CreateSessionRequest,
    ) -> Result<SessionCreated>;

    /// The viewer's most recently updated session.
    async fn recent_session(&self, viewer: &UserId) -> Result<Option<RecentSession>>;

    /// A session's transcript.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::SessionNotFound` if the session isn't the viewer's.
    async fn session_history(&self, viewer: &UserId, session_id: &SessionId)
        -> Result<SessionHistory>;

    /// Post a viewer message and get the persona's reply.
    async fn post_message(
        &self,
        viewer: &UserId,
        request: PostMessageRequest,
    ) -> Result<PostMessageResult>;

    // =========================================================================
    // Dialogue Operations
    // =========================================================================

    /// Run a complete multi-persona dialogue without persisting it.
    async fn auto_dialogue(
        &self,
        viewer: &UserId,
        request: DialogueRequest,
    ) -> Result<AutoDialogueResult>;

    /// Validate a live stage request and open or resume its session.
    async fn prepare_stage(&self, viewer: &UserId, request: DialogueRequest) -> Result<StagePlan>;

    /// Play a prepared stage into `tx`.
    async fn run_stage(&self, plan: StagePlan, tx: mpsc::Sender<StageEvent>) -> Result<()>;

    /// Capacity to use for a stage's event channel.
    fn stage_buffer(&self) -> usize;
}

/// The main control plane service implementation.
pub struct ControlService<S: Store, C: ChatClient> {
    store: Arc<S>,
    chat: Arc<C>,
    config: ControlConfig,
    rng: Mutex<StdRng>,
}

impl<S: Store, C: ChatClient> ControlService<S, C> {
    /// Create a new control plane service with an OS-seeded random source.
    #[must_use]
    pub fn new(store: Arc<S>, chat: Arc<C>, config: ControlConfig) -> Self {
        Self::with_rng(store, chat, config, StdRng::from_os_rng())
    }

    /// Create a service with a given random source.
    #[must_use]
    pub fn with_rng(store: Arc<S>, chat: Arc<C>, config: ControlConfig, rng: StdRng) -> Self {
        Self {
            store,
            chat,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the random source.
    fn draw<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    const fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            size: self.config.chunk_size,
            delay: self.config.chunk_delay,
        }
    }
}

#[async_trait]
impl<S: Store + 'static, C: ChatClient + 'static> ControlPlane for ControlService<S, C> {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn complete_login(&self, grant: &TokenGrant, user_info: Option<&Value>) -> Result<User> {
        accounts::complete_login(&*self.store, grant, user_info)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<User> {
        accounts::get_user(&*self.store, user_id)
    }

    async fn cache_user_info(&self, user_id: &UserId, payload: &Value) -> Result<User> {
        accounts::cache_user_info(&*self.store, user_id, payload)
    }

    async fn cache_user_shades(&self, user_id: &UserId, payload: &Value) -> Result<User> {
        accounts::cache_user_shades(&*self.store, user_id, payload)
    }

    // =========================================================================
    // Agent Registry Operations
    // =========================================================================

    async fn list_public_agents(&self, viewer: &UserId) -> Result<Vec<PublicAgentView>> {
        registry::ensure_agent_profile(&*self.store, viewer)?;
        registry::list_public_profiles(&*self.store)
    }

    async fn bind_role(&self, admin: &UserId, request: BindRoleRequest) -> Result<BindingView> {
        registry::bind_role(&*self.store, admin, &request)
    }

    async fn list_bindings(&self) -> Result<Vec<BindingView>> {
        registry::list_bindings(&*self.store)
    }

    async fn revoke_agent(&self, request: RevokeRequest) -> Result<()> {
        registry::revoke_profile(&*self.store, &request)?;
        Ok(())
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn create_session(
        &self,
        viewer: &UserId,
        request: CreateSessionRequest,
    ) -> Result<SessionCreated> {
        let created =
            self.draw(|rng| session::create_session(&*self.store, viewer, &request, rng))?;
        Ok(session::created_view(&created))
    }

    async fn recent_session(&self, viewer: &UserId) -> Result<Option<RecentSession>> {
        session::recent(&*self.store, viewer)
    }

    async fn session_history(
        &self,
        viewer: &UserId,
        session_id: &SessionId,
    ) -> Result<SessionHistory> {
        session::history(&*self.store, viewer, session_id)
    }

    async fn post_message(
        &self,
        viewer: &UserId,
        request: PostMessageRequest,
    ) -> Result<PostMessageResult> {
        session::post_message(&*self.store, &*self.chat, viewer, &request).await
    }

    // =========================================================================
    // Dialogue Operations
    // =========================================================================

    async fn auto_dialogue(
        &self,
        viewer: &UserId,
        request: DialogueRequest,
    ) -> Result<AutoDialogueResult> {
        let cast = validate_cast(&request, 2)?;
        let selected = self.draw(|rng| {
            registry::pick_bindings_for_roles(&*self.store, &cast.role_keys, rng)
        })?;
        let rounds = self.config.dialogue.resolve_rounds(request.rounds);

        let actors: Vec<Actor> = selected
            .into_iter()
            .map(|s| Actor {
                role_key: s.role_key,
                role_label: s.role_label.to_string(),
                access_token: s.access_token,
            })
            .collect();
        let spec = DialogueSpec {
            actors: &actors,
            scenario_label: cast.scenario_label,
            topic: request.topic.as_deref(),
            rounds,
        };
        let transcript =
            run_dialogue(&*self.chat, &self.config.dialogue.drift, spec, &mut ()).await?;

        tracing::info!(
            viewer = %viewer,
            scenario = %cast.scenario_key,
            turns = transcript.len(),
            "Generated auto dialogue"
        );

        Ok(AutoDialogueResult {
            scenario_key: cast.scenario_key,
            scenario_label: cast.scenario_label.to_string(),
            selected_roles: cast.role_keys.iter().map(|k| RoleView::for_key(k)).collect(),
            transcript,
        })
    }

    async fn prepare_stage(&self, viewer: &UserId, request: DialogueRequest) -> Result<StagePlan> {
        self.draw(|rng| {
            stage::prepare(&*self.store, viewer, &request, &self.config.dialogue, rng)
        })
    }

    async fn run_stage(&self, plan: StagePlan, tx: mpsc::Sender<StageEvent>) -> Result<()> {
        stage::run(
            &*self.store,
            &*self.chat,
            &self.config.dialogue,
            self.chunk_settings(),
            plan,
            tx,
        )
        .await
    }

    fn stage_buffer(&self) -> usize {
        self.config.event_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_client::ScriptedChatClient;
    use crate::error::ControlError;
    use crate::test_support::seed_agent;
    use reunion_store::RocksStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(reply: &str) -> (ControlService<RocksStore, ScriptedChatClient>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let config = ControlConfig {
            chunk_delay: Duration::ZERO,
            ..ControlConfig::default()
        };
        let service = ControlService::with_rng(
            store,
            Arc::new(ScriptedChatClient::always(reply)),
            config,
            StdRng::seed_from_u64(11),
        );
        (service, dir)
    }

    fn grant(code: &str) -> TokenGrant {
        TokenGrant {
            access_token: format!("token-{code}"),
            refresh_token: String::new(),
            expires_in: 7200,
            provider_user_id: Some(format!("sm_{code}")),
        }
    }

    #[tokio::test]
    async fn login_then_directory() {
        let (service, _dir) = setup("好");
        let user = service.complete_login(&grant("a"), None).await.unwrap();

        let directory = service.list_public_agents(&user.user_id).await.unwrap();
        assert_eq!(directory.len(), 1);
        assert_eq!(directory[0].role_count, 0);

        let fetched = service.get_user(&user.user_id).await.unwrap();
        assert_eq!(fetched.access_token, "token-a");
    }

    #[tokio::test]
    async fn auto_dialogue_round_robin() {
        let (service, _dir) = setup("多吃点");
        seed_agent(service.store(), "sm_a", "da-yi", 1);
        seed_agent(service.store(), "sm_b", "er-yi", 1);
        let viewer = UserId::from_provider("viewer");

        let request = DialogueRequest {
            role_keys: Some(vec!["da-yi".into(), "er-yi".into()]),
            scenario_key: Some("housing".into()),
            rounds: Some(4.0),
            ..DialogueRequest::default()
        };
        let result = service.auto_dialogue(&viewer, request).await.unwrap();

        assert_eq!(result.scenario_label, "买房进度追问");
        assert_eq!(result.selected_roles.len(), 2);
        let labels: Vec<&str> = result.transcript.iter().map(|t| t.role_label.as_str()).collect();
        assert_eq!(labels, vec!["大姨", "二姨", "大姨", "二姨"]);
        assert!(service.store().list_sessions_by_viewer(&viewer).unwrap().is_empty());
    }

    #[tokio::test]
    async fn auto_dialogue_requires_two_personas() {
        let (service, _dir) = setup("x");
        let request = DialogueRequest {
            role_keys: Some(vec!["da-yi".into()]),
            scenario_key: Some("housing".into()),
            ..DialogueRequest::default()
        };
        let result = service
            .auto_dialogue(&UserId::from_provider("v"), request)
            .await;
        assert!(matches!(result, Err(ControlError::Validation(_))));
    }

    #[tokio::test]
    async fn stage_through_service() {
        let (service, _dir) = setup("今年回来了啊");
        let viewer = service.complete_login(&grant("viewer"), None).await.unwrap();
        seed_agent(service.store(), "sm_a", "si-gu", 1);

        let request = DialogueRequest {
            role_keys: Some(vec!["si-gu".into()]),
            scenario_key: Some("career".into()),
            rounds: Some(2.0),
            ..DialogueRequest::default()
        };
        let plan = service.prepare_stage(&viewer.user_id, request).await.unwrap();
        let session_id = plan.session_id;

        let (tx, mut rx) = mpsc::channel(service.stage_buffer());
        service.run_stage(plan, tx).await.unwrap();

        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(event.event_name());
        }
        assert_eq!(names, vec!["meta", "chunk", "chunk", "end"]);

        let history = service
            .session_history(&viewer.user_id, &session_id)
            .await
            .unwrap();
        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.messages[1].content, "【四姑】今年回来了啊");
    }
}
