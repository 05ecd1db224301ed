//! Live stage: a streamed multi-persona dialogue with the viewer seated.
//!
//! A stage is prepared synchronously (validation, agent selection, session
//! creation or resumption) so request errors surface before any event is
//! sent. The run then emits `meta`, one `chunk` per slice of every turn and
//! finally `end`, or `error` if the dialogue is cut short.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reunion_core::{MessageId, SessionId, UserId, SELF_ROLE_KEY, SELF_ROLE_LABEL};
use reunion_store::{ChatMessage, ChatSession, MessageSender, SessionStatus, Store};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::chat_client::ChatClient;
use crate::dialogue::{
    run_dialogue, validate_cast, Actor, DialogueConfig, DialogueSpec, DialogueTurn, TurnObserver,
};
use crate::error::{ControlError, Result};
use crate::registry;
use crate::types::{DialogueRequest, RoleView};

/// Opening event describing the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMeta {
    /// Session the transcript is written to.
    pub session_id: SessionId,
    /// Scenario key.
    pub scenario_key: String,
    /// Scenario label.
    pub scenario_label: String,
    /// Number of turns that will be played.
    pub rounds: u32,
    /// Seated personas, the viewer first.
    pub roles: Vec<RoleView>,
}

/// One slice of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChunk {
    /// 1-based turn number.
    pub turn: u32,
    /// Speaking persona.
    pub role_key: String,
    /// Speaking persona's label.
    pub role_label: String,
    /// Text of this slice.
    pub delta: String,
    /// Whether the turn is degraded.
    pub fallback: bool,
    /// Whether this is the turn's last slice.
    pub done: bool,
}

/// An event on the stage stream. The event name is [`StageEvent::event_name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StageEvent {
    /// Stage description, always first.
    Meta(StageMeta),
    /// A slice of a turn.
    Chunk(StageChunk),
    /// The stage ended early.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// The stage finished.
    End {
        /// Always true.
        done: bool,
    },
}

impl StageEvent {
    /// SSE event name.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Meta(_) => "meta",
            Self::Chunk(_) => "chunk",
            Self::Error { .. } => "error",
            Self::End { .. } => "end",
        }
    }
}

/// Split `text` into slices of `size` characters.
///
/// Empty text yields a single empty slice.
#[must_use]
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return vec![text.to_string()];
    }
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// Everything a stage run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct StagePlan {
    /// Session the transcript is written to.
    pub session_id: SessionId,
    /// Scenario key.
    pub scenario_key: String,
    /// Scenario label.
    pub scenario_label: &'static str,
    /// Optional topic for the opening line.
    pub topic: Option<String>,
    /// Number of turns.
    pub rounds: u32,
    /// Speakers, the viewer first.
    pub actors: Vec<Actor>,
}

impl StagePlan {
    fn meta(&self) -> StageMeta {
        StageMeta {
            session_id: self.session_id,
            scenario_key: self.scenario_key.clone(),
            scenario_label: self.scenario_label.to_string(),
            rounds: self.rounds,
            roles: self
                .actors
                .iter()
                .map(|a| RoleView {
                    role_key: a.role_key.clone(),
                    role_label: a.role_label.clone(),
                })
                .collect(),
        }
    }
}

/// Validate a stage request, pick agents and open or resume the session.
///
/// # Errors
///
/// - `ControlError::Validation` for a malformed request
/// - `ControlError::UserNotFound` if the viewer has no user record
/// - `ControlError::NoAgentForRole` if a persona has no available agent
/// - `ControlError::SessionNotFound` if a resumed session isn't the viewer's
pub fn prepare<S, R>(
    store: &S,
    viewer_id: &UserId,
    request: &DialogueRequest,
    dialogue: &DialogueConfig,
    rng: &mut R,
) -> Result<StagePlan>
where
    S: Store,
    R: Rng + ?Sized,
{
    let cast = validate_cast(request, 1)?;
    let viewer = store
        .get_user(viewer_id)?
        .ok_or(ControlError::UserNotFound(*viewer_id))?;
    let selected = registry::pick_bindings_for_roles(store, &cast.role_keys, rng)?;
    let rounds = dialogue.resolve_rounds(request.rounds);

    let resume = request
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let session_id = if let Some(raw) = resume {
        let session_id: SessionId = raw
            .parse()
            .map_err(|_| ControlError::Validation("无效 sessionId".to_string()))?;
        let session = store
            .get_session(&session_id)?
            .filter(|s| s.viewer_user_id == *viewer_id)
            .ok_or(ControlError::SessionNotFound(session_id))?;
        store.update_session_status(&session.session_id, SessionStatus::Active)?;
        session_id
    } else {
        let now = Utc::now();
        let session = ChatSession {
            session_id: SessionId::generate(),
            viewer_user_id: *viewer_id,
            role_key: cast.role_keys[0].clone(),
            scenario_key: cast.scenario_key.clone(),
            agent_profile_id: selected[0].binding.agent_profile_id,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        store.put_session(&session)?;
        session.session_id
    };

    let mut actors = Vec::with_capacity(selected.len() + 1);
    actors.push(Actor {
        role_key: SELF_ROLE_KEY.to_string(),
        role_label: SELF_ROLE_LABEL.to_string(),
        access_token: viewer.access_token,
    });
    actors.extend(selected.into_iter().map(|s| Actor {
        role_key: s.role_key,
        role_label: s.role_label.to_string(),
        access_token: s.access_token,
    }));

    tracing::info!(
        session_id = %session_id,
        viewer = %viewer_id,
        scenario = %cast.scenario_key,
        rounds,
        actors = actors.len(),
        "Prepared live stage"
    );

    Ok(StagePlan {
        session_id,
        scenario_key: cast.scenario_key,
        scenario_label: cast.scenario_label,
        topic: request.topic.clone(),
        rounds,
        actors,
    })
}

/// Stream settings.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSettings {
    /// Characters per chunk.
    pub size: usize,
    /// Pause after each chunk.
    pub delay: Duration,
}

async fn emit(tx: &mpsc::Sender<StageEvent>, event: StageEvent) -> Result<()> {
    tx.send(event).await.map_err(|_| ControlError::StreamClosed)
}

struct StageEmitter<'a, S> {
    store: &'a S,
    session_id: SessionId,
    tx: &'a mpsc::Sender<StageEvent>,
    chunks: ChunkSettings,
}

#[async_trait]
impl<S: Store> TurnObserver for StageEmitter<'_, S> {
    async fn on_turn(&mut self, turn: &DialogueTurn) -> Result<()> {
        let message = ChatMessage {
            message_id: MessageId::generate(),
            session_id: self.session_id,
            sender: MessageSender::Agent,
            content: format!("【{}】{}", turn.role_label, turn.content),
            masked: true,
            created_at: Utc::now(),
        };
        self.store.append_message(&message)?;

        let pieces = chunk_text(&turn.content, self.chunks.size);
        let last = pieces.len() - 1;
        for (i, delta) in pieces.into_iter().enumerate() {
            let chunk = StageChunk {
                turn: turn.turn,
                role_key: turn.role_key.clone(),
                role_label: turn.role_label.clone(),
                delta,
                fallback: turn.fallback,
                done: i == last,
            };
            emit(self.tx, StageEvent::Chunk(chunk)).await?;
            if !self.chunks.delay.is_zero() {
                tokio::time::sleep(self.chunks.delay).await;
            }
        }
        Ok(())
    }
}

fn close_session<S: Store>(store: &S, session_id: &SessionId) {
    if let Err(e) = store.update_session_status(session_id, SessionStatus::Closed) {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to close stage session");
    }
}

/// Play a prepared stage, sending events to `tx`.
///
/// The session is closed whatever the outcome. If the receiver goes away the
/// run stops at the next send.
///
/// # Errors
///
/// Returns `ControlError::StreamClosed` if the receiver dropped, or the error
/// that cut the dialogue short after it has been reported as an `error` event.
pub async fn run<S, C>(
    store: &S,
    client: &C,
    dialogue: &DialogueConfig,
    chunks: ChunkSettings,
    plan: StagePlan,
    tx: mpsc::Sender<StageEvent>,
) -> Result<()>
where
    S: Store,
    C: ChatClient + ?Sized,
{
    let session_id = plan.session_id;
    let outcome = play(store, client, dialogue, chunks, &plan, &tx).await;

    close_session(store, &session_id);
    match outcome {
        Ok(turns) => {
            tracing::info!(session_id = %session_id, turns, "Live stage finished");
            emit(&tx, StageEvent::End { done: true }).await
        }
        Err(ControlError::StreamClosed) => {
            tracing::info!(session_id = %session_id, "Live stage receiver went away");
            Err(ControlError::StreamClosed)
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Live stage aborted");
            emit(
                &tx,
                StageEvent::Error {
                    message: e.to_string(),
                },
            )
            .await?;
            Err(e)
        }
    }
}

async fn play<S, C>(
    store: &S,
    client: &C,
    dialogue: &DialogueConfig,
    chunks: ChunkSettings,
    plan: &StagePlan,
    tx: &mpsc::Sender<StageEvent>,
) -> Result<usize>
where
    S: Store,
    C: ChatClient + ?Sized,
{
    emit(tx, StageEvent::Meta(plan.meta())).await?;

    let mut emitter = StageEmitter {
        store,
        session_id: plan.session_id,
        tx,
        chunks,
    };
    let spec = DialogueSpec {
        actors: &plan.actors,
        scenario_label: plan.scenario_label,
        topic: plan.topic.as_deref(),
        rounds: plan.rounds,
    };
    let transcript = run_dialogue(client, &dialogue.drift, spec, &mut emitter).await?;
    Ok(transcript.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_client::ScriptedChatClient;
    use crate::test_support::{seed_agent, seed_user, test_store};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NO_DELAY: ChunkSettings = ChunkSettings {
        size: 10,
        delay: Duration::ZERO,
    };

    fn stage_request(keys: &[&str], rounds: f64) -> DialogueRequest {
        DialogueRequest {
            role_keys: Some(keys.iter().map(ToString::to_string).collect()),
            scenario_key: Some("marriage".to_string()),
            rounds: Some(rounds),
            ..DialogueRequest::default()
        }
    }

    #[test]
    fn chunking_counts_characters() {
        assert_eq!(chunk_text("", 10), vec![""]);
        assert_eq!(chunk_text("过年好", 10), vec!["过年好"]);

        let text = "一二三四五六七八九十壹贰";
        assert_eq!(chunk_text(text, 10), vec!["一二三四五六七八九十", "壹贰"]);
    }

    #[test]
    fn event_names_and_payloads() {
        let end = StageEvent::End { done: true };
        assert_eq!(end.event_name(), "end");
        assert_eq!(serde_json::to_value(&end).unwrap(), serde_json::json!({ "done": true }));

        let chunk = StageEvent::Chunk(StageChunk {
            turn: 1,
            role_key: "da-yi".into(),
            role_label: "大姨".into(),
            delta: "你好".into(),
            fallback: false,
            done: true,
        });
        assert_eq!(chunk.event_name(), "chunk");
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["roleKey"], "da-yi");
        assert_eq!(json["delta"], "你好");
    }

    #[tokio::test]
    async fn stage_streams_and_persists() {
        let (store, _dir) = test_store();
        let viewer = seed_user(&store, "viewer");
        seed_agent(&store, "sm_a", "da-yi", 1);
        let mut rng = StdRng::seed_from_u64(1);

        let plan = prepare(
            &store,
            &viewer.user_id,
            &stage_request(&["da-yi"], 3.0),
            &DialogueConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(plan.actors[0].role_key, "self");
        assert_eq!(plan.actors[0].access_token, viewer.access_token);

        let client = ScriptedChatClient::always("*叹气* 孩子啊，今年有没有带对象回来呀？");
        let (tx, mut rx) = mpsc::channel(256);
        let session_id = plan.session_id;
        run(&store, &client, &DialogueConfig::default(), NO_DELAY, plan, tx)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let StageEvent::Meta(meta) = &events[0] else {
            panic!("first event must be meta");
        };
        assert_eq!(meta.rounds, 3);
        assert_eq!(meta.roles[0].role_label, "我");
        assert_eq!(meta.roles[1].role_label, "大姨");
        assert_eq!(events.last(), Some(&StageEvent::End { done: true }));

        let chunks: Vec<&StageChunk> = events
            .iter()
            .filter_map(|e| match e {
                StageEvent::Chunk(c) => Some(c),
                _ => None,
            })
            .collect();
        // "孩子啊，今年有没有带对象回来呀？" is 16 characters: two slices per turn.
        assert_eq!(chunks.len(), 6);
        assert!(chunks.iter().all(|c| c.delta.chars().count() <= 10));
        assert_eq!(chunks.iter().filter(|c| c.done).count(), 3);
        assert_eq!(chunks[0].role_key, "self");
        assert_eq!(chunks[2].role_key, "da-yi");

        let messages = store.list_messages(&session_id).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "【大姨】孩子啊，今年有没有带对象回来呀？");
        assert!(messages.iter().all(|m| m.sender == MessageSender::Agent));
        assert!(!messages[0].content.contains('*'));

        let session = store.get_session(&session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn resuming_foreign_session_is_not_found() {
        let (store, _dir) = test_store();
        let owner = seed_user(&store, "owner");
        let intruder = seed_user(&store, "intruder");
        seed_agent(&store, "sm_a", "da-yi", 1);
        let mut rng = StdRng::seed_from_u64(1);

        let plan = prepare(
            &store,
            &owner.user_id,
            &stage_request(&["da-yi"], 1.0),
            &DialogueConfig::default(),
            &mut rng,
        )
        .unwrap();

        let mut request = stage_request(&["da-yi"], 1.0);
        request.session_id = Some(plan.session_id.to_string());
        let result = prepare(
            &store,
            &intruder.user_id,
            &request,
            &DialogueConfig::default(),
            &mut rng,
        );
        assert!(matches!(result, Err(ControlError::SessionNotFound(_))));

        store
            .update_session_status(&plan.session_id, SessionStatus::Closed)
            .unwrap();
        let resumed = prepare(&store, &owner.user_id, &request, &DialogueConfig::default(), &mut rng)
            .unwrap();
        assert_eq!(resumed.session_id, plan.session_id);
        let session = store.get_session(&plan.session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn missing_agent_fails_before_session_creation() {
        let (store, _dir) = test_store();
        let viewer = seed_user(&store, "viewer");
        let mut rng = StdRng::seed_from_u64(1);

        let result = prepare(
            &store,
            &viewer.user_id,
            &stage_request(&["qi-da-ye"], 2.0),
            &DialogueConfig::default(),
            &mut rng,
        );
        assert!(matches!(result, Err(ControlError::NoAgentForRole("七大爷"))));
        assert!(store.list_sessions_by_viewer(&viewer.user_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_receiver_closes_session() {
        let (store, _dir) = test_store();
        let viewer = seed_user(&store, "viewer");
        seed_agent(&store, "sm_a", "da-yi", 1);
        let mut rng = StdRng::seed_from_u64(1);
        let plan = prepare(
            &store,
            &viewer.user_id,
            &stage_request(&["da-yi"], 4.0),
            &DialogueConfig::default(),
            &mut rng,
        )
        .unwrap();
        let session_id = plan.session_id;

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let client = ScriptedChatClient::always("好");
        let result = run(&store, &client, &DialogueConfig::default(), NO_DELAY, plan, tx).await;

        assert!(matches!(result, Err(ControlError::StreamClosed)));
        let session = store.get_session(&session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
    }
}
