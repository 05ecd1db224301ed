//! Upstream roleplay chat client.
//!
//! Every persona line is produced by sending a roleplay prompt to the
//! SecondMe chat API with the bound profile owner's access token. The API
//! answers either as an event stream or as a JSON document; both shapes are
//! reduced to a single reply string.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ControlError, Result};

/// Path of the documented streaming chat endpoint.
const OFFICIAL_CHAT_PATH: &str = "/api/secondme/chat/stream";

/// Suffix of the non-streaming chat path that has a `/stream` sibling.
const PLAIN_CHAT_SUFFIX: &str = "/api/secondme/chat";

/// Number of characters of the viewer's message quoted in a fallback reply.
const FALLBACK_QUOTE_CHARS: usize = 24;

/// Configuration for [`HttpChatClient`].
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    /// Base URL of the SecondMe API.
    pub api_base_url: String,
    /// Chat endpoint override, absolute or relative to the base URL.
    pub chat_endpoint: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8081".to_string(),
            chat_endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

impl ChatClientConfig {
    /// Endpoints to try, in order.
    #[must_use]
    pub fn chat_endpoints(&self) -> Vec<String> {
        let official = reunion_auth::join_url(&self.api_base_url, OFFICIAL_CHAT_PATH);
        let Some(configured) = self
            .chat_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return vec![official];
        };

        let configured = if configured.starts_with("http") {
            configured.trim_end_matches('/').to_string()
        } else {
            reunion_auth::join_url(&self.api_base_url, configured)
        };

        let mut endpoints = vec![configured.clone()];
        if configured.ends_with(PLAIN_CHAT_SUFFIX) {
            endpoints.push(format!("{configured}/stream"));
        }
        if !endpoints.contains(&official) {
            endpoints.push(official);
        }
        endpoints
    }
}

/// What a persona is asked to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleplayPrompt {
    /// Persona label the agent plays.
    pub role_label: String,
    /// Scenario label of the conversation.
    pub scenario_label: String,
    /// The message the persona responds to.
    pub message: String,
}

impl RoleplayPrompt {
    /// Render the full instruction sent upstream.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "你现在扮演春节家庭场景里的{}。风格：轻度魔幻但不辱骂、不过界。当前话题：{}。用户消息：{}",
            self.role_label, self.scenario_label, self.message
        )
    }
}

/// A client that turns a roleplay prompt into a reply.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a prompt on behalf of the owner of `access_token`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Upstream` if no endpoint produced a reply.
    async fn send(&self, access_token: &str, prompt: &RoleplayPrompt) -> Result<String>;
}

/// [`ChatClient`] backed by the SecondMe HTTP API.
pub struct HttpChatClient {
    endpoints: Vec<String>,
    client: reqwest::Client,
}

impl HttpChatClient {
    /// Create a new client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(config: &ChatClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to create HTTP client");

        Self {
            endpoints: config.chat_endpoints(),
            client,
        }
    }

    async fn try_endpoint(&self, endpoint: &str, access_token: &str, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "text/event-stream, application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ControlError::Upstream(format!("request failed: {e} ({endpoint})")))?;

        let status = response.status();
        let is_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));
        let raw = response
            .text()
            .await
            .map_err(|e| ControlError::Upstream(format!("read failed: {e} ({endpoint})")))?;

        if !status.is_success() {
            return Err(ControlError::Upstream(format!(
                "SecondMe chat failed: {} ({endpoint})",
                status.as_u16()
            )));
        }

        let reply = if is_stream {
            parse_sse_reply(&raw)
        } else {
            parse_json_reply(&raw)
        };
        reply.ok_or_else(|| {
            ControlError::Upstream(format!("SecondMe chat response missing reply ({endpoint})"))
        })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn send(&self, access_token: &str, prompt: &RoleplayPrompt) -> Result<String> {
        let body = serde_json::json!({ "message": prompt.render() });
        let mut last_error = ControlError::Upstream("SecondMe chat request failed".to_string());

        for endpoint in &self.endpoints {
            match self.try_endpoint(endpoint, access_token, &body).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Chat endpoint failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Concatenate the `choices[0].delta.content` pieces of an event stream.
///
/// Non-JSON data lines and the `[DONE]` marker are ignored. Returns `None`
/// when nothing but whitespace was streamed.
#[must_use]
pub fn parse_sse_reply(raw: &str) -> Option<String> {
    let mut reply = String::new();
    for line in raw.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(payload) else {
            continue;
        };
        if let Some(piece) = event
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            reply.push_str(piece);
        }
    }

    let reply = reply.trim();
    (!reply.is_empty()).then(|| reply.to_string())
}

/// Read `reply`, `content` or `message` from a JSON body, under `data` if present.
#[must_use]
pub fn parse_json_reply(raw: &str) -> Option<String> {
    let body: Value = serde_json::from_str(raw).ok()?;
    let result = match body.get("data") {
        Some(data) if !data.is_null() => data,
        _ => &body,
    };
    ["reply", "content", "message"].iter().find_map(|key| {
        result
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// A persona reply, possibly degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    /// Masked reply text.
    pub reply: String,
    /// Whether the upstream failed and a template was used instead.
    pub fallback: bool,
}

/// Ask a persona for a reply, degrading to a template on upstream failure.
///
/// The returned text is always masked.
pub async fn generate_reply<C: ChatClient + ?Sized>(
    client: &C,
    access_token: &str,
    prompt: &RoleplayPrompt,
) -> AgentReply {
    match client.send(access_token, prompt).await {
        Ok(reply) => AgentReply {
            reply: reunion_core::mask_sensitive(&reply),
            fallback: false,
        },
        Err(e) => {
            tracing::warn!(role = %prompt.role_label, error = %e, "Roleplay chat fallback");
            let quoted: String = reunion_core::mask_sensitive(&prompt.message)
                .chars()
                .take(FALLBACK_QUOTE_CHARS)
                .collect();
            AgentReply {
                reply: format!(
                    "【{}】哎呀，这事我先记下了。你刚才说“{quoted}...”，回家再慢慢唠。",
                    prompt.role_label
                ),
                fallback: true,
            }
        }
    }
}

/// Scripted [`ChatClient`] for tests.
///
/// Returns queued responses in order, then `default_reply` (or an error when
/// there is none). Every call is recorded.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct ScriptedChatClient {
    responses: tokio::sync::Mutex<std::collections::VecDeque<std::result::Result<String, String>>>,
    default_reply: Option<String>,
    calls: tokio::sync::Mutex<Vec<(String, RoleplayPrompt)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ScriptedChatClient {
    /// A client that always answers `reply`.
    #[must_use]
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            default_reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// A client that always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.responses.lock().await.push_back(Ok(reply.into()));
    }

    /// Queue a failure.
    pub async fn push_failure(&self, message: impl Into<String>) {
        self.responses.lock().await.push_back(Err(message.into()));
    }

    /// Every `(access_token, prompt)` sent so far.
    pub async fn calls(&self) -> Vec<(String, RoleplayPrompt)> {
        self.calls.lock().await.clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn send(&self, access_token: &str, prompt: &RoleplayPrompt) -> Result<String> {
        self.calls
            .lock()
            .await
            .push((access_token.to_string(), prompt.clone()));

        match self.responses.lock().await.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ControlError::Upstream(message)),
            None => self
                .default_reply
                .clone()
                .ok_or_else(|| ControlError::Upstream("no scripted reply".to_string())),
        }
    }
}
