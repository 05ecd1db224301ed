//! Turn-taking dialogue between personas.
//!
//! Actors speak round-robin. Each turn sees only the previous line, and its
//! reply is normalized and checked for role drift before it is accepted.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

use crate::chat_client::{generate_reply, ChatClient, RoleplayPrompt};
use crate::error::{ControlError, Result};
use crate::types::DialogueRequest;

/// Lower bound of a dialogue's round count.
pub const MIN_ROUNDS: u32 = 1;

/// Upper bound of a dialogue's round count.
pub const MAX_ROUNDS: u32 = 20;

/// Phrases that mark a persona slipping into a young professional's voice.
pub const DEFAULT_DRIFT_PATTERNS: &[&str] = &[
    "我现在主要",
    "我更想",
    "我还在学习阶段",
    "提升技术",
    "探索副业",
    "前端这行",
    "攒够首付",
];

/// Content of a turn that kept drifting after its retry.
pub const DRIFT_FALLBACK_LINE: &str = "这事儿先别急，咱们边吃边聊，慢慢说。";

/// Detects replies that break character.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    patterns: Vec<Regex>,
}

impl DriftDetector {
    /// Compile a detector from regular expressions.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if a pattern fails to compile.
    pub fn new<I, P>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    ControlError::Validation(format!("invalid drift pattern {:?}: {e}", p.as_ref()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether `reply` breaks character for `role_key`.
    ///
    /// The viewer's own persona never drifts.
    #[must_use]
    pub fn is_drift(&self, reply: &str, role_key: &str) -> bool {
        role_key != reunion_core::SELF_ROLE_KEY && self.patterns.iter().any(|p| p.is_match(reply))
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the detector has no patterns and never fires.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for DriftDetector {
    fn default() -> Self {
        static DEFAULT: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = DEFAULT.get_or_init(|| {
            DEFAULT_DRIFT_PATTERNS
                .iter()
                .map(|p| Regex::new(&regex::escape(p)).expect("drift phrase compiles"))
                .collect()
        });
        Self {
            patterns: patterns.clone(),
        }
    }
}

/// Dialogue settings.
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// Rounds used when a request omits them or sends zero.
    pub default_rounds: u32,
    /// Role-drift detector applied to every turn.
    pub drift: DriftDetector,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            default_rounds: 8,
            drift: DriftDetector::default(),
        }
    }
}

impl DialogueConfig {
    /// Round count for a request: absent, zero or non-finite means the
    /// default, anything else is truncated and clamped.
    #[must_use]
    pub fn resolve_rounds(&self, requested: Option<f64>) -> u32 {
        match requested {
            Some(rounds) if rounds.is_finite() && rounds != 0.0 => clamp_rounds(rounds),
            _ => clamp_rounds(f64::from(self.default_rounds)),
        }
    }
}

/// Clamp a requested round count into `[MIN_ROUNDS, MAX_ROUNDS]`, dropping
/// any fraction.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_rounds(rounds: f64) -> u32 {
    if rounds.is_nan() {
        return MIN_ROUNDS;
    }
    rounds
        .trunc()
        .clamp(f64::from(MIN_ROUNDS), f64::from(MAX_ROUNDS)) as u32
}

/// The validated cast and setting of a dialogue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueCast {
    /// Distinct persona keys, in request order.
    pub role_keys: Vec<String>,
    /// Scenario key.
    pub scenario_key: String,
    /// Scenario label.
    pub scenario_label: &'static str,
}

/// Validate the personas and scenario of a dialogue request.
///
/// # Errors
///
/// Returns `ControlError::Validation` if fewer than `min_roles` distinct
/// personas are given, any persona is unknown, or the scenario is missing or
/// unknown.
pub fn validate_cast(request: &DialogueRequest, min_roles: usize) -> Result<DialogueCast> {
    let role_keys = request.distinct_role_keys();
    if role_keys.len() < min_roles {
        let message = if min_roles > 1 {
            "至少选择两个角色"
        } else {
            "至少选择一个亲戚角色"
        };
        return Err(ControlError::Validation(message.to_string()));
    }
    if !role_keys.iter().all(|key| reunion_core::is_role(key)) {
        return Err(ControlError::Validation("包含无效角色".to_string()));
    }

    let scenario_key = request
        .scenario_key
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ControlError::Validation("scenarioKey 必填".to_string()))?;
    let scenario_label = reunion_core::require_scenario(scenario_key)?;

    Ok(DialogueCast {
        role_keys,
        scenario_key: scenario_key.to_string(),
        scenario_label,
    })
}

/// A speaker in a dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Persona key.
    pub role_key: String,
    /// Persona label, used in prompts and transcripts.
    pub role_label: String,
    /// Credential the persona speaks with.
    pub access_token: String,
}

/// One accepted line of a dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueTurn {
    /// 1-based turn number.
    pub turn: u32,
    /// Speaking persona.
    pub role_key: String,
    /// Speaking persona's label.
    pub role_label: String,
    /// Normalized, masked content.
    pub content: String,
    /// Whether any attempt for this turn degraded.
    pub fallback: bool,
}

/// Receives each turn as soon as it is final.
#[async_trait]
pub trait TurnObserver: Send {
    /// Handle a finished turn. An error aborts the dialogue.
    async fn on_turn(&mut self, turn: &DialogueTurn) -> Result<()>;
}

#[async_trait]
impl TurnObserver for () {
    async fn on_turn(&mut self, _turn: &DialogueTurn) -> Result<()> {
        Ok(())
    }
}

fn stage_direction() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[*＊][^*＊\n]{0,100}[*＊]").expect("stage pattern compiles"))
}

fn whitespace() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern compiles"))
}

/// Strip `*stage directions*` and collapse whitespace.
#[must_use]
pub fn normalize_reply(text: &str) -> String {
    let stripped = stage_direction().replace_all(text, "");
    whitespace()
        .replace_all(stripped.trim(), " ")
        .trim()
        .to_string()
}

/// The line the first speaker responds to.
#[must_use]
pub fn opening_line(topic: Option<&str>, scenario_label: &str) -> String {
    let subject = topic
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(scenario_label);
    format!("大家围坐吃饭，话题是：{subject}。谁先开口？")
}

fn turn_message(previous: &str) -> String {
    format!("上一句是：{previous}\n请你继续接话，控制在80字以内。")
}

fn retry_message(base: &str, role_label: &str) -> String {
    format!(
        "{base}\n你刚才串角色了。只能扮演{role_label}这个长辈，不能用年轻人“我”的职业口吻。重写一句。"
    )
}

/// Produce one turn for `actor`, retrying once on drift.
pub async fn generate_turn<C: ChatClient + ?Sized>(
    client: &C,
    drift: &DriftDetector,
    actor: &Actor,
    scenario_label: &str,
    previous: &str,
    turn: u32,
) -> DialogueTurn {
    let base = turn_message(previous);
    let mut prompt = RoleplayPrompt {
        role_label: actor.role_label.clone(),
        scenario_label: scenario_label.to_string(),
        message: base,
    };

    let first = generate_reply(client, &actor.access_token, &prompt).await;
    let mut content = normalize_reply(&first.reply);
    let mut fallback = first.fallback;

    if drift.is_drift(&content, &actor.role_key) {
        tracing::debug!(turn, role_key = %actor.role_key, "Role drift, retrying");
        prompt.message = retry_message(&prompt.message, &actor.role_label);
        let retry = generate_reply(client, &actor.access_token, &prompt).await;
        content = normalize_reply(&retry.reply);
        fallback |= retry.fallback;
    }

    if drift.is_drift(&content, &actor.role_key) {
        tracing::info!(turn, role_key = %actor.role_key, "Role drift persisted, using fallback line");
        content = DRIFT_FALLBACK_LINE.to_string();
        fallback = true;
    }

    DialogueTurn {
        turn,
        role_key: actor.role_key.clone(),
        role_label: actor.role_label.clone(),
        content,
        fallback,
    }
}

/// Parameters of one dialogue run.
#[derive(Debug, Clone)]
pub struct DialogueSpec<'a> {
    /// Speakers, in speaking order.
    pub actors: &'a [Actor],
    /// Scenario label given to every prompt.
    pub scenario_label: &'a str,
    /// Topic overriding the scenario label in the opening line.
    pub topic: Option<&'a str>,
    /// Number of turns, already clamped.
    pub rounds: u32,
}

/// Run a full dialogue, handing each turn to `observer` as it completes.
///
/// # Errors
///
/// Returns `ControlError::Validation` if there are no actors, or the
/// observer's error if it rejects a turn.
pub async fn run_dialogue<C, O>(
    client: &C,
    drift: &DriftDetector,
    spec: DialogueSpec<'_>,
    observer: &mut O,
) -> Result<Vec<DialogueTurn>>
where
    C: ChatClient + ?Sized,
    O: TurnObserver + ?Sized,
{
    if spec.actors.is_empty() {
        return Err(ControlError::Validation("至少选择一个亲戚角色".to_string()));
    }

    let mut previous = opening_line(spec.topic, spec.scenario_label);
    let mut transcript = Vec::new();

    for (turn, actor) in (1..=spec.rounds).zip(spec.actors.iter().cycle()) {
        let line = generate_turn(client, drift, actor, spec.scenario_label, &previous, turn).await;
        observer.on_turn(&line).await?;
        previous = format!("{}：{}", line.role_label, line.content);
        transcript.push(line);
    }

    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_client::ScriptedChatClient;

    fn actor(key: &str) -> Actor {
        Actor {
            role_key: key.to_string(),
            role_label: reunion_core::role_label(key).to_string(),
            access_token: format!("token-{key}"),
        }
    }

    #[test]
    fn rounds_are_clamped() {
        assert_eq!(clamp_rounds(0.0), 1);
        assert_eq!(clamp_rounds(-3.0), 1);
        assert_eq!(clamp_rounds(5.0), 5);
        assert_eq!(clamp_rounds(999.0), 20);
        assert_eq!(clamp_rounds(2.5), 2);
        assert_eq!(clamp_rounds(0.4), 1);
        assert_eq!(clamp_rounds(f64::NAN), 1);

        let config = DialogueConfig::default();
        assert_eq!(config.resolve_rounds(None), 8);
        assert_eq!(config.resolve_rounds(Some(0.0)), 8);
        assert_eq!(config.resolve_rounds(Some(f64::INFINITY)), 8);
        assert_eq!(config.resolve_rounds(Some(3.0)), 3);
        assert_eq!(config.resolve_rounds(Some(1e20)), 20);
        assert_eq!(config.resolve_rounds(Some(-1e20)), 1);
    }

    #[test]
    fn stage_directions_are_stripped() {
        assert_eq!(normalize_reply("*sighs* 又胖了啊"), "又胖了啊");
        assert_eq!(normalize_reply("好啊＊笑＊  那  就\n这样"), "好啊 那 就 这样");
    }

    #[test]
    fn opening_prefers_topic() {
        assert_eq!(
            opening_line(Some("  考公  "), "催婚突击"),
            "大家围坐吃饭，话题是：考公。谁先开口？"
        );
        assert_eq!(
            opening_line(Some(" "), "催婚突击"),
            "大家围坐吃饭，话题是：催婚突击。谁先开口？"
        );
    }

    #[test]
    fn cast_validation() {
        let request = |keys: &[&str], scenario: Option<&str>| DialogueRequest {
            role_keys: Some(keys.iter().map(ToString::to_string).collect()),
            scenario_key: scenario.map(ToString::to_string),
            ..DialogueRequest::default()
        };

        let cast = validate_cast(&request(&["da-yi", "er-yi", "da-yi"], Some("salary")), 2).unwrap();
        assert_eq!(cast.role_keys, vec!["da-yi", "er-yi"]);
        assert_eq!(cast.scenario_label, "年终奖盘问");

        let too_few = validate_cast(&request(&["da-yi", "da-yi"], Some("salary")), 2);
        assert!(matches!(too_few, Err(ControlError::Validation(m)) if m == "至少选择两个角色"));

        let unknown = validate_cast(&request(&["da-yi", "self"], Some("salary")), 1);
        assert!(matches!(unknown, Err(ControlError::Validation(m)) if m == "包含无效角色"));

        let missing = validate_cast(&request(&["da-yi"], None), 1);
        assert!(matches!(missing, Err(ControlError::Validation(m)) if m == "scenarioKey 必填"));

        let bad_scenario = validate_cast(&request(&["da-yi"], Some("weather")), 1);
        assert!(matches!(bad_scenario, Err(ControlError::Validation(m)) if m == "无效场景"));
    }

    #[test]
    fn drift_detection_skips_self() {
        let detector = DriftDetector::default();
        assert_eq!(detector.len(), DEFAULT_DRIFT_PATTERNS.len());
        assert!(detector.is_drift("我现在主要在做前端", "da-yi"));
        assert!(!detector.is_drift("我现在主要在做前端", "self"));
        assert!(!detector.is_drift("多吃点菜", "da-yi"));
    }

    #[test]
    fn custom_drift_patterns() {
        let detector = DriftDetector::new(["年薪\\d+"]).unwrap();
        assert!(detector.is_drift("我年薪30万", "er-yi"));
        assert!(!detector.is_drift("我现在主要在做前端", "er-yi"));
        assert!(DriftDetector::new(["("]).is_err());
    }

    #[tokio::test]
    async fn two_personas_alternate() {
        let client = ScriptedChatClient::always("吃菜吃菜");
        let actors = vec![actor("da-yi"), actor("er-yi")];
        let spec = DialogueSpec {
            actors: &actors,
            scenario_label: "催婚突击",
            topic: None,
            rounds: 4,
        };

        let transcript = run_dialogue(&client, &DriftDetector::default(), spec, &mut ())
            .await
            .unwrap();

        let keys: Vec<&str> = transcript.iter().map(|t| t.role_key.as_str()).collect();
        assert_eq!(keys, vec!["da-yi", "er-yi", "da-yi", "er-yi"]);
        let turns: Vec<u32> = transcript.iter().map(|t| t.turn).collect();
        assert_eq!(turns, vec![1, 2, 3, 4]);

        let calls = client.calls().await;
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].0, "token-da-yi");
        assert!(calls[0].1.message.contains("话题是：催婚突击"));
        assert!(calls[1].1.message.starts_with("上一句是：大姨：吃菜吃菜"));
    }

    #[tokio::test]
    async fn drift_retries_once_then_falls_back() {
        let client = ScriptedChatClient::default();
        client.push_reply("我现在主要做后端").await;
        client.push_reply("我更想去大厂").await;
        let drift = DriftDetector::default();

        let line = generate_turn(&client, &drift, &actor("san-jiu"), "年终奖盘问", "开场", 1).await;
        assert_eq!(line.content, DRIFT_FALLBACK_LINE);
        assert!(line.fallback);

        let calls = client.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1.message.contains("只能扮演三舅这个长辈"));
    }

    #[tokio::test]
    async fn drift_retry_can_recover() {
        let client = ScriptedChatClient::default();
        client.push_reply("我还在学习阶段").await;
        client.push_reply("*拍桌子* 年终奖发了多少？").await;

        let line = generate_turn(
            &client,
            &DriftDetector::default(),
            &actor("san-jiu"),
            "年终奖盘问",
            "开场",
            1,
        )
        .await;
        assert_eq!(line.content, "年终奖发了多少？");
        assert!(!line.fallback);
    }

    #[tokio::test]
    async fn upstream_failure_marks_fallback() {
        let client = ScriptedChatClient::failing();
        let line = generate_turn(
            &client,
            &DriftDetector::default(),
            &actor("da-yi"),
            "催婚突击",
            "开场",
            1,
        )
        .await;
        assert!(line.fallback);
        assert!(line.content.starts_with("【大姨】"));
    }

    #[tokio::test]
    async fn empty_actor_list_rejected() {
        let client = ScriptedChatClient::always("x");
        let spec = DialogueSpec {
            actors: &[],
            scenario_label: "催婚突击",
            topic: None,
            rounds: 2,
        };
        let result = run_dialogue(&client, &DriftDetector::default(), spec, &mut ()).await;
        assert!(matches!(result, Err(ControlError::Validation(_))));
    }
}
