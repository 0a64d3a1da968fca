//! Confidence-gated intent classification.
//!
//! [`IntentClassifier`] normalizes the input, asks a [`ClassifierAdapter`]
//! for a structured reading and maps its confidence onto route, confirm or
//! clarify. Adapter failures never reach the caller: timeouts, transport
//! errors, malformed payloads and unknown intent keys all degrade to the
//! keyword-based clarification path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use caddie_core::clarification::{ClarificationFallback, IntentSuggestion};
use caddie_core::config::ClassifierConfig;
use caddie_core::domain::intent::{ExtractedEntities, IntentType, ParsedIntent, UnknownIntentType};
use caddie_core::domain::routing::ClassificationResult;
use caddie_core::domain::session::SessionContext;
use caddie_core::normalize::InputNormalizer;

use crate::llm::LlmClient;

/// Conversation turns included in the classifier prompt.
pub const PROMPT_CONTEXT_TURNS: usize = 4;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier timed out after {0} ms")]
    Timeout(u64),
    #[error("classifier transport failed: {0}")]
    Transport(String),
    #[error("malformed classifier payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    UnknownIntent(#[from] UnknownIntentType),
}

impl ClassificationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::UnknownIntent(_) => "unknown_intent",
        }
    }
}

/// Structured reading returned by the classifier service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPayload {
    pub intent_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default)]
    pub user_goal: Option<String>,
}

impl ClassifierPayload {
    /// Parses the first JSON object embedded in `raw`. Completions often wrap
    /// the object in prose or code fences.
    pub fn parse(raw: &str) -> Result<Self, ClassificationError> {
        let start = raw.find('{');
        let end = raw.rfind('}');
        let json = match (start, end) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => {
                return Err(ClassificationError::MalformedPayload(
                    "no JSON object in classifier response".to_string(),
                ))
            }
        };

        serde_json::from_str(json)
            .map_err(|error| ClassificationError::MalformedPayload(error.to_string()))
    }

    pub fn into_intent(self) -> Result<ParsedIntent, ClassificationError> {
        let intent_type = self.intent_type.parse::<IntentType>()?;
        Ok(ParsedIntent::new(intent_type, self.confidence, self.entities, self.user_goal))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierResponse {
    pub raw_response: String,
    pub payload: ClassifierPayload,
    pub latency_ms: u64,
    pub model_name: String,
}

#[async_trait]
pub trait ClassifierAdapter: Send + Sync {
    async fn classify(
        &self,
        input: &str,
        context: Option<&SessionContext>,
    ) -> Result<ClassifierResponse, ClassificationError>;
}

/// Classifier adapter backed by a text-completion model.
pub struct LlmClassifierAdapter<C> {
    client: C,
    model_name: String,
}

impl<C> LlmClassifierAdapter<C>
where
    C: LlmClient,
{
    pub fn new(client: C, model_name: impl Into<String>) -> Self {
        Self { client, model_name: model_name.into() }
    }

    pub fn build_prompt(input: &str, context: Option<&SessionContext>) -> String {
        let keys = IntentType::ALL.iter().map(IntentType::as_str).collect::<Vec<_>>().join(", ");
        let mut prompt = format!(
            "Classify the golfer's request into exactly one intent.\n\
             Intents: {keys}\n\
             Reply with one JSON object: {{\"intent_type\": <intent>, \"confidence\": <0..1>, \
             \"entities\": {{\"club\", \"yardage\", \"lie\", \"wind\", \"fatigue\", \"pain\", \
             \"score_context\", \"hole_number\"}}, \"user_goal\": <text>}}\n"
        );

        if let Some(context) = context {
            if let Some(hole) = context.current_hole {
                prompt.push_str(&format!("Current hole: {hole}\n"));
            }
            if let Some(shot) = &context.last_shot {
                prompt.push_str(&format!("Last shot: {} from the {}\n", shot.club, shot.lie));
            }
            let turns = context.recent_turns(PROMPT_CONTEXT_TURNS);
            if !turns.is_empty() {
                prompt.push_str("Recent conversation:\n");
                for turn in turns {
                    prompt.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.content));
                }
            }
        }

        prompt.push_str(&format!("Request: {input}\n"));
        prompt
    }
}

#[async_trait]
impl<C> ClassifierAdapter for LlmClassifierAdapter<C>
where
    C: LlmClient,
{
    async fn classify(
        &self,
        input: &str,
        context: Option<&SessionContext>,
    ) -> Result<ClassifierResponse, ClassificationError> {
        let prompt = Self::build_prompt(input, context);
        let started = Instant::now();
        let raw_response = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ClassificationError::Transport(format!("{error:#}")))?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let payload = ClassifierPayload::parse(&raw_response)?;
        Ok(ClassifierResponse { raw_response, payload, latency_ms, model_name: self.model_name.clone() })
    }
}

pub trait NetworkStatus: Send + Sync {
    fn is_offline(&self) -> bool;
}

/// Connectivity flag flipped by whoever observes the network.
#[derive(Debug, Default)]
pub struct NetworkFlag {
    offline: AtomicBool,
}

impl NetworkFlag {
    pub fn online() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        Self { offline: AtomicBool::new(true) }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl NetworkStatus for NetworkFlag {
    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierSettings {
    pub timeout: Duration,
    pub route_threshold: f64,
    pub confirm_threshold: f64,
    pub max_suggestions: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(8_000),
            route_threshold: 0.75,
            confirm_threshold: 0.50,
            max_suggestions: 3,
        }
    }
}

impl From<&ClassifierConfig> for ClassifierSettings {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            route_threshold: config.route_threshold,
            confirm_threshold: config.confirm_threshold,
            max_suggestions: config.max_suggestions,
        }
    }
}

pub struct IntentClassifier {
    normalizer: InputNormalizer,
    adapter: Arc<dyn ClassifierAdapter>,
    fallback: ClarificationFallback,
    network: Arc<dyn NetworkStatus>,
    settings: ClassifierSettings,
}

impl IntentClassifier {
    pub fn new(
        adapter: Arc<dyn ClassifierAdapter>,
        network: Arc<dyn NetworkStatus>,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            normalizer: InputNormalizer::default(),
            adapter,
            fallback: ClarificationFallback::new(),
            network,
            settings,
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn normalize(&self, input: &str) -> String {
        self.normalizer.normalize(input)
    }

    /// Keyword suggestions for `input`, honouring the current network state.
    pub fn suggestions(&self, input: &str) -> Vec<IntentSuggestion> {
        self.fallback.suggestions(input, self.network.is_offline(), self.settings.max_suggestions)
    }

    pub async fn classify(
        &self,
        input: &str,
        context: Option<&SessionContext>,
    ) -> ClassificationResult {
        let normalized = self.normalize(input);

        match self.call_adapter(&normalized, context).await {
            Ok(intent) => self.select(intent, &normalized),
            Err(error) => {
                warn!(
                    event_name = "agent.classifier.degraded",
                    error_class = error.error_class(),
                    offline = self.network.is_offline(),
                    error = %error,
                    "classifier unavailable, falling back to keyword suggestions"
                );
                ClassificationResult::Clarify {
                    response: self.fallback.respond(
                        input,
                        self.network.is_offline(),
                        self.settings.max_suggestions,
                        true,
                    ),
                }
            }
        }
    }

    async fn call_adapter(
        &self,
        normalized: &str,
        context: Option<&SessionContext>,
    ) -> Result<ParsedIntent, ClassificationError> {
        let timeout_ms = u64::try_from(self.settings.timeout.as_millis()).unwrap_or(u64::MAX);
        let response =
            tokio::time::timeout(self.settings.timeout, self.adapter.classify(normalized, context))
                .await
                .map_err(|_| ClassificationError::Timeout(timeout_ms))??;

        debug!(
            event_name = "agent.classifier.completed",
            model_name = %response.model_name,
            latency_ms = response.latency_ms,
            intent_type = %response.payload.intent_type,
            confidence = response.payload.confidence,
            "classifier responded"
        );

        response.payload.into_intent()
    }

    fn select(&self, intent: ParsedIntent, normalized: &str) -> ClassificationResult {
        let confidence = intent.confidence();
        if confidence >= self.settings.route_threshold {
            let target = intent.destination();
            ClassificationResult::Route { intent, target }
        } else if confidence >= self.settings.confirm_threshold {
            let message = format!("Did you want to {}?", intent.intent_type().action_phrase());
            ClassificationResult::Confirm { intent, message }
        } else {
            ClassificationResult::Clarify {
                response: self.fallback.respond(
                    normalized,
                    self.network.is_offline(),
                    self.settings.max_suggestions,
                    false,
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use caddie_core::clarification::DEFAULT_MAX_SUGGESTIONS;
    use caddie_core::domain::intent::IntentType;
    use caddie_core::domain::routing::ClassificationResult;
    use caddie_core::domain::session::{ConversationTurn, SessionContext, SessionId};

    use super::{
        ClassificationError, ClassifierAdapter, ClassifierPayload, ClassifierResponse,
        ClassifierSettings, IntentClassifier, LlmClassifierAdapter, NetworkFlag,
    };
    use crate::llm::LlmClient;

    struct ScriptedAdapter {
        raw: String,
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedAdapter {
        fn replying(raw: &str) -> Self {
            Self { raw: raw.to_string(), delay: Duration::ZERO, seen: Mutex::new(Vec::new()) }
        }

        fn stalled() -> Self {
            Self {
                raw: String::new(),
                delay: Duration::from_secs(30),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ClassifierAdapter for ScriptedAdapter {
        async fn classify(
            &self,
            input: &str,
            _context: Option<&SessionContext>,
        ) -> Result<ClassifierResponse, ClassificationError> {
            self.seen.lock().expect("seen lock").push(input.to_string());
            tokio::time::sleep(self.delay).await;
            Ok(ClassifierResponse {
                raw_response: self.raw.clone(),
                payload: ClassifierPayload::parse(&self.raw)?,
                latency_ms: 1,
                model_name: "scripted".to_string(),
            })
        }
    }

    struct EchoLlm {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().expect("prompt lock").push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct DownLlm;

    #[async_trait]
    impl LlmClient for DownLlm {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn payload(intent: &str, confidence: f64) -> String {
        format!(r#"{{"intent_type": "{intent}", "confidence": {confidence}}}"#)
    }

    fn classifier(adapter: Arc<dyn ClassifierAdapter>, offline: bool) -> IntentClassifier {
        let network = if offline { NetworkFlag::offline() } else { NetworkFlag::online() };
        IntentClassifier::new(
            adapter,
            Arc::new(network),
            ClassifierSettings { timeout: Duration::from_millis(50), ..Default::default() },
        )
    }

    async fn decision(confidence: f64) -> ClassificationResult {
        classifier(Arc::new(ScriptedAdapter::replying(&payload("SCORE_ENTRY", confidence))), false)
            .classify("I made par", None)
            .await
    }

    #[tokio::test]
    async fn thresholds_partition_confidence() {
        for confidence in [0.0, 0.25, 0.4999] {
            assert!(
                matches!(decision(confidence).await, ClassificationResult::Clarify { ref response } if !response.degraded),
                "{confidence} should clarify"
            );
        }
        for confidence in [0.50, 0.6, 0.7499] {
            assert!(
                matches!(decision(confidence).await, ClassificationResult::Confirm { .. }),
                "{confidence} should confirm"
            );
        }
        for confidence in [0.75, 0.9, 1.0] {
            assert!(
                matches!(decision(confidence).await, ClassificationResult::Route { .. }),
                "{confidence} should route"
            );
        }
    }

    #[tokio::test]
    async fn classifier_sees_normalized_input_and_routes_to_registry_target() {
        let adapter = Arc::new(ScriptedAdapter::replying(
            r#"{"intent_type": "CLUB_ADJUSTMENT", "confidence": 0.92, "entities": {"club": "7-iron"}}"#,
        ));
        let result = classifier(adapter.clone(), false).classify("gimme my 7i yardage", None).await;

        let seen = adapter.seen.lock().expect("seen lock").clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("7-iron"), "normalized input was `{}`", seen[0]);

        match result {
            ClassificationResult::Route { intent, target } => {
                assert_eq!(intent.intent_type(), IntentType::ClubAdjustment);
                assert_eq!(target.path(), "caddy/club_adjustment");
                assert_eq!(target.parameters.get("club").map(String::as_str), Some("7-iron"));
            }
            other => panic!("expected route, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn answered_in_place_intents_route_to_the_registry_conversation_target() {
        let adapter = Arc::new(ScriptedAdapter::replying(&payload("PATTERN_QUERY", 0.9)));
        match classifier(adapter, false).classify("where do I usually miss", None).await {
            ClassificationResult::Route { intent, target } => {
                assert_eq!(intent.routing_target(), None);
                assert_eq!(target, IntentType::PatternQuery.destination());
                assert_eq!(target.path(), "caddy/conversation");
            }
            other => panic!("expected route, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirmation_message_names_the_action() {
        match decision(0.6).await {
            ClassificationResult::Confirm { message, .. } => {
                assert_eq!(message, "Did you want to enter a score?");
            }
            other => panic!("expected confirm, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_intent_type_degrades_instead_of_defaulting() {
        let adapter = Arc::new(ScriptedAdapter::replying(&payload("ORDER_PIZZA", 0.99)));
        let result = classifier(adapter, false).classify("what's my score", None).await;

        match result {
            ClassificationResult::Clarify { response } => {
                assert!(response.degraded);
                assert_eq!(response.suggestions[0].intent_type, IntentType::ScoreEntry);
            }
            other => panic!("expected degraded clarify, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_timeout_yields_only_offline_suggestions() {
        let classifier = classifier(Arc::new(ScriptedAdapter::stalled()), true);
        let result = classifier.classify("what club for this wind", None).await;

        let ClassificationResult::Clarify { response } = result else {
            panic!("timeout must clarify");
        };
        assert!(response.degraded);
        assert!(response.suggestions.len() <= DEFAULT_MAX_SUGGESTIONS);
        assert!(response.suggestions.iter().all(|suggestion| suggestion.offline_available));

        let direct = classifier.suggestions("what club for this wind");
        assert!(direct.len() <= DEFAULT_MAX_SUGGESTIONS);
        assert!(direct.iter().all(|suggestion| suggestion.intent_type.offline_available()));
    }

    #[tokio::test]
    async fn transport_failure_degrades() {
        let adapter = Arc::new(LlmClassifierAdapter::new(DownLlm, "test-model"));
        let result = classifier(adapter, false).classify("help", None).await;
        assert!(matches!(result, ClassificationResult::Clarify { ref response } if response.degraded));
    }

    #[test]
    fn payload_parse_tolerates_surrounding_prose() {
        let parsed = ClassifierPayload::parse(
            "Sure! ```json\n{\"intent_type\": \"HELP\", \"confidence\": 0.8, \"entities\": {\"wind\": \"gusty\"}}\n```",
        )
        .expect("payload");
        assert_eq!(parsed.intent_type, "HELP");
        assert_eq!(parsed.entities.wind_description.as_deref(), Some("gusty"));
    }

    #[test]
    fn payload_parse_accepts_yardage_as_string_or_float() {
        let quoted = ClassifierPayload::parse(
            r#"{"intent_type": "CLUB_ADJUSTMENT", "confidence": 0.9, "entities": {"yardage": "150"}}"#,
        )
        .expect("quoted yardage");
        assert_eq!(quoted.entities.yardage, Some(150));

        let float = ClassifierPayload::parse(
            r#"{"intent_type": "CLUB_ADJUSTMENT", "confidence": 0.9, "entities": {"yardage": 150.0}}"#,
        )
        .expect("float yardage");
        assert_eq!(float.entities.yardage, Some(150));
    }

    #[test]
    fn payload_parse_rejects_missing_fields_and_non_json() {
        assert!(matches!(
            ClassifierPayload::parse("no idea"),
            Err(ClassificationError::MalformedPayload(_))
        ));
        assert!(matches!(
            ClassifierPayload::parse(r#"{"confidence": 0.9}"#),
            Err(ClassificationError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn llm_adapter_reports_model_and_includes_context() {
        let llm = EchoLlm {
            prompts: Mutex::new(Vec::new()),
            reply: payload("PATTERN_QUERY", 0.8),
        };
        let adapter = LlmClassifierAdapter::new(llm, "caddie-intent-v1");
        let context = SessionContext::new(SessionId::generate())
            .with_hole(12)
            .adding_turn(ConversationTurn::user("my driver keeps going right"));

        let response =
            adapter.classify("why do i miss", Some(&context)).await.expect("classification");

        assert_eq!(response.model_name, "caddie-intent-v1");
        assert_eq!(response.payload.intent_type, "PATTERN_QUERY");
        let prompts = adapter.client.prompts.lock().expect("prompt lock");
        assert!(prompts[0].contains("CLUB_ADJUSTMENT"));
        assert!(prompts[0].contains("Current hole: 12"));
        assert!(prompts[0].contains("user: my driver keeps going right"));
        assert!(prompts[0].ends_with("Request: why do i miss\n"));
    }
}
