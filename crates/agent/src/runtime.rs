//! Per-input pipeline with last-input-wins semantics.
//!
//! Each call to [`AgentRuntime::handle_input`] takes a fresh generation for
//! its session key. A run whose generation is no longer current when it
//! finishes is discarded and never touches session state.
//!
//! Session keys only scope supersession. The recorder holds a single
//! session, so completed runs of every key append to the same history.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use caddie_core::domain::routing::{ClassificationResult, RoutingResult};
use caddie_core::domain::session::ConversationTurn;
use caddie_core::errors::DomainError;
use caddie_core::pipeline::{PipelineState, PipelineTrace};

use crate::classifier::IntentClassifier;
use crate::memory::MemoryError;
use crate::recorder::EventRecorder;
use crate::router::{RoutingDecision, RoutingOrchestrator};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputOutcome {
    Completed { decision: RoutingDecision, trace: PipelineTrace },
    /// A newer input for the same session arrived first.
    Superseded,
}

/// Generation counter of one session key. Locked while a current run
/// records its turns.
type InputSlot = Arc<Mutex<u64>>;

pub struct AgentRuntime {
    classifier: IntentClassifier,
    orchestrator: RoutingOrchestrator,
    recorder: Arc<EventRecorder>,
    slots: Mutex<HashMap<String, InputSlot>>,
}

impl AgentRuntime {
    pub fn new(
        classifier: IntentClassifier,
        orchestrator: RoutingOrchestrator,
        recorder: Arc<EventRecorder>,
    ) -> Self {
        Self { classifier, orchestrator, recorder, slots: Mutex::new(HashMap::new()) }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.recorder
    }

    pub async fn handle_input(
        &self,
        session_key: &str,
        input: &str,
    ) -> Result<InputOutcome, RuntimeError> {
        let slot = self.slot(session_key).await;
        let generation = {
            let mut current = slot.lock().await;
            *current += 1;
            *current
        };
        let outcome = self.run(session_key, &slot, generation, input).await;
        self.release(session_key, slot).await;
        outcome
    }

    async fn run(
        &self,
        session_key: &str,
        slot: &InputSlot,
        generation: u64,
        input: &str,
    ) -> Result<InputOutcome, RuntimeError> {
        let mut trace = PipelineTrace::new();
        trace.advance(PipelineState::Normalizing)?;
        let context = self.recorder.current_session().await?;

        trace.advance(PipelineState::Classifying)?;
        let classification = self.classifier.classify(input, Some(&context)).await;
        if *slot.lock().await != generation {
            return Ok(self.superseded(session_key, generation));
        }

        advance_classified(&mut trace, &classification)?;
        let decision = self.orchestrator.route(classification).await;
        if trace.current() == PipelineState::Routing {
            if let RoutingDecision::Routed(result) = &decision {
                trace.advance(outcome_state(result))?;
            }
        }
        trace.advance(PipelineState::Idle)?;

        // Held while recording so a newer input for this key cannot start
        // between the generation check and the writes.
        let current = slot.lock().await;
        if *current != generation {
            drop(current);
            return Ok(self.superseded(session_key, generation));
        }
        self.recorder.record_turn(ConversationTurn::user(input)).await?;
        self.recorder.record_turn(ConversationTurn::assistant(decision.reply_text())).await?;
        drop(current);

        info!(
            event_name = "agent.runtime.input_handled",
            session_key,
            decision = decision.kind(),
            states = trace.states().len(),
            "input handled"
        );
        Ok(InputOutcome::Completed { decision, trace })
    }

    async fn slot(&self, session_key: &str) -> InputSlot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(session_key.to_string()).or_default())
    }

    /// Drops the key's slot once no other run holds it. Slot handles are
    /// only cloned under the map lock, so the count cannot grow here.
    async fn release(&self, session_key: &str, slot: InputSlot) {
        let mut slots = self.slots.lock().await;
        let idle = slots
            .get(session_key)
            .is_some_and(|tracked| Arc::ptr_eq(tracked, &slot) && Arc::strong_count(&slot) == 2);
        if idle {
            slots.remove(session_key);
        }
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.slots.lock().await.len()
    }

    fn superseded(&self, session_key: &str, generation: u64) -> InputOutcome {
        info!(
            event_name = "agent.runtime.superseded",
            session_key,
            generation,
            "discarding result of superseded input"
        );
        InputOutcome::Superseded
    }
}

fn advance_classified(
    trace: &mut PipelineTrace,
    classification: &ClassificationResult,
) -> Result<(), DomainError> {
    match classification {
        ClassificationResult::Route { .. } => trace.advance(PipelineState::Routing),
        ClassificationResult::Confirm { .. } => trace.advance(PipelineState::Confirming),
        ClassificationResult::Clarify { response } => {
            if response.degraded {
                trace.advance(PipelineState::Degraded)?;
            }
            trace.advance(PipelineState::Clarifying)
        }
    }
}

fn outcome_state(result: &RoutingResult) -> PipelineState {
    match result {
        RoutingResult::Navigate { .. } => PipelineState::Navigate,
        RoutingResult::NoNavigation { .. } => PipelineState::NoNavigation,
        RoutingResult::PrerequisiteMissing { .. } => PipelineState::PrerequisiteMissing,
        RoutingResult::ConfirmationRequired { .. } => PipelineState::Confirming,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use caddie_core::domain::intent::IntentType;
    use caddie_core::domain::routing::{Prerequisite, RoutingResult};
    use caddie_core::domain::session::SessionContext;
    use caddie_core::pipeline::PipelineState;
    use caddie_db::repositories::{
        InMemoryMissPatternRepository, InMemorySessionRepository, InMemoryShotRepository,
    };

    use super::{AgentRuntime, InputOutcome};
    use crate::answers::MemoryAnswerSource;
    use crate::classifier::{
        ClassificationError, ClassifierAdapter, ClassifierPayload, ClassifierResponse,
        ClassifierSettings, IntentClassifier, NetworkFlag,
    };
    use crate::memory::MissPatternMemory;
    use crate::recorder::EventRecorder;
    use crate::router::{RoutingDecision, RoutingOrchestrator, StaticPrerequisites};

    /// Replies by keyword. "slow" inputs take 60ms, "hang" inputs outlast the timeout.
    struct KeywordAdapter;

    #[async_trait]
    impl ClassifierAdapter for KeywordAdapter {
        async fn classify(
            &self,
            input: &str,
            _context: Option<&SessionContext>,
        ) -> Result<ClassifierResponse, ClassificationError> {
            if input.contains("slow") {
                tokio::time::sleep(Duration::from_millis(60)).await;
            }
            if input.contains("hang") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            let raw = if input.contains("7-iron") {
                r#"{"intent_type": "CLUB_ADJUSTMENT", "confidence": 0.92, "entities": {"club": "7-iron"}}"#
            } else if input.contains("score") {
                r#"{"intent_type": "SCORE_ENTRY", "confidence": 0.9}"#
            } else {
                r#"{"intent_type": "HELP", "confidence": 0.3}"#
            };
            Ok(ClassifierResponse {
                raw_response: raw.to_string(),
                payload: ClassifierPayload::parse(raw)?,
                latency_ms: 0,
                model_name: "keyword".to_string(),
            })
        }
    }

    fn runtime(prerequisites: StaticPrerequisites, offline: bool) -> AgentRuntime {
        let memory = Arc::new(MissPatternMemory::new(
            Arc::new(InMemoryShotRepository::default()),
            Arc::new(InMemoryMissPatternRepository::default()),
        ));
        let recorder = Arc::new(EventRecorder::new(
            memory.clone(),
            Arc::new(InMemorySessionRepository::default()),
        ));
        let network = if offline { NetworkFlag::offline() } else { NetworkFlag::online() };
        let classifier = IntentClassifier::new(
            Arc::new(KeywordAdapter),
            Arc::new(network),
            ClassifierSettings { timeout: Duration::from_millis(100), ..Default::default() },
        );
        let orchestrator = RoutingOrchestrator::new(
            Arc::new(prerequisites),
            Arc::new(MemoryAnswerSource::new(memory)),
        );
        AgentRuntime::new(classifier, orchestrator, recorder)
    }

    #[tokio::test]
    async fn slang_club_request_navigates_end_to_end() {
        let runtime = runtime(StaticPrerequisites::all(), false);
        let outcome = runtime.handle_input("player", "gimme my 7i yardage").await.expect("handled");

        let InputOutcome::Completed { decision, trace } = outcome else {
            panic!("expected completion");
        };
        match decision {
            RoutingDecision::Routed(RoutingResult::Navigate { target, intent }) => {
                assert_eq!(intent.intent_type(), IntentType::ClubAdjustment);
                assert!((intent.confidence() - 0.92).abs() < 1e-9);
                assert_eq!(target.path(), "caddy/club_adjustment");
            }
            other => panic!("expected navigate, got {other:?}"),
        }
        assert_eq!(
            trace.states(),
            &[
                PipelineState::Idle,
                PipelineState::Normalizing,
                PipelineState::Classifying,
                PipelineState::Routing,
                PipelineState::Navigate,
                PipelineState::Idle,
            ]
        );

        let session = runtime.recorder().current_session().await.expect("session");
        assert_eq!(session.conversation_history().len(), 2);
        assert_eq!(session.conversation_history()[0].content, "gimme my 7i yardage");
    }

    #[tokio::test]
    async fn missing_round_blocks_score_entry() {
        let runtime = runtime(StaticPrerequisites::with([Prerequisite::ClubDistances]), false);
        let outcome = runtime.handle_input("player", "log my score").await.expect("handled");

        let InputOutcome::Completed { decision, trace } = outcome else {
            panic!("expected completion");
        };
        assert!(matches!(
            decision,
            RoutingDecision::Routed(RoutingResult::PrerequisiteMissing { ref missing, .. })
                if missing == &[Prerequisite::ActiveRound]
        ));
        assert_eq!(trace.outcome(), Some(PipelineState::PrerequisiteMissing));
    }

    #[tokio::test]
    async fn timeout_while_offline_degrades_through_clarifying() {
        let runtime = runtime(StaticPrerequisites::all(), true);
        let outcome = runtime.handle_input("player", "hang on what club").await.expect("handled");

        let InputOutcome::Completed { decision, trace } = outcome else {
            panic!("expected completion");
        };
        let RoutingDecision::Clarification(response) = decision else {
            panic!("expected clarification");
        };
        assert!(response.degraded);
        assert!(response.suggestions.len() <= 3);
        assert!(response.suggestions.iter().all(|suggestion| suggestion.offline_available));
        assert!(trace.states().contains(&PipelineState::Degraded));
        assert!(trace.is_complete());
    }

    #[tokio::test]
    async fn newer_input_supersedes_in_flight_classification() {
        let runtime = Arc::new(runtime(StaticPrerequisites::all(), false));

        let slow = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.handle_input("player", "slow score please").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = runtime.handle_input("player", "my 7i").await.expect("fast");

        let slow = slow.await.expect("join").expect("slow");
        assert_eq!(slow, InputOutcome::Superseded);
        assert!(matches!(fast, InputOutcome::Completed { .. }));

        let session = runtime.recorder().current_session().await.expect("session");
        let contents: Vec<&str> =
            session.conversation_history().iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0], "my 7i");
    }

    #[tokio::test]
    async fn different_sessions_do_not_supersede_each_other() {
        let runtime = Arc::new(runtime(StaticPrerequisites::all(), false));
        let slow = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.handle_input("alice", "slow score").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        runtime.handle_input("bob", "my 7i").await.expect("bob");

        let slow = slow.await.expect("join").expect("alice");
        assert!(matches!(slow, InputOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn finished_inputs_release_their_session_key() {
        let runtime = Arc::new(runtime(StaticPrerequisites::all(), false));
        for key in ["alice", "bob", "carol"] {
            runtime.handle_input(key, "my 7i").await.expect("handled");
        }
        assert_eq!(runtime.tracked_keys().await, 0);

        let slow = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.handle_input("player", "slow score").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        runtime.handle_input("player", "my 7i").await.expect("fast");
        assert_eq!(slow.await.expect("join").expect("slow"), InputOutcome::Superseded);
        assert_eq!(runtime.tracked_keys().await, 0);
    }

    #[tokio::test]
    async fn recording_for_one_key_does_not_block_another() {
        let runtime = runtime(StaticPrerequisites::all(), false);
        let alice = runtime.slot("alice").await;
        let _recording = alice.lock().await;

        let bob = tokio::time::timeout(Duration::from_secs(1), runtime.handle_input("bob", "my 7i"))
            .await
            .expect("bob must not wait on alice")
            .expect("bob");
        assert!(matches!(bob, InputOutcome::Completed { .. }));
    }
}
