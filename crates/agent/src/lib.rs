//! Intent routing and golf memory services.
//!
//! - `classifier` - normalizes input, calls the classifier adapter and gates
//!   the reading by confidence, degrading to keyword suggestions on failure
//! - `router` - turns a classification into a routing decision behind the
//!   prerequisite gate
//! - `memory` - miss-pattern aggregation with read-time decay and retention
//! - `recorder` - shot, round and conversation events against session memory
//! - `runtime` - per-session pipeline with last-input-wins
//!
//! The classifier model only reads intent. Prerequisite gating, thresholds
//! and memory updates are deterministic.

pub mod answers;
pub mod classifier;
pub mod llm;
pub mod memory;
pub mod recorder;
pub mod router;
pub mod runtime;

pub use answers::MemoryAnswerSource;
pub use classifier::{
    ClassificationError, ClassifierAdapter, ClassifierPayload, ClassifierResponse,
    ClassifierSettings, IntentClassifier, LlmClassifierAdapter, NetworkFlag, NetworkStatus,
};
pub use llm::LlmClient;
pub use memory::{MemoryError, MissPatternMemory, RetentionReport};
pub use recorder::EventRecorder;
pub use router::{
    AnswerSource, PrerequisiteChecker, PrerequisiteError, RoutingDecision, RoutingOrchestrator,
    StaticPrerequisites,
};
pub use runtime::{AgentRuntime, InputOutcome, RuntimeError};
