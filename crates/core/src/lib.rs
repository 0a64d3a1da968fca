pub mod clarification;
pub mod config;
pub mod decay;
pub mod domain;
pub mod errors;
pub mod normalize;
pub mod pipeline;

pub use chrono;

pub use clarification::{ClarificationFallback, ClarificationResponse, IntentSuggestion};
pub use decay::{decay, DecayCalculator};
pub use domain::intent::{ExtractedEntities, IntentId, IntentType, ParsedIntent};
pub use domain::pattern::{DecayedPattern, MissPattern, PatternId, PatternKey};
pub use domain::routing::{
    AppModule, ClassificationResult, Prerequisite, RoutingResult, RoutingTarget,
};
pub use domain::session::{
    ConversationTurn, RoundId, SessionContext, SessionId, TurnRole, MAX_CONVERSATION_TURNS,
};
pub use domain::shot::{ClubId, Lie, MissDirection, PressureContext, Shot, ShotId};
pub use errors::{DomainError, ValidationError};
pub use normalize::{normalize, InputNormalizer};
pub use pipeline::{PipelineState, PipelineTrace};
