use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tokio::sync::watch;

use caddie_core::domain::pattern::MissPattern;
use caddie_core::domain::session::{ConversationTurn, SessionContext};
use caddie_core::domain::shot::{ClubId, Shot};

pub mod memory;
pub mod pattern;
pub mod session;
pub mod shot;

pub use memory::{InMemoryMissPatternRepository, InMemorySessionRepository, InMemoryShotRepository};
pub use pattern::SqlMissPatternRepository;
pub use session::SqlSessionRepository;
pub use shot::SqlShotRepository;

pub const DEFAULT_SHOT_RETENTION_DAYS: u32 = 90;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Shot history. Reads return newest first.
#[async_trait]
pub trait ShotRepository: Send + Sync {
    async fn record_shot(&self, shot: Shot) -> Result<(), RepositoryError>;

    async fn get_recent_shots(&self, days: u32) -> Result<Vec<Shot>, RepositoryError>;

    async fn get_shots_by_club(&self, club: &ClubId) -> Result<Vec<Shot>, RepositoryError>;

    async fn get_shots_with_pressure(&self) -> Result<Vec<Shot>, RepositoryError>;

    /// Evicts shots older than the repository's retention window.
    async fn enforce_retention_policy(&self) -> Result<u64, RepositoryError>;

    async fn clear_shots(&self) -> Result<u64, RepositoryError>;

    fn changes(&self) -> watch::Receiver<u64>;
}

/// Stores base (undecayed) pattern confidence only.
#[async_trait]
pub trait MissPatternRepository: Send + Sync {
    async fn get_miss_patterns(&self) -> Result<Vec<MissPattern>, RepositoryError>;

    async fn get_patterns_by_club(&self, club: &ClubId)
        -> Result<Vec<MissPattern>, RepositoryError>;

    /// Insert or replace by pattern id.
    async fn update_pattern(&self, pattern: MissPattern) -> Result<(), RepositoryError>;

    /// Removes patterns whose last occurrence is strictly before `cutoff`.
    async fn delete_stale_patterns(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn clear_patterns(&self) -> Result<u64, RepositoryError>;

    fn changes(&self) -> watch::Receiver<u64>;
}

/// A single persisted session with its bounded conversation history.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get_session(&self) -> Result<Option<SessionContext>, RepositoryError>;

    /// Replaces the stored session, history included.
    async fn save_session(&self, context: SessionContext) -> Result<(), RepositoryError>;

    /// Appends and trims as one unit, starting a session when none exists.
    async fn add_conversation_turn(
        &self,
        turn: ConversationTurn,
    ) -> Result<SessionContext, RepositoryError>;

    async fn clear_conversation_history(&self) -> Result<(), RepositoryError>;

    async fn delete_session(&self) -> Result<(), RepositoryError>;

    fn changes(&self) -> watch::Receiver<u64>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClearMemoryReport {
    pub shots_removed: u64,
    pub patterns_removed: u64,
}

/// Wipes shots, patterns, conversation turns and the session record. Every
/// deletion is attempted; the first failure, in that order, is returned.
pub async fn clear_memory(
    shots: &dyn ShotRepository,
    patterns: &dyn MissPatternRepository,
    sessions: &dyn SessionRepository,
) -> Result<ClearMemoryReport, RepositoryError> {
    let shots_result = shots.clear_shots().await;
    let patterns_result = patterns.clear_patterns().await;
    let turns_result = sessions.clear_conversation_history().await;
    let session_result = sessions.delete_session().await;

    let shots_removed = shots_result?;
    let patterns_removed = patterns_result?;
    turns_result?;
    session_result?;

    Ok(ClearMemoryReport { shots_removed, patterns_removed })
}

/// Fixed-width UTC so stored values sort lexicographically.
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}

pub(crate) fn decode<T>(column: &str, result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(format!("column `{column}`: {error}")))
}
