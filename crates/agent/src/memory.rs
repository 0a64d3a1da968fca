//! Miss-pattern aggregation over the shot history.
//!
//! Stored patterns carry base confidence: the share of the club's retained
//! shots that missed in the pattern's direction. Decay is applied exactly
//! once, when a pattern is read.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use caddie_core::config::MemoryConfig;
use caddie_core::decay::DecayCalculator;
use caddie_core::domain::pattern::{DecayedPattern, MissPattern};
use caddie_core::domain::shot::{ClubId, MissDirection, Shot};
use caddie_core::errors::ValidationError;
use caddie_db::repositories::{MissPatternRepository, RepositoryError, ShotRepository};

pub const DEFAULT_PATTERN_RETENTION_DAYS: u32 = 90;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub shots_removed: u64,
    pub patterns_removed: u64,
}

pub struct MissPatternMemory {
    shots: Arc<dyn ShotRepository>,
    patterns: Arc<dyn MissPatternRepository>,
    calculator: DecayCalculator,
    retention_days: u32,
    club_locks: Mutex<HashMap<ClubId, Arc<Mutex<()>>>>,
}

impl MissPatternMemory {
    pub fn new(shots: Arc<dyn ShotRepository>, patterns: Arc<dyn MissPatternRepository>) -> Self {
        Self {
            shots,
            patterns,
            calculator: DecayCalculator::default(),
            retention_days: DEFAULT_PATTERN_RETENTION_DAYS,
            club_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        shots: Arc<dyn ShotRepository>,
        patterns: Arc<dyn MissPatternRepository>,
        config: &MemoryConfig,
    ) -> Result<Self, MemoryError> {
        Ok(Self {
            calculator: DecayCalculator::new(config.decay_half_life_days)?,
            retention_days: config.pattern_retention_days,
            ..Self::new(shots, patterns)
        })
    }

    pub fn shots(&self) -> &Arc<dyn ShotRepository> {
        &self.shots
    }

    pub fn pattern_store(&self) -> &Arc<dyn MissPatternRepository> {
        &self.patterns
    }

    /// Validates and persists the shot, then rebases every pattern of its
    /// club on the new shot count. A miss also upserts the (club, direction)
    /// pattern. Writes for one club run one at a time.
    pub async fn record_shot(&self, shot: Shot) -> Result<Option<MissPattern>, MemoryError> {
        shot.validate(Utc::now())?;

        let lock = self.club_lock(&shot.club).await;
        let _guard = lock.lock().await;

        self.shots.record_shot(shot.clone()).await?;
        let upsert = shot.miss_direction.map(|direction| (&shot, direction));
        let pattern = self.rebase_club(&shot.club, upsert).await?;

        if let Some(pattern) = &pattern {
            info!(
                event_name = "agent.memory.pattern_upserted",
                club = %shot.club,
                direction = %pattern.direction,
                frequency = pattern.frequency,
                confidence = pattern.confidence,
                "miss pattern updated"
            );
        }
        Ok(pattern)
    }

    /// Recomputes the share of every stored pattern for `club` from the
    /// retained shots. With `upsert`, the matching direction also counts the
    /// shot as a new occurrence, creating the pattern when missing. Callers
    /// hold the club lock.
    async fn rebase_club(
        &self,
        club: &ClubId,
        upsert: Option<(&Shot, MissDirection)>,
    ) -> Result<Option<MissPattern>, MemoryError> {
        let club_shots = self.shots.get_shots_by_club(club).await?;
        let total = club_shots.len();
        let mut misses: HashMap<MissDirection, usize> = HashMap::new();
        for recorded in &club_shots {
            if let Some(missed) = recorded.miss_direction {
                *misses.entry(missed).or_default() += 1;
            }
        }
        let share_of = |direction: MissDirection| {
            share(misses.get(&direction).copied().unwrap_or_default(), total)
        };

        let mut upserted = None;
        for mut existing in self.patterns.get_patterns_by_club(club).await? {
            match upsert {
                Some((shot, direction)) if existing.direction == direction => {
                    existing.frequency = existing.frequency.saturating_add(1);
                    existing.last_occurrence = existing.last_occurrence.max(shot.timestamp);
                    if shot.pressure_context.is_pressure() {
                        existing.pressure_context = Some(shot.pressure_context);
                    }
                    existing.confidence = share_of(direction);
                    upserted = Some(existing.clone());
                }
                _ => existing.confidence = share_of(existing.direction),
            }
            self.patterns.update_pattern(existing).await?;
        }

        match (upserted, upsert) {
            (Some(pattern), _) => Ok(Some(pattern)),
            (None, Some((shot, direction))) => {
                let mut created = MissPattern::new(
                    Some(club.clone()),
                    direction,
                    share_of(direction),
                    shot.timestamp,
                )?;
                if shot.pressure_context.is_pressure() {
                    created.pressure_context = Some(shot.pressure_context);
                }
                self.patterns.update_pattern(created.clone()).await?;
                Ok(Some(created))
            }
            (None, None) => Ok(None),
        }
    }

    pub async fn patterns(&self) -> Result<Vec<DecayedPattern>, MemoryError> {
        self.patterns_at(Utc::now()).await
    }

    /// All patterns decayed against `now`, strongest first.
    pub async fn patterns_at(&self, now: DateTime<Utc>) -> Result<Vec<DecayedPattern>, MemoryError> {
        let stored = self.patterns.get_miss_patterns().await?;
        self.decay_all(stored, now)
    }

    pub async fn patterns_for_club(&self, club: &ClubId) -> Result<Vec<DecayedPattern>, MemoryError> {
        let stored = self.patterns.get_patterns_by_club(club).await?;
        self.decay_all(stored, Utc::now())
    }

    pub async fn pressure_patterns(&self) -> Result<Vec<DecayedPattern>, MemoryError> {
        let stored = self
            .patterns
            .get_miss_patterns()
            .await?
            .into_iter()
            .filter(|pattern| pattern.pressure_context.is_some_and(|context| context.is_pressure()))
            .collect();
        self.decay_all(stored, Utc::now())
    }

    pub async fn dominant_miss(&self) -> Result<Option<MissDirection>, MemoryError> {
        Ok(self.patterns().await?.first().map(DecayedPattern::direction))
    }

    /// Evicts patterns older than the retention window.
    pub async fn delete_stale_patterns(&self) -> Result<u64, MemoryError> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        Ok(self.patterns.delete_stale_patterns(cutoff).await?)
    }

    /// Evicts expired shots and stale patterns, then rebases the surviving
    /// patterns on the shots that remain.
    pub async fn enforce_retention(&self) -> Result<RetentionReport, MemoryError> {
        let shots_removed = self.shots.enforce_retention_policy().await?;
        let patterns_removed = self.delete_stale_patterns().await?;

        let mut clubs: Vec<ClubId> = self
            .patterns
            .get_miss_patterns()
            .await?
            .into_iter()
            .filter_map(|pattern| pattern.club)
            .collect();
        clubs.sort();
        clubs.dedup();
        for club in clubs {
            let lock = self.club_lock(&club).await;
            let _guard = lock.lock().await;
            self.rebase_club(&club, None).await?;
        }

        info!(
            event_name = "agent.memory.retention_enforced",
            shots_removed,
            patterns_removed,
            "retention sweep finished"
        );
        Ok(RetentionReport { shots_removed, patterns_removed })
    }

    fn decay_all(
        &self,
        stored: Vec<MissPattern>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DecayedPattern>, MemoryError> {
        let mut decayed = stored
            .into_iter()
            .map(|pattern| -> Result<DecayedPattern, ValidationError> {
                let decayed_confidence = self.calculator.decayed_confidence(
                    pattern.confidence,
                    pattern.last_occurrence,
                    now,
                )?;
                Ok(DecayedPattern { pattern, decayed_confidence })
            })
            .collect::<Result<Vec<_>, _>>()?;

        decayed.sort_by(|a, b| {
            b.decayed_confidence
                .partial_cmp(&a.decayed_confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.pattern.frequency.cmp(&a.pattern.frequency))
                .then_with(|| a.pattern.direction.cmp(&b.pattern.direction))
        });
        Ok(decayed)
    }

    async fn club_lock(&self, club: &ClubId) -> Arc<Mutex<()>> {
        let mut locks = self.club_locks.lock().await;
        Arc::clone(locks.entry(club.clone()).or_default())
    }
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64).clamp(0.0, 1.0)
}
