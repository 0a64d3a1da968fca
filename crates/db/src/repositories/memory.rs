use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{watch, RwLock};

use caddie_core::domain::pattern::MissPattern;
use caddie_core::domain::session::{ConversationTurn, SessionContext, SessionId};
use caddie_core::domain::shot::{ClubId, Shot};

use super::{
    MissPatternRepository, RepositoryError, SessionRepository, ShotRepository,
    DEFAULT_SHOT_RETENTION_DAYS,
};
use crate::live::ChangeNotifier;

pub struct InMemoryShotRepository {
    shots: RwLock<Vec<Shot>>,
    retention_days: u32,
    notifier: ChangeNotifier,
}

impl Default for InMemoryShotRepository {
    fn default() -> Self {
        Self::with_retention_days(DEFAULT_SHOT_RETENTION_DAYS)
    }
}

impl InMemoryShotRepository {
    pub fn with_retention_days(retention_days: u32) -> Self {
        Self { shots: RwLock::new(Vec::new()), retention_days, notifier: ChangeNotifier::default() }
    }

    async fn select(&self, keep: impl Fn(&Shot) -> bool) -> Vec<Shot> {
        let shots = self.shots.read().await;
        let mut selected: Vec<Shot> = shots.iter().filter(|shot| keep(shot)).cloned().collect();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected
    }
}

#[async_trait::async_trait]
impl ShotRepository for InMemoryShotRepository {
    async fn record_shot(&self, shot: Shot) -> Result<(), RepositoryError> {
        let mut shots = self.shots.write().await;
        shots.retain(|existing| existing.id != shot.id);
        shots.push(shot);
        drop(shots);
        self.notifier.notify();
        Ok(())
    }

    async fn get_recent_shots(&self, days: u32) -> Result<Vec<Shot>, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        Ok(self.select(|shot| shot.timestamp >= cutoff).await)
    }

    async fn get_shots_by_club(&self, club: &ClubId) -> Result<Vec<Shot>, RepositoryError> {
        Ok(self.select(|shot| &shot.club == club).await)
    }

    async fn get_shots_with_pressure(&self) -> Result<Vec<Shot>, RepositoryError> {
        Ok(self.select(|shot| shot.pressure_context.is_pressure()).await)
    }

    async fn enforce_retention_policy(&self) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let removed = remove_where(&mut *self.shots.write().await, |shot| shot.timestamp < cutoff);
        if removed > 0 {
            self.notifier.notify();
        }
        Ok(removed)
    }

    async fn clear_shots(&self) -> Result<u64, RepositoryError> {
        let removed = remove_where(&mut *self.shots.write().await, |_| true);
        self.notifier.notify();
        Ok(removed)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }
}

#[derive(Default)]
pub struct InMemoryMissPatternRepository {
    patterns: RwLock<HashMap<String, MissPattern>>,
    notifier: ChangeNotifier,
}

impl InMemoryMissPatternRepository {
    async fn select(&self, keep: impl Fn(&MissPattern) -> bool) -> Vec<MissPattern> {
        let patterns = self.patterns.read().await;
        let mut selected: Vec<MissPattern> =
            patterns.values().filter(|pattern| keep(pattern)).cloned().collect();
        selected.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        selected
    }
}

#[async_trait::async_trait]
impl MissPatternRepository for InMemoryMissPatternRepository {
    async fn get_miss_patterns(&self) -> Result<Vec<MissPattern>, RepositoryError> {
        Ok(self.select(|_| true).await)
    }

    async fn get_patterns_by_club(
        &self,
        club: &ClubId,
    ) -> Result<Vec<MissPattern>, RepositoryError> {
        Ok(self.select(|pattern| pattern.club.as_ref() == Some(club)).await)
    }

    async fn update_pattern(&self, pattern: MissPattern) -> Result<(), RepositoryError> {
        self.patterns.write().await.insert(pattern.id.0.clone(), pattern);
        self.notifier.notify();
        Ok(())
    }

    async fn delete_stale_patterns(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut patterns = self.patterns.write().await;
        let before = patterns.len();
        patterns.retain(|_, pattern| pattern.last_occurrence >= cutoff);
        let removed = (before - patterns.len()) as u64;
        drop(patterns);
        if removed > 0 {
            self.notifier.notify();
        }
        Ok(removed)
    }

    async fn clear_patterns(&self) -> Result<u64, RepositoryError> {
        let mut patterns = self.patterns.write().await;
        let removed = patterns.len() as u64;
        patterns.clear();
        drop(patterns);
        self.notifier.notify();
        Ok(removed)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    session: RwLock<Option<SessionContext>>,
    notifier: ChangeNotifier,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get_session(&self) -> Result<Option<SessionContext>, RepositoryError> {
        Ok(self.session.read().await.clone())
    }

    async fn save_session(&self, context: SessionContext) -> Result<(), RepositoryError> {
        *self.session.write().await = Some(context);
        self.notifier.notify();
        Ok(())
    }

    async fn add_conversation_turn(
        &self,
        turn: ConversationTurn,
    ) -> Result<SessionContext, RepositoryError> {
        let mut session = self.session.write().await;
        let current =
            session.take().unwrap_or_else(|| SessionContext::new(SessionId::generate()));
        let next = current.adding_turn(turn);
        *session = Some(next.clone());
        drop(session);
        self.notifier.notify();
        Ok(next)
    }

    async fn clear_conversation_history(&self) -> Result<(), RepositoryError> {
        let mut session = self.session.write().await;
        if let Some(current) = session.as_ref() {
            *session = Some(current.without_history());
        }
        drop(session);
        self.notifier.notify();
        Ok(())
    }

    async fn delete_session(&self) -> Result<(), RepositoryError> {
        *self.session.write().await = None;
        self.notifier.notify();
        Ok(())
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }
}

fn remove_where(shots: &mut Vec<Shot>, remove: impl Fn(&Shot) -> bool) -> u64 {
    let before = shots.len();
    shots.retain(|shot| !remove(shot));
    (before - shots.len()) as u64
}
