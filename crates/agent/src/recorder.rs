//! Single entry point for events that change session or shot memory.
//!
//! Every session mutation goes through [`EventRecorder`] so read-modify-write
//! updates (shot, round, hole) cannot interleave with turn appends.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use caddie_core::domain::session::{ConversationTurn, RoundId, SessionContext, SessionId};
use caddie_core::domain::shot::{
    ClubId, Lie, MissDirection, PressureContext, Shot, MAX_HOLE_NUMBER,
};
use caddie_core::errors::ValidationError;
use caddie_db::repositories::{clear_memory, ClearMemoryReport, SessionRepository};

use crate::memory::{MemoryError, MissPatternMemory};

pub struct EventRecorder {
    memory: Arc<MissPatternMemory>,
    sessions: Arc<dyn SessionRepository>,
    session_lock: Mutex<()>,
}

impl EventRecorder {
    pub fn new(memory: Arc<MissPatternMemory>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { memory, sessions, session_lock: Mutex::new(()) }
    }

    pub fn memory(&self) -> &Arc<MissPatternMemory> {
        &self.memory
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRepository> {
        &self.sessions
    }

    /// Stored session, or the empty context when none exists.
    pub async fn current_session(&self) -> Result<SessionContext, MemoryError> {
        Ok(self.sessions.get_session().await?.unwrap_or_default())
    }

    pub async fn record_shot(&self, shot: Shot) -> Result<SessionContext, MemoryError> {
        self.memory.record_shot(shot.clone()).await?;
        self.update_session(|context| context.with_shot(shot)).await
    }

    pub async fn record_miss(
        &self,
        club: ClubId,
        direction: MissDirection,
        lie: Lie,
        pressure: PressureContext,
    ) -> Result<SessionContext, MemoryError> {
        let shot = Shot::new(club, lie, Utc::now()).with_miss(direction).with_pressure(pressure);
        self.record_shot(shot).await
    }

    pub async fn start_round(&self) -> Result<SessionContext, MemoryError> {
        let round = RoundId::generate();
        debug!(event_name = "agent.session.round_started", round_id = %round.0, "round started");
        self.update_session(|context| context.with_round(round)).await
    }

    pub async fn set_hole(&self, hole_number: u8) -> Result<SessionContext, MemoryError> {
        if !(1..=MAX_HOLE_NUMBER).contains(&hole_number) {
            return Err(ValidationError::HoleOutOfRange { value: hole_number, max: MAX_HOLE_NUMBER }
                .into());
        }
        self.update_session(|context| context.with_hole(hole_number)).await
    }

    pub async fn record_recommendation(
        &self,
        recommendation: impl Into<String>,
    ) -> Result<SessionContext, MemoryError> {
        let recommendation = recommendation.into();
        self.update_session(|context| context.with_recommendation(recommendation)).await
    }

    pub async fn record_turn(&self, turn: ConversationTurn) -> Result<SessionContext, MemoryError> {
        let _guard = self.session_lock.lock().await;
        Ok(self.sessions.add_conversation_turn(turn).await?)
    }

    /// Wipes shots, patterns and the session. See [`clear_memory`].
    pub async fn forget_everything(&self) -> Result<ClearMemoryReport, MemoryError> {
        let _guard = self.session_lock.lock().await;
        Ok(clear_memory(
            self.memory.shots().as_ref(),
            self.memory.pattern_store().as_ref(),
            self.sessions.as_ref(),
        )
        .await?)
    }

    async fn update_session(
        &self,
        update: impl FnOnce(&SessionContext) -> SessionContext + Send,
    ) -> Result<SessionContext, MemoryError> {
        let _guard = self.session_lock.lock().await;
        let current = match self.sessions.get_session().await? {
            Some(context) => context,
            None => SessionContext::new(SessionId::generate()),
        };
        let next = update(&current);
        self.sessions.save_session(next.clone()).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use caddie_core::domain::session::{ConversationTurn, MAX_CONVERSATION_TURNS};
    use caddie_core::domain::shot::{ClubId, Lie, MissDirection, PressureContext, Shot};
    use caddie_db::repositories::{
        InMemoryMissPatternRepository, InMemorySessionRepository, InMemoryShotRepository,
        SessionRepository, ShotRepository,
    };

    use super::EventRecorder;
    use crate::memory::{MemoryError, MissPatternMemory};

    fn recorder() -> EventRecorder {
        let memory = Arc::new(MissPatternMemory::new(
            Arc::new(InMemoryShotRepository::default()),
            Arc::new(InMemoryMissPatternRepository::default()),
        ));
        EventRecorder::new(memory, Arc::new(InMemorySessionRepository::default()))
    }

    #[tokio::test]
    async fn shots_update_session_and_patterns_together() {
        let recorder = recorder();
        recorder.start_round().await.expect("round");
        let shot = Shot::new(ClubId::new("8-iron"), Lie::Fairway, Utc::now())
            .with_miss(MissDirection::Long)
            .on_hole(3);

        let context = recorder.record_shot(shot.clone()).await.expect("shot");

        assert_eq!(context.last_shot, Some(shot));
        assert_eq!(context.current_hole, Some(3));
        assert!(context.current_round.is_some());
        assert_eq!(
            recorder.memory().dominant_miss().await.expect("dominant"),
            Some(MissDirection::Long)
        );
    }

    #[tokio::test]
    async fn record_miss_builds_the_shot() {
        let recorder = recorder();
        let context = recorder
            .record_miss(
                ClubId::new("Driver"),
                MissDirection::Left,
                Lie::Tee,
                PressureContext::Scoring,
            )
            .await
            .expect("miss");

        let shot = context.last_shot.expect("last shot");
        assert_eq!(shot.club, ClubId::new("driver"));
        assert_eq!(shot.pressure_context, PressureContext::Scoring);
        let stored = recorder.memory().shots().get_shots_with_pressure().await.expect("stored");
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn impossible_hole_numbers_leave_the_session_untouched() {
        let recorder = recorder();
        recorder.set_hole(4).await.expect("hole");

        for hole in [0, 37] {
            assert!(matches!(recorder.set_hole(hole).await, Err(MemoryError::Validation(_))));
        }
        let context = recorder.current_session().await.expect("session");
        assert_eq!(context.current_hole, Some(4));
    }

    #[tokio::test]
    async fn turns_and_round_updates_do_not_clobber_each_other() {
        let recorder = Arc::new(recorder());
        let mut handles = Vec::new();
        for index in 0..8u8 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move {
                recorder.record_turn(ConversationTurn::user(format!("turn {index}"))).await?;
                recorder.set_hole(index + 1).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("update");
        }

        let context = recorder.current_session().await.expect("session");
        assert_eq!(context.conversation_history().len(), 8);
        assert!(context.current_hole.is_some());
    }

    #[tokio::test]
    async fn forget_everything_resets_to_empty() {
        let recorder = recorder();
        for index in 0..(MAX_CONVERSATION_TURNS + 2) {
            recorder
                .record_turn(ConversationTurn::assistant(format!("reply {index}")))
                .await
                .expect("turn");
        }
        recorder
            .record_miss(ClubId::new("putter"), MissDirection::Short, Lie::Green, PressureContext::Normal)
            .await
            .expect("miss");

        let report = recorder.forget_everything().await.expect("forget");

        assert_eq!(report.shots_removed, 1);
        assert_eq!(report.patterns_removed, 1);
        assert!(recorder.current_session().await.expect("session").is_empty());
        assert_eq!(recorder.sessions().get_session().await.expect("raw"), None);
    }
}
