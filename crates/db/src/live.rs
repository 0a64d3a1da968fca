//! Change notification for repositories and restartable live queries built
//! on top of it.
//!
//! Every repository owns a [`ChangeNotifier`] and bumps it after each
//! committed mutation. A [`LiveQuery`] emits a snapshot as soon as it is
//! polled, then one fresh snapshot per observed bump. Notifications that
//! arrive while a snapshot is being fetched coalesce into a single re-fetch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use caddie_core::domain::pattern::MissPattern;
use caddie_core::domain::session::SessionContext;
use caddie_core::domain::shot::{ClubId, Shot};

use crate::repositories::{
    MissPatternRepository, RepositoryError, SessionRepository, ShotRepository,
};

type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send>>;
type Fetch<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

#[derive(Debug)]
pub struct ChangeNotifier {
    sender: watch::Sender<u64>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self { sender: watch::Sender::new(0) }
    }
}

impl ChangeNotifier {
    pub fn notify(&self) {
        self.sender.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.sender.borrow()
    }
}

pub struct LiveQuery<T> {
    changes: watch::Receiver<u64>,
    fetch: Fetch<T>,
    primed: bool,
}

impl<T> LiveQuery<T> {
    pub fn new<F, Fut>(changes: watch::Receiver<u64>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RepositoryError>> + Send + 'static,
    {
        let fetch: Fetch<T> = Arc::new(move || -> FetchFuture<T> { Box::pin(fetch()) });
        Self { changes, fetch, primed: false }
    }

    /// Next snapshot. The first call returns immediately; later calls wait
    /// for a mutation. `None` once the owning repository is gone.
    pub async fn next(&mut self) -> Option<Result<T, RepositoryError>> {
        if self.primed {
            self.changes.changed().await.ok()?;
        } else {
            self.primed = true;
        }
        self.changes.borrow_and_update();
        Some((self.fetch)().await)
    }

    /// An independent subscription over the same query, starting fresh.
    pub fn restart(&self) -> Self {
        Self { changes: self.changes.clone(), fetch: Arc::clone(&self.fetch), primed: false }
    }
}

pub fn recent_shots(repo: Arc<dyn ShotRepository>, days: u32) -> LiveQuery<Vec<Shot>> {
    LiveQuery::new(repo.changes(), move || {
        let repo = Arc::clone(&repo);
        async move { repo.get_recent_shots(days).await }
    })
}

pub fn shots_by_club(repo: Arc<dyn ShotRepository>, club: ClubId) -> LiveQuery<Vec<Shot>> {
    LiveQuery::new(repo.changes(), move || {
        let repo = Arc::clone(&repo);
        let club = club.clone();
        async move { repo.get_shots_by_club(&club).await }
    })
}

pub fn shots_with_pressure(repo: Arc<dyn ShotRepository>) -> LiveQuery<Vec<Shot>> {
    LiveQuery::new(repo.changes(), move || {
        let repo = Arc::clone(&repo);
        async move { repo.get_shots_with_pressure().await }
    })
}

pub fn miss_patterns(repo: Arc<dyn MissPatternRepository>) -> LiveQuery<Vec<MissPattern>> {
    LiveQuery::new(repo.changes(), move || {
        let repo = Arc::clone(&repo);
        async move { repo.get_miss_patterns().await }
    })
}

pub fn patterns_by_club(
    repo: Arc<dyn MissPatternRepository>,
    club: ClubId,
) -> LiveQuery<Vec<MissPattern>> {
    LiveQuery::new(repo.changes(), move || {
        let repo = Arc::clone(&repo);
        let club = club.clone();
        async move { repo.get_patterns_by_club(&club).await }
    })
}

pub fn session(repo: Arc<dyn SessionRepository>) -> LiveQuery<Option<SessionContext>> {
    LiveQuery::new(repo.changes(), move || {
        let repo = Arc::clone(&repo);
        async move { repo.get_session().await }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use caddie_core::domain::session::ConversationTurn;
    use caddie_core::domain::shot::{ClubId, Lie, MissDirection, Shot};

    use super::{recent_shots, session, shots_by_club, ChangeNotifier};
    use crate::repositories::{
        InMemorySessionRepository, InMemoryShotRepository, SessionRepository, ShotRepository,
    };

    #[test]
    fn notifier_counts_revisions() {
        let notifier = ChangeNotifier::default();
        assert_eq!(notifier.revision(), 0);
        notifier.notify();
        notifier.notify();
        assert_eq!(notifier.revision(), 2);
    }

    #[tokio::test]
    async fn first_poll_emits_current_snapshot() {
        let repo = Arc::new(InMemoryShotRepository::default());
        repo.record_shot(Shot::new(ClubId::new("7-iron"), Lie::Fairway, Utc::now()))
            .await
            .expect("record");

        let mut query = recent_shots(repo.clone(), 7);
        let snapshot = query.next().await.expect("open").expect("fetch");
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn re_emits_after_each_mutation() {
        let repo = Arc::new(InMemoryShotRepository::default());
        let club = ClubId::new("driver");
        let mut query = shots_by_club(repo.clone(), club.clone());
        assert!(query.next().await.expect("open").expect("fetch").is_empty());

        repo.record_shot(
            Shot::new(club.clone(), Lie::Tee, Utc::now()).with_miss(MissDirection::Right),
        )
        .await
        .expect("record");
        let snapshot = query.next().await.expect("open").expect("fetch");
        assert_eq!(snapshot.len(), 1);

        let pending = tokio::time::timeout(Duration::from_millis(50), query.next()).await;
        assert!(pending.is_err(), "no mutation means no new snapshot");
    }

    #[tokio::test]
    async fn restarted_subscriptions_are_independent() {
        let repo = Arc::new(InMemorySessionRepository::default());
        let mut first = session(repo.clone());
        assert_eq!(first.next().await.expect("open").expect("fetch"), None);

        repo.add_conversation_turn(ConversationTurn::user("hello")).await.expect("turn");
        let mut second = first.restart();

        let from_second = second.next().await.expect("open").expect("fetch");
        let from_first = first.next().await.expect("open").expect("fetch");
        assert_eq!(from_first, from_second);
        assert_eq!(from_first.map(|context| context.conversation_history().len()), Some(1));
    }
}
