use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use tokio::sync::{watch, Mutex};

use caddie_core::domain::session::{
    ConversationTurn, RoundId, SessionContext, SessionId, TurnId, TurnRole,
    MAX_CONVERSATION_TURNS,
};
use caddie_core::domain::shot::Shot;

use super::{decode, format_timestamp, parse_timestamp, RepositoryError, SessionRepository};
use crate::live::ChangeNotifier;
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
    // Serialises read-modify-write sequences so SQLite never has to upgrade
    // two deferred transactions at once.
    write_lock: Mutex<()>,
    notifier: ChangeNotifier,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, write_lock: Mutex::new(()), notifier: ChangeNotifier::default() }
    }
}

async fn load_session(
    conn: &mut SqliteConnection,
) -> Result<Option<SessionContext>, RepositoryError> {
    let row = sqlx::query(
        "SELECT session_id, current_round, current_hole, last_shot_json, last_recommendation
         FROM session_context WHERE singleton = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let session_id: String = decode("session_id", row.try_get("session_id"))?;
    let current_round: Option<String> = decode("current_round", row.try_get("current_round"))?;
    let current_hole: Option<i64> = decode("current_hole", row.try_get("current_hole"))?;
    let last_shot_json: Option<String> = decode("last_shot_json", row.try_get("last_shot_json"))?;
    let last_recommendation: Option<String> =
        decode("last_recommendation", row.try_get("last_recommendation"))?;

    let last_shot = last_shot_json
        .map(|json| serde_json::from_str::<Shot>(&json))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("last_shot_json: {error}")))?;
    let current_hole = current_hole
        .map(u8::try_from)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("current_hole: {error}")))?;

    let turn_rows = sqlx::query(
        "SELECT id, role, content, occurred_at FROM conversation_turn ORDER BY seq ASC",
    )
    .fetch_all(&mut *conn)
    .await?;
    let history = turn_rows
        .iter()
        .map(|turn_row| -> Result<ConversationTurn, RepositoryError> {
            let id: String = decode("id", turn_row.try_get("id"))?;
            let role: String = decode("role", turn_row.try_get("role"))?;
            let content: String = decode("content", turn_row.try_get("content"))?;
            let occurred_at: String = decode("occurred_at", turn_row.try_get("occurred_at"))?;
            Ok(ConversationTurn {
                id: TurnId(id),
                role: TurnRole::parse(&role)
                    .ok_or_else(|| RepositoryError::Decode(format!("invalid turn role `{role}`")))?,
                content,
                timestamp: parse_timestamp(&occurred_at)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut context = SessionContext::new(SessionId(session_id)).with_history(history);
    context.current_round = current_round.map(RoundId);
    context.current_hole = current_hole;
    context.last_shot = last_shot;
    context.last_recommendation = last_recommendation;
    Ok(Some(context))
}

async fn write_session_row(
    conn: &mut SqliteConnection,
    context: &SessionContext,
) -> Result<(), RepositoryError> {
    let last_shot_json = context
        .last_shot
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("last_shot_json: {error}")))?;

    sqlx::query(
        "INSERT INTO session_context (singleton, session_id, current_round, current_hole,
                                      last_shot_json, last_recommendation, updated_at)
         VALUES (1, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(singleton) DO UPDATE SET
             session_id = excluded.session_id,
             current_round = excluded.current_round,
             current_hole = excluded.current_hole,
             last_shot_json = excluded.last_shot_json,
             last_recommendation = excluded.last_recommendation,
             updated_at = excluded.updated_at",
    )
    .bind(&context.session_id.0)
    .bind(context.current_round.as_ref().map(|round| round.0.as_str()))
    .bind(context.current_hole.map(i64::from))
    .bind(last_shot_json)
    .bind(&context.last_recommendation)
    .bind(format_timestamp(&Utc::now()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_turn(
    conn: &mut SqliteConnection,
    turn: &ConversationTurn,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO conversation_turn (id, role, content, occurred_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&turn.id.0)
    .bind(turn.role.as_str())
    .bind(&turn.content)
    .bind(format_timestamp(&turn.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn trim_turns(conn: &mut SqliteConnection) -> Result<(), RepositoryError> {
    sqlx::query(
        "DELETE FROM conversation_turn WHERE seq NOT IN (
             SELECT seq FROM conversation_turn ORDER BY seq DESC LIMIT ?
         )",
    )
    .bind(MAX_CONVERSATION_TURNS as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn get_session(&self) -> Result<Option<SessionContext>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_session(&mut conn).await
    }

    async fn save_session(&self, context: SessionContext) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        write_session_row(&mut tx, &context).await?;
        sqlx::query("DELETE FROM conversation_turn").execute(&mut *tx).await?;
        for turn in context.conversation_history() {
            insert_turn(&mut tx, turn).await?;
        }

        tx.commit().await?;
        self.notifier.notify();
        Ok(())
    }

    async fn add_conversation_turn(
        &self,
        turn: ConversationTurn,
    ) -> Result<SessionContext, RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        if load_session(&mut tx).await?.is_none() {
            write_session_row(&mut tx, &SessionContext::new(SessionId::generate())).await?;
        }
        insert_turn(&mut tx, &turn).await?;
        trim_turns(&mut tx).await?;
        let context = load_session(&mut tx)
            .await?
            .ok_or_else(|| RepositoryError::Decode("session row missing after insert".to_string()))?;

        tx.commit().await?;
        self.notifier.notify();
        Ok(context)
    }

    async fn clear_conversation_history(&self) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM conversation_turn").execute(&self.pool).await?;
        self.notifier.notify();
        Ok(())
    }

    async fn delete_session(&self) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM conversation_turn").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM session_context").execute(&mut *tx).await?;
        tx.commit().await?;
        self.notifier.notify();
        Ok(())
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use caddie_core::domain::session::{
        ConversationTurn, RoundId, SessionContext, SessionId, MAX_CONVERSATION_TURNS,
    };
    use caddie_core::domain::shot::{ClubId, Lie, MissDirection, Shot};

    use super::SqlSessionRepository;
    use crate::repositories::SessionRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlSessionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlSessionRepository::new(pool)
    }

    #[tokio::test]
    async fn missing_session_reads_as_none() {
        assert_eq!(repo().await.get_session().await.expect("get"), None);
    }

    #[tokio::test]
    async fn save_and_load_preserves_every_field() {
        let repo = repo().await;
        let shot = Shot::new(ClubId::new("9-iron"), Lie::Fairway, Utc::now())
            .with_miss(MissDirection::Short)
            .on_hole(4);
        let context = SessionContext::new(SessionId::generate())
            .with_round(RoundId::generate())
            .with_shot(shot)
            .with_recommendation("club up into the wind")
            .adding_turn(ConversationTurn::user("what now"))
            .adding_turn(ConversationTurn::assistant("take one more club"));

        repo.save_session(context.clone()).await.expect("save");

        assert_eq!(repo.get_session().await.expect("get"), Some(context));
    }

    #[tokio::test]
    async fn add_turn_creates_session_and_keeps_newest_turns() {
        let repo = repo().await;
        let mut last = None;
        for index in 0..(MAX_CONVERSATION_TURNS + 3) {
            last = Some(
                repo.add_conversation_turn(ConversationTurn::user(format!("turn {index}")))
                    .await
                    .expect("append"),
            );
        }

        let context = last.expect("context");
        let contents: Vec<&str> =
            context.conversation_history().iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents.len(), MAX_CONVERSATION_TURNS);
        assert_eq!(contents.first(), Some(&"turn 3"));
        assert_eq!(contents.last(), Some(&"turn 12"));
        assert!(!context.session_id.0.is_empty());
        assert_eq!(repo.get_session().await.expect("get"), Some(context));
    }

    #[tokio::test]
    async fn concurrent_appends_respect_bound() {
        let repo = Arc::new(repo().await);
        let mut handles = Vec::new();
        for index in 0..15 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.add_conversation_turn(ConversationTurn::user(format!("{index}"))).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("append");
        }

        let stored = repo.get_session().await.expect("get").expect("session");
        assert_eq!(stored.conversation_history().len(), MAX_CONVERSATION_TURNS);
    }

    #[tokio::test]
    async fn clear_history_then_delete_session() {
        let repo = repo().await;
        repo.add_conversation_turn(ConversationTurn::user("hello")).await.expect("append");

        repo.clear_conversation_history().await.expect("clear");
        let cleared = repo.get_session().await.expect("get").expect("session");
        assert!(cleared.conversation_history().is_empty());

        repo.delete_session().await.expect("delete");
        assert_eq!(repo.get_session().await.expect("get"), None);
    }
}
