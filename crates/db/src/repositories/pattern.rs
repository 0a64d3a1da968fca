use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tokio::sync::watch;

use caddie_core::domain::pattern::{validate_confidence, MissPattern, PatternId};
use caddie_core::domain::shot::{ClubId, MissDirection, PressureContext};

use super::{decode, format_timestamp, parse_timestamp, MissPatternRepository, RepositoryError};
use crate::live::ChangeNotifier;
use crate::DbPool;

pub struct SqlMissPatternRepository {
    pool: DbPool,
    notifier: ChangeNotifier,
}

impl SqlMissPatternRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, notifier: ChangeNotifier::default() }
    }
}

fn pattern_from_row(row: &SqliteRow) -> Result<MissPattern, RepositoryError> {
    let id: String = decode("id", row.try_get("id"))?;
    let club: Option<String> = decode("club", row.try_get("club"))?;
    let direction: String = decode("direction", row.try_get("direction"))?;
    let frequency: i64 = decode("frequency", row.try_get("frequency"))?;
    let confidence: f64 = decode("confidence", row.try_get("confidence"))?;
    let pressure_context: Option<String> =
        decode("pressure_context", row.try_get("pressure_context"))?;
    let last_occurrence: String = decode("last_occurrence", row.try_get("last_occurrence"))?;

    validate_confidence(confidence).map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(MissPattern {
        id: PatternId(id),
        direction: direction.parse::<MissDirection>().map_err(RepositoryError::Decode)?,
        club: club.map(ClubId),
        frequency: u32::try_from(frequency)
            .map_err(|error| RepositoryError::Decode(format!("frequency: {error}")))?,
        confidence,
        pressure_context: pressure_context
            .map(|value| value.parse::<PressureContext>())
            .transpose()
            .map_err(RepositoryError::Decode)?,
        last_occurrence: parse_timestamp(&last_occurrence)?,
    })
}

#[async_trait::async_trait]
impl MissPatternRepository for SqlMissPatternRepository {
    async fn get_miss_patterns(&self) -> Result<Vec<MissPattern>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, club, direction, frequency, confidence, pressure_context, last_occurrence
             FROM miss_pattern ORDER BY confidence DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pattern_from_row).collect()
    }

    async fn get_patterns_by_club(
        &self,
        club: &ClubId,
    ) -> Result<Vec<MissPattern>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, club, direction, frequency, confidence, pressure_context, last_occurrence
             FROM miss_pattern WHERE club = ? ORDER BY confidence DESC, id ASC",
        )
        .bind(club.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pattern_from_row).collect()
    }

    async fn update_pattern(&self, pattern: MissPattern) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO miss_pattern (id, club, direction, frequency, confidence,
                                       pressure_context, last_occurrence)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 club = excluded.club,
                 direction = excluded.direction,
                 frequency = excluded.frequency,
                 confidence = excluded.confidence,
                 pressure_context = excluded.pressure_context,
                 last_occurrence = excluded.last_occurrence",
        )
        .bind(&pattern.id.0)
        .bind(pattern.club.as_ref().map(ClubId::as_str))
        .bind(pattern.direction.as_str())
        .bind(i64::from(pattern.frequency))
        .bind(pattern.confidence)
        .bind(pattern.pressure_context.map(|context| context.as_str()))
        .bind(format_timestamp(&pattern.last_occurrence))
        .execute(&self.pool)
        .await?;

        self.notifier.notify();
        Ok(())
    }

    async fn delete_stale_patterns(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let removed = sqlx::query("DELETE FROM miss_pattern WHERE last_occurrence < ?")
            .bind(format_timestamp(&cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            self.notifier.notify();
        }
        Ok(removed)
    }

    async fn clear_patterns(&self) -> Result<u64, RepositoryError> {
        let removed =
            sqlx::query("DELETE FROM miss_pattern").execute(&self.pool).await?.rows_affected();
        self.notifier.notify();
        Ok(removed)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use caddie_core::domain::pattern::MissPattern;
    use caddie_core::domain::shot::{ClubId, MissDirection, PressureContext};

    use super::SqlMissPatternRepository;
    use crate::repositories::MissPatternRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlMissPatternRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlMissPatternRepository::new(pool)
    }

    fn pattern(club: &str, direction: MissDirection, confidence: f64, age: Duration) -> MissPattern {
        MissPattern::new(Some(ClubId::new(club)), direction, confidence, Utc::now() - age)
            .expect("pattern")
    }

    #[tokio::test]
    async fn update_pattern_upserts_by_id() {
        let repo = repo().await;
        let mut slice = pattern("driver", MissDirection::Right, 0.4, Duration::days(2));
        slice.pressure_context = Some(PressureContext::Competitive);
        repo.update_pattern(slice.clone()).await.expect("insert");

        slice.frequency = 5;
        slice.confidence = 0.7;
        slice.last_occurrence = Utc::now();
        repo.update_pattern(slice.clone()).await.expect("update");

        let stored = repo.get_patterns_by_club(&ClubId::new("driver")).await.expect("fetch");
        assert_eq!(stored, vec![slice]);
    }

    #[tokio::test]
    async fn delete_stale_patterns_removes_exactly_older_rows() {
        let repo = repo().await;
        let now = Utc::now();
        let cutoff = now - Duration::days(90);

        let mut just_older = pattern("driver", MissDirection::Right, 0.5, Duration::zero());
        just_older.last_occurrence = cutoff - Duration::milliseconds(1);
        let mut at_cutoff = pattern("driver", MissDirection::Left, 0.5, Duration::zero());
        at_cutoff.last_occurrence = cutoff;
        let recent = pattern("7-iron", MissDirection::Short, 0.9, Duration::days(3));
        let ancient = pattern("7-iron", MissDirection::Long, 0.9, Duration::days(400));

        for item in [just_older, at_cutoff.clone(), recent.clone(), ancient] {
            repo.update_pattern(item).await.expect("insert");
        }

        assert_eq!(repo.delete_stale_patterns(cutoff).await.expect("delete"), 2);

        let mut remaining = repo.get_miss_patterns().await.expect("remaining");
        remaining.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let mut expected = vec![at_cutoff, recent];
        expected.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        assert_eq!(remaining, expected);
    }

    #[tokio::test]
    async fn patterns_without_club_are_listed_but_not_matched_by_club() {
        let repo = repo().await;
        let unattributed =
            MissPattern::new(None, MissDirection::Fat, 0.2, Utc::now()).expect("pattern");
        repo.update_pattern(unattributed.clone()).await.expect("insert");

        assert_eq!(repo.get_miss_patterns().await.expect("all"), vec![unattributed]);
        assert!(repo.get_patterns_by_club(&ClubId::new("driver")).await.expect("club").is_empty());
        assert_eq!(repo.clear_patterns().await.expect("clear"), 1);
    }
}
