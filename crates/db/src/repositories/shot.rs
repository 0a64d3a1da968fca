use chrono::{Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tokio::sync::watch;

use caddie_core::domain::shot::{ClubId, Lie, MissDirection, PressureContext, Shot, ShotId};

use super::{
    decode, format_timestamp, parse_timestamp, RepositoryError, ShotRepository,
    DEFAULT_SHOT_RETENTION_DAYS,
};
use crate::live::ChangeNotifier;
use crate::DbPool;

const SHOT_COLUMNS: &str =
    "id, recorded_at, club, miss_direction, lie, pressure_context, hole_number, notes";

pub struct SqlShotRepository {
    pool: DbPool,
    retention_days: u32,
    notifier: ChangeNotifier,
}

impl SqlShotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self::with_retention_days(pool, DEFAULT_SHOT_RETENTION_DAYS)
    }

    pub fn with_retention_days(pool: DbPool, retention_days: u32) -> Self {
        Self { pool, retention_days, notifier: ChangeNotifier::default() }
    }

    async fn fetch(&self, sql: &str, bind: Option<String>) -> Result<Vec<Shot>, RepositoryError> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(shot_from_row).collect()
    }
}

pub(crate) fn shot_from_row(row: &SqliteRow) -> Result<Shot, RepositoryError> {
    let id: String = decode("id", row.try_get("id"))?;
    let recorded_at: String = decode("recorded_at", row.try_get("recorded_at"))?;
    let club: String = decode("club", row.try_get("club"))?;
    let miss_direction: Option<String> = decode("miss_direction", row.try_get("miss_direction"))?;
    let lie: String = decode("lie", row.try_get("lie"))?;
    let pressure_context: String = decode("pressure_context", row.try_get("pressure_context"))?;
    let hole_number: Option<i64> = decode("hole_number", row.try_get("hole_number"))?;
    let notes: Option<String> = decode("notes", row.try_get("notes"))?;

    let miss_direction = miss_direction
        .map(|value| value.parse::<MissDirection>())
        .transpose()
        .map_err(RepositoryError::Decode)?;
    let hole_number = hole_number
        .map(u8::try_from)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("hole_number: {error}")))?;

    Ok(Shot {
        id: ShotId(id),
        timestamp: parse_timestamp(&recorded_at)?,
        club: ClubId(club),
        miss_direction,
        lie: lie.parse::<Lie>().map_err(RepositoryError::Decode)?,
        pressure_context: pressure_context
            .parse::<PressureContext>()
            .map_err(RepositoryError::Decode)?,
        hole_number,
        notes,
    })
}

#[async_trait::async_trait]
impl ShotRepository for SqlShotRepository {
    async fn record_shot(&self, shot: Shot) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shot (id, recorded_at, club, miss_direction, lie, pressure_context,
                               hole_number, notes)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 recorded_at = excluded.recorded_at,
                 club = excluded.club,
                 miss_direction = excluded.miss_direction,
                 lie = excluded.lie,
                 pressure_context = excluded.pressure_context,
                 hole_number = excluded.hole_number,
                 notes = excluded.notes",
        )
        .bind(&shot.id.0)
        .bind(format_timestamp(&shot.timestamp))
        .bind(shot.club.as_str())
        .bind(shot.miss_direction.map(|direction| direction.as_str()))
        .bind(shot.lie.as_str())
        .bind(shot.pressure_context.as_str())
        .bind(shot.hole_number.map(i64::from))
        .bind(&shot.notes)
        .execute(&self.pool)
        .await?;

        self.notifier.notify();
        Ok(())
    }

    async fn get_recent_shots(&self, days: u32) -> Result<Vec<Shot>, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        self.fetch(
            &format!(
                "SELECT {SHOT_COLUMNS} FROM shot WHERE recorded_at >= ?
                 ORDER BY recorded_at DESC"
            ),
            Some(format_timestamp(&cutoff)),
        )
        .await
    }

    async fn get_shots_by_club(&self, club: &ClubId) -> Result<Vec<Shot>, RepositoryError> {
        self.fetch(
            &format!(
                "SELECT {SHOT_COLUMNS} FROM shot WHERE club = ?
                 ORDER BY recorded_at DESC"
            ),
            Some(club.as_str().to_string()),
        )
        .await
    }

    async fn get_shots_with_pressure(&self) -> Result<Vec<Shot>, RepositoryError> {
        self.fetch(
            &format!(
                "SELECT {SHOT_COLUMNS} FROM shot WHERE pressure_context <> 'normal'
                 ORDER BY recorded_at DESC"
            ),
            None,
        )
        .await
    }

    async fn enforce_retention_policy(&self) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let removed = sqlx::query("DELETE FROM shot WHERE recorded_at < ?")
            .bind(format_timestamp(&cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 {
            self.notifier.notify();
        }
        Ok(removed)
    }

    async fn clear_shots(&self) -> Result<u64, RepositoryError> {
        let removed = sqlx::query("DELETE FROM shot").execute(&self.pool).await?.rows_affected();
        self.notifier.notify();
        Ok(removed)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use caddie_core::domain::shot::{ClubId, Lie, MissDirection, PressureContext, Shot};

    use super::SqlShotRepository;
    use crate::repositories::ShotRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn shot_round_trips_field_for_field() {
        let repo = SqlShotRepository::new(setup().await);
        let timestamp = Utc::now() - Duration::minutes(5);
        let shot = Shot::new(ClubId::new("7-iron"), Lie::Rough, timestamp)
            .with_miss(MissDirection::Left)
            .with_pressure(PressureContext::Scoring)
            .on_hole(14)
            .with_notes("pulled it into the trees");

        repo.record_shot(shot.clone()).await.expect("record");
        let stored = repo.get_shots_by_club(&ClubId::new("7-iron")).await.expect("fetch");

        assert_eq!(stored, vec![shot]);
    }

    #[tokio::test]
    async fn shot_without_optional_fields_round_trips() {
        let repo = SqlShotRepository::new(setup().await);
        let shot = Shot::new(
            ClubId::new("putter"),
            Lie::Green,
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0).single().expect("timestamp"),
        );

        repo.record_shot(shot.clone()).await.expect("record");
        let stored = repo.get_shots_by_club(&shot.club).await.expect("fetch");

        assert_eq!(stored, vec![shot]);
    }

    #[tokio::test]
    async fn recent_and_pressure_queries_filter_rows() {
        let repo = SqlShotRepository::new(setup().await);
        let now = Utc::now();
        let stale = Shot::new(ClubId::new("driver"), Lie::Tee, now - Duration::days(40));
        let fresh = Shot::new(ClubId::new("driver"), Lie::Tee, now - Duration::hours(2))
            .with_pressure(PressureContext::Competitive);
        repo.record_shot(stale).await.expect("stale");
        repo.record_shot(fresh.clone()).await.expect("fresh");

        assert_eq!(repo.get_recent_shots(30).await.expect("recent"), vec![fresh.clone()]);
        assert_eq!(repo.get_shots_with_pressure().await.expect("pressure"), vec![fresh]);
    }

    #[tokio::test]
    async fn retention_and_clear_report_counts() {
        let repo = SqlShotRepository::with_retention_days(setup().await, 90);
        let now = Utc::now();
        for age in [120, 95, 10] {
            repo.record_shot(Shot::new(ClubId::new("3-wood"), Lie::Fairway, now - Duration::days(age)))
                .await
                .expect("record");
        }

        let revision_before = *repo.changes().borrow();
        assert_eq!(repo.enforce_retention_policy().await.expect("sweep"), 2);
        assert!(*repo.changes().borrow() > revision_before);
        assert_eq!(repo.clear_shots().await.expect("clear"), 1);
    }
}
