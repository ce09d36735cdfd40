// Competition rows and lifecycle detection queries.

use chrono::{DateTime, Utc};

use super::Database;
use crate::competition::{Competition, NewCompetition, Visibility};
use crate::criteria::CompetitionCriteria;
use crate::error::IntegrityError;
use crate::snapshot::SnapshotKind;

/// A competition as stored. Convert with `Competition::try_from`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompetitionRow {
    pub id: i64,
    pub server_id: String,
    pub owner_id: String,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub visibility: String,
    pub max_participants: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub season_id: Option<String>,
    pub criteria_type: String,
    pub criteria_config: String,
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CompetitionRow> for Competition {
    type Error = IntegrityError;

    fn try_from(row: CompetitionRow) -> Result<Self, Self::Error> {
        let visibility =
            Visibility::from_str_name(&row.visibility).ok_or_else(|| IntegrityError::UnknownValue {
                field: "visibility",
                value: row.visibility.clone(),
            })?;
        let criteria =
            CompetitionCriteria::from_stored(row.id, &row.criteria_type, &row.criteria_config)?;
        Ok(Competition {
            id: row.id,
            server_id: row.server_id,
            owner_id: row.owner_id,
            channel_id: row.channel_id,
            title: row.title,
            description: row.description,
            visibility,
            max_participants: row.max_participants,
            start_date: row.start_date,
            end_date: row.end_date,
            season_id: row.season_id,
            criteria,
            is_cancelled: row.is_cancelled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// Effective window of a competition joined against its season.
const EFFECTIVE_START: &str = "COALESCE(c.start_date, s.start_date)";
const EFFECTIVE_END: &str = "COALESCE(c.end_date, s.end_date)";

impl Database {
    pub async fn insert_competition(
        &self,
        new: &NewCompetition,
        now: DateTime<Utc>,
    ) -> Result<CompetitionRow, sqlx::Error> {
        let config = serde_json::to_string(&new.criteria)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let row = sqlx::query_as::<_, CompetitionRow>(
            r#"
            INSERT INTO competitions (
                server_id, owner_id, channel_id, title, description, visibility,
                max_participants, start_date, end_date, season_id,
                criteria_type, criteria_config, is_cancelled, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&new.server_id)
        .bind(&new.owner_id)
        .bind(&new.channel_id)
        .bind(new.title.trim())
        .bind(&new.description)
        .bind(new.visibility.as_str())
        .bind(new.max_participants)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(&new.season_id)
        .bind(new.criteria.type_name())
        .bind(config)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_competition(&self, id: i64) -> Result<Option<CompetitionRow>, sqlx::Error> {
        let row = sqlx::query_as::<_, CompetitionRow>("SELECT * FROM competitions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_competitions_for_server(
        &self,
        server_id: &str,
    ) -> Result<Vec<CompetitionRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CompetitionRow>(
            "SELECT * FROM competitions WHERE server_id = ? ORDER BY id",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Set the cancellation flag. The flag never goes back to false.
    /// Returns false if the competition does not exist.
    pub async fn cancel_competition(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE competitions
            SET is_cancelled = 1,
                updated_at = CASE WHEN is_cancelled = 1 THEN updated_at ELSE ? END
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Competitions owned by `owner_id` that are neither cancelled nor ended.
    pub async fn count_active_for_owner(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT COUNT(*) FROM competitions c
            LEFT JOIN seasons s ON s.id = c.season_id
            WHERE c.owner_id = ? AND c.is_cancelled = 0
              AND ({EFFECTIVE_END} IS NULL OR {EFFECTIVE_END} > ?)
            "#
        );
        let rows = sqlx::query_scalar(&sql)
            .bind(owner_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Competitions on `server_id` that are neither cancelled nor ended.
    pub async fn count_active_for_server(
        &self,
        server_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT COUNT(*) FROM competitions c
            LEFT JOIN seasons s ON s.id = c.season_id
            WHERE c.server_id = ? AND c.is_cancelled = 0
              AND ({EFFECTIVE_END} IS NULL OR {EFFECTIVE_END} > ?)
            "#
        );
        let rows = sqlx::query_scalar(&sql)
            .bind(server_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Not cancelled, started by `now`, and no START capture yet.
    pub async fn competitions_to_start(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompetitionRow>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT c.* FROM competitions c
            LEFT JOIN seasons s ON s.id = c.season_id
            WHERE c.is_cancelled = 0
              AND {EFFECTIVE_START} <= ?
              AND NOT EXISTS (
                  SELECT 1 FROM competition_captures cc
                  WHERE cc.competition_id = c.id AND cc.snapshot_type = '{start}'
              )
            ORDER BY c.id
            "#,
            start = SnapshotKind::Start.as_str(),
        );
        let rows = sqlx::query_as::<_, CompetitionRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Not cancelled, ended by `now`, START captured, END not yet captured.
    pub async fn competitions_to_end(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompetitionRow>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT c.* FROM competitions c
            LEFT JOIN seasons s ON s.id = c.season_id
            WHERE c.is_cancelled = 0
              AND {EFFECTIVE_END} <= ?
              AND EXISTS (
                  SELECT 1 FROM competition_captures cc
                  WHERE cc.competition_id = c.id AND cc.snapshot_type = '{start}'
              )
              AND NOT EXISTS (
                  SELECT 1 FROM competition_captures cc
                  WHERE cc.competition_id = c.id AND cc.snapshot_type = '{end}'
              )
            ORDER BY c.id
            "#,
            start = SnapshotKind::Start.as_str(),
            end = SnapshotKind::End.as_str(),
        );
        let rows = sqlx::query_as::<_, CompetitionRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::sample_new;
    use super::*;
    use crate::criteria::Queue;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_and_load_competition() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();

        let row = db.insert_competition(&sample_new(), now).await.unwrap();
        assert!(row.id > 0);
        assert_eq!(row.criteria_type, "MOST_GAMES_PLAYED");
        assert!(!row.is_cancelled);

        let loaded = db.get_competition(row.id).await.unwrap().unwrap();
        let competition = Competition::try_from(loaded).unwrap();
        assert_eq!(competition.title, "Weekly grind");
        assert_eq!(competition.visibility, Visibility::Open);
        assert_eq!(
            competition.criteria,
            CompetitionCriteria::MostGamesPlayed { queue: Queue::Solo }
        );

        assert!(db.get_competition(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_monotonic() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        let row = db.insert_competition(&sample_new(), now).await.unwrap();

        let later = now + Duration::minutes(5);
        assert!(db.cancel_competition(row.id, later).await.unwrap());
        assert!(db
            .cancel_competition(row.id, later + Duration::minutes(5))
            .await
            .unwrap());

        let row = db.get_competition(row.id).await.unwrap().unwrap();
        assert!(row.is_cancelled);
        assert_eq!(row.updated_at, later);
        assert!(!db.cancel_competition(999, later).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_counts_skip_cancelled_and_ended() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();

        let active = db.insert_competition(&sample_new(), now).await.unwrap();
        let cancelled = db.insert_competition(&sample_new(), now).await.unwrap();
        db.cancel_competition(cancelled.id, now).await.unwrap();

        let mut ended = sample_new();
        ended.start_date = Some(now - Duration::days(3));
        ended.end_date = Some(now - Duration::days(1));
        db.insert_competition(&ended, now).await.unwrap();

        assert_eq!(db.count_active_for_owner("owner-1", now).await.unwrap(), 1);
        assert_eq!(db.count_active_for_server("server-1", now).await.unwrap(), 1);
        assert_eq!(db.count_active_for_owner("someone", now).await.unwrap(), 0);
        assert!(active.id > 0);
    }

    #[tokio::test]
    async fn test_start_detection_respects_start_date() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        let row = db.insert_competition(&sample_new(), now).await.unwrap();

        assert!(db.competitions_to_start(now).await.unwrap().is_empty());

        let due = db
            .competitions_to_start(now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, row.id);

        // Nothing to end before a START capture exists.
        assert!(db
            .competitions_to_end(now + Duration::days(8))
            .await
            .unwrap()
            .is_empty());
    }
}
