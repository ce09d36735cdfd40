// Participant rows. Registry rules live in `crate::participant`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Database;
use crate::participant::ParticipantStatus;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ParticipantRow {
    pub competition_id: i64,
    pub player_id: i64,
    pub status: String,
    pub invited_at: Option<DateTime<Utc>>,
    pub invited_by: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

const PARTICIPANT_COLUMNS: &str =
    "competition_id, player_id, status, invited_at, invited_by, joined_at, left_at";

impl Database {
    pub async fn get_participant(
        &self,
        competition_id: i64,
        player_id: i64,
    ) -> Result<Option<ParticipantRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM competition_participants WHERE competition_id = ? AND player_id = ?"
        );
        let rows = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(competition_id)
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn list_participants(
        &self,
        competition_id: i64,
    ) -> Result<Vec<ParticipantRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM competition_participants WHERE competition_id = ? ORDER BY id"
        );
        let rows = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(competition_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Player ids of every participant that has not left, in join order.
    pub async fn active_roster(&self, competition_id: i64) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query_scalar(
            "SELECT player_id FROM competition_participants WHERE competition_id = ? AND status != ? ORDER BY id",
        )
        .bind(competition_id)
        .bind(ParticipantStatus::Left.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_active_participants(&self, competition_id: i64) -> Result<i64, sqlx::Error> {
        let rows = sqlx::query_scalar(
            "SELECT COUNT(*) FROM competition_participants WHERE competition_id = ? AND status != ?",
        )
        .bind(competition_id)
        .bind(ParticipantStatus::Left.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert a participant only while fewer than `max_participants` are
    /// active. The count and the insert are one statement, so concurrent
    /// joins cannot overshoot the cap. Returns false when the cap was hit.
    ///
    /// A second row for the same pair fails with a unique violation.
    pub async fn insert_participant_within_capacity(
        &self,
        competition_id: i64,
        player_id: i64,
        status: ParticipantStatus,
        invited_by: Option<&str>,
        max_participants: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let (invited_at, joined_at) = match status {
            ParticipantStatus::Invited => (Some(now), None),
            _ => (invited_by.map(|_| now), Some(now)),
        };
        let result = sqlx::query(
            r#"
            INSERT INTO competition_participants
                (competition_id, player_id, status, invited_at, invited_by, joined_at)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE (
                SELECT COUNT(*) FROM competition_participants
                WHERE competition_id = ? AND status != ?
            ) < ?
            "#,
        )
        .bind(competition_id)
        .bind(player_id)
        .bind(status.as_str())
        .bind(invited_at)
        .bind(invited_by)
        .bind(joined_at)
        .bind(competition_id)
        .bind(ParticipantStatus::Left.as_str())
        .bind(max_participants)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// INVITED -> JOINED. Returns false if there was no pending invitation.
    pub async fn accept_participant_invite(
        &self,
        competition_id: i64,
        player_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE competition_participants SET status = ?, joined_at = ? WHERE competition_id = ? AND player_id = ? AND status = ?",
        )
        .bind(ParticipantStatus::Joined.as_str())
        .bind(now)
        .bind(competition_id)
        .bind(player_id)
        .bind(ParticipantStatus::Invited.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark an active participant as left. Returns false if there was no
    /// active row.
    pub async fn mark_participant_left(
        &self,
        competition_id: i64,
        player_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE competition_participants SET status = ?, left_at = ? WHERE competition_id = ? AND player_id = ? AND status != ?",
        )
        .bind(ParticipantStatus::Left.as_str())
        .bind(now)
        .bind(competition_id)
        .bind(player_id)
        .bind(ParticipantStatus::Left.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
