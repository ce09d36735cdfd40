// Snapshot rows and per-competition capture claims.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use super::Database;
use crate::snapshot::SnapshotKind;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SnapshotRow {
    pub competition_id: i64,
    pub player_id: i64,
    pub snapshot_type: String,
    pub payload: String,
    pub captured_at: DateTime<Utc>,
}

/// Claim the capture of `kind` for a competition. Returns false if another
/// capture already claimed it.
pub async fn claim_capture(
    conn: &mut SqliteConnection,
    competition_id: i64,
    kind: SnapshotKind,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO competition_captures (competition_id, snapshot_type, captured_at) VALUES (?, ?, ?)",
    )
    .bind(competition_id)
    .bind(kind.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record how the claimed capture went.
pub async fn finish_capture(
    conn: &mut SqliteConnection,
    competition_id: i64,
    kind: SnapshotKind,
    succeeded: i64,
    failed: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE competition_captures SET succeeded = ?, failed = ? WHERE competition_id = ? AND snapshot_type = ?",
    )
    .bind(succeeded)
    .bind(failed)
    .bind(competition_id)
    .bind(kind.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write one snapshot. A second write for the same (competition, player,
/// kind) fails with a unique violation; snapshots are never overwritten.
pub async fn insert_snapshot(
    conn: &mut SqliteConnection,
    competition_id: i64,
    player_id: i64,
    kind: SnapshotKind,
    payload: &str,
    captured_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO competition_snapshots (competition_id, player_id, snapshot_type, payload, captured_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(competition_id)
    .bind(player_id)
    .bind(kind.as_str())
    .bind(payload)
    .bind(captured_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Database {
    pub async fn list_snapshots(
        &self,
        competition_id: i64,
        kind: SnapshotKind,
    ) -> Result<Vec<SnapshotRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT competition_id, player_id, snapshot_type, payload, captured_at FROM competition_snapshots WHERE competition_id = ? AND snapshot_type = ? ORDER BY id",
        )
        .bind(competition_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_snapshots(
        &self,
        competition_id: i64,
        kind: SnapshotKind,
    ) -> Result<i64, sqlx::Error> {
        let rows = sqlx::query_scalar(
            "SELECT COUNT(*) FROM competition_snapshots WHERE competition_id = ? AND snapshot_type = ?",
        )
        .bind(competition_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn has_capture(
        &self,
        competition_id: i64,
        kind: SnapshotKind,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM competition_captures WHERE competition_id = ? AND snapshot_type = ?",
        )
        .bind(competition_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}
