// Database access layer (SQLite via sqlx).

mod competitions;
mod participants;
mod snapshots;
mod stats;

pub use competitions::CompetitionRow;
pub use participants::ParticipantRow;
pub use snapshots::{claim_capture, finish_capture, insert_snapshot, SnapshotRow};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;

use crate::competition::Season;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect(database_url, 5).await
    }

    /// Private in-memory database on a single connection.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Start a transaction. A lifecycle transition commits as one unit.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seasons (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                visibility TEXT NOT NULL,
                max_participants INTEGER NOT NULL CHECK (max_participants >= 2),
                start_date TEXT,
                end_date TEXT,
                season_id TEXT REFERENCES seasons(id),
                criteria_type TEXT NOT NULL,
                criteria_config TEXT NOT NULL,
                is_cancelled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competition_participants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                competition_id INTEGER NOT NULL REFERENCES competitions(id),
                player_id INTEGER NOT NULL REFERENCES players(id),
                status TEXT NOT NULL,
                invited_at TEXT,
                invited_by TEXT,
                joined_at TEXT,
                left_at TEXT,
                UNIQUE(competition_id, player_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competition_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                competition_id INTEGER NOT NULL REFERENCES competitions(id),
                player_id INTEGER NOT NULL REFERENCES players(id),
                snapshot_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                UNIQUE(competition_id, player_id, snapshot_type)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competition_captures (
                competition_id INTEGER NOT NULL REFERENCES competitions(id),
                snapshot_type TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                succeeded INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (competition_id, snapshot_type)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_matches (
                player_id INTEGER NOT NULL REFERENCES players(id),
                match_id TEXT NOT NULL,
                queue TEXT NOT NULL,
                champion_id INTEGER NOT NULL,
                win INTEGER NOT NULL,
                played_at TEXT NOT NULL,
                PRIMARY KEY (player_id, match_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_ranks (
                player_id INTEGER NOT NULL REFERENCES players(id),
                queue TEXT NOT NULL,
                tier TEXT NOT NULL,
                division INTEGER NOT NULL,
                lp INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (player_id, queue)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leaderboard_cache (
                competition_id INTEGER PRIMARY KEY REFERENCES competitions(id),
                data BLOB NOT NULL,
                cached_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Players ───────────────────────────────────────────────────────

    pub async fn create_player(&self, name: &str) -> Result<Player, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "INSERT INTO players (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_player(&self, id: i64) -> Result<Option<Player>, sqlx::Error> {
        let row = sqlx::query_as::<_, Player>(
            "SELECT id, name, created_at FROM players WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Display names of everyone who ever had a participant row in a competition.
    pub async fn competition_player_names(
        &self,
        competition_id: i64,
    ) -> Result<HashMap<i64, String>, sqlx::Error> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT p.id, p.name FROM players p
            WHERE p.id IN (
                SELECT player_id FROM competition_participants WHERE competition_id = ?
                UNION
                SELECT player_id FROM competition_snapshots WHERE competition_id = ?
            )
            "#,
        )
        .bind(competition_id)
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    // ── Seasons ───────────────────────────────────────────────────────

    pub async fn upsert_season(&self, season: &Season) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO seasons (id, name, start_date, end_date) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                start_date = excluded.start_date,
                end_date = excluded.end_date
            "#,
        )
        .bind(&season.id)
        .bind(&season.name)
        .bind(season.start_date)
        .bind(season.end_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_season(&self, id: &str) -> Result<Option<Season>, sqlx::Error> {
        let row = sqlx::query_as::<_, Season>(
            "SELECT id, name, start_date, end_date FROM seasons WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Mark a season ended. Returns false if the season does not exist.
    pub async fn end_season(&self, id: &str, ended_at: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE seasons SET end_date = ? WHERE id = ?")
            .bind(ended_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Leaderboard cache ─────────────────────────────────────────────

    pub async fn store_leaderboard_cache(
        &self,
        competition_id: i64,
        data: &[u8],
        cached_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_cache (competition_id, data, cached_at) VALUES (?, ?, ?)
            ON CONFLICT(competition_id) DO UPDATE SET
                data = excluded.data,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(competition_id)
        .bind(data)
        .bind(cached_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_leaderboard_cache(
        &self,
        competition_id: i64,
    ) -> Result<Option<(Vec<u8>, DateTime<Utc>)>, sqlx::Error> {
        let row: Option<(Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT data, cached_at FROM leaderboard_cache WHERE competition_id = ?",
        )
        .bind(competition_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use chrono::{Duration, Utc};

    use crate::competition::{NewCompetition, Visibility};
    use crate::criteria::{CompetitionCriteria, Queue};

    /// Open fixed-date competition starting in an hour and lasting a week.
    pub(crate) fn sample_new() -> NewCompetition {
        let now = Utc::now();
        NewCompetition {
            server_id: "server-1".into(),
            owner_id: "owner-1".into(),
            channel_id: "channel-1".into(),
            title: "Weekly grind".into(),
            description: String::new(),
            visibility: Visibility::Open,
            max_participants: 4,
            start_date: Some(now + Duration::hours(1)),
            end_date: Some(now + Duration::days(7)),
            season_id: None,
            criteria: CompetitionCriteria::MostGamesPlayed { queue: Queue::Solo },
        }
    }
}
