// Ingested match results and ranked standings, read by the stats provider.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::Database;
use crate::criteria::{Queue, Rank, StatsQuery, Tier};
use crate::error::IntegrityError;

impl Database {
    /// Store one finished match for a player. Re-ingesting the same match is
    /// a no-op.
    pub async fn record_match(
        &self,
        player_id: i64,
        match_id: &str,
        queue: Queue,
        champion_id: i64,
        win: bool,
        played_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO player_matches (player_id, match_id, queue, champion_id, win, played_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(player_id)
        .bind(match_id)
        .bind(queue.as_str())
        .bind(champion_id)
        .bind(win)
        .bind(played_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_rank(
        &self,
        player_id: i64,
        queue: Queue,
        rank: Rank,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO player_ranks (player_id, queue, tier, division, lp, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(player_id, queue) DO UPDATE SET
                tier = excluded.tier,
                division = excluded.division,
                lp = excluded.lp,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(player_id)
        .bind(queue.as_str())
        .bind(rank.tier.as_str())
        .bind(i64::from(rank.division))
        .bind(rank.lp)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `(games, wins)` over every recorded match matching `query`.
    pub async fn match_totals(
        &self,
        player_id: i64,
        query: &StatsQuery,
    ) -> Result<(i64, i64), sqlx::Error> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*), COALESCE(SUM(win), 0) FROM player_matches WHERE player_id = ",
        );
        qb.push_bind(player_id);
        if let Some(queues) = query.queue.and_then(Queue::match_queues) {
            qb.push(" AND queue IN (");
            let mut separated = qb.separated(", ");
            for queue in queues {
                separated.push_bind(queue.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(champion_id) = query.champion_id {
            qb.push(" AND champion_id = ");
            qb.push_bind(champion_id);
        }
        let totals = qb
            .build_query_as::<(i64, i64)>()
            .fetch_one(&self.pool)
            .await?;
        Ok(totals)
    }

    pub async fn current_rank(
        &self,
        player_id: i64,
        queue: Queue,
    ) -> Result<Option<Rank>, sqlx::Error> {
        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT tier, division, lp FROM player_ranks WHERE player_id = ? AND queue = ?",
        )
        .bind(player_id)
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((tier, division, lp)) = row else {
            return Ok(None);
        };
        let tier = Tier::from_str_name(&tier).ok_or_else(|| {
            sqlx::Error::Decode(Box::new(IntegrityError::UnknownValue {
                field: "tier",
                value: tier.clone(),
            }))
        })?;
        let division = u8::try_from(division).unwrap_or(4);
        let lp = i32::try_from(lp).unwrap_or(0);
        Ok(Some(Rank::new(tier, division, lp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_match_totals_filters() {
        let db = Database::in_memory().await.unwrap();
        let p = db.create_player("alice").await.unwrap();
        let t = Utc::now() - Duration::hours(5);

        db.record_match(p.id, "m1", Queue::Solo, 1, true, t).await.unwrap();
        db.record_match(p.id, "m2", Queue::Solo, 2, false, t).await.unwrap();
        db.record_match(p.id, "m3", Queue::Flex, 1, true, t).await.unwrap();
        db.record_match(p.id, "m4", Queue::Aram, 1, true, t).await.unwrap();
        // Duplicate ingestion is ignored.
        assert!(!db.record_match(p.id, "m1", Queue::Solo, 1, true, t).await.unwrap());

        let solo = StatsQuery {
            queue: Some(Queue::Solo),
            champion_id: None,
        };
        assert_eq!(db.match_totals(p.id, &solo).await.unwrap(), (2, 1));

        let ranked = StatsQuery {
            queue: Some(Queue::RankedAny),
            champion_id: None,
        };
        assert_eq!(db.match_totals(p.id, &ranked).await.unwrap(), (3, 2));

        let champion = StatsQuery {
            queue: None,
            champion_id: Some(1),
        };
        assert_eq!(db.match_totals(p.id, &champion).await.unwrap(), (3, 3));

        let all = StatsQuery {
            queue: Some(Queue::All),
            champion_id: None,
        };
        assert_eq!(db.match_totals(p.id, &all).await.unwrap(), (4, 3));
    }

    #[tokio::test]
    async fn test_rank_upsert() {
        let db = Database::in_memory().await.unwrap();
        let p = db.create_player("bob").await.unwrap();
        let now = Utc::now();

        assert!(db.current_rank(p.id, Queue::Solo).await.unwrap().is_none());

        db.upsert_rank(p.id, Queue::Solo, Rank::new(Tier::Gold, 3, 20), now)
            .await
            .unwrap();
        db.upsert_rank(p.id, Queue::Solo, Rank::new(Tier::Gold, 2, 5), now)
            .await
            .unwrap();

        let rank = db.current_rank(p.id, Queue::Solo).await.unwrap().unwrap();
        assert_eq!(rank, Rank::new(Tier::Gold, 2, 5));
        assert!(db.current_rank(p.id, Queue::Flex).await.unwrap().is_none());
    }
}
