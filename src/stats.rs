// Statistics provider seam. Snapshot capture and live leaderboards ask a
// provider for a player's current cumulative statistics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::criteria::{PlayerStatistics, StatsQuery};
use crate::db::Database;
use crate::error::StatsError;

#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Current statistics for `player_id`, restricted to `query`.
    async fn current_statistics(
        &self,
        player_id: i64,
        query: &StatsQuery,
    ) -> Result<PlayerStatistics, StatsError>;
}

/// Run one lookup, giving up after `timeout`.
pub async fn lookup_with_timeout(
    provider: &dyn StatsProvider,
    player_id: i64,
    query: &StatsQuery,
    timeout: Duration,
) -> Result<PlayerStatistics, StatsError> {
    match tokio::time::timeout(timeout, provider.current_statistics(player_id, query)).await {
        Ok(result) => result,
        Err(_) => Err(StatsError::Timeout {
            player_id,
            seconds: timeout.as_secs(),
        }),
    }
}

/// Reads statistics from the ingested `player_matches` and `player_ranks`
/// tables.
pub struct DbStatsProvider {
    db: Arc<Database>,
}

impl DbStatsProvider {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StatsProvider for DbStatsProvider {
    async fn current_statistics(
        &self,
        player_id: i64,
        query: &StatsQuery,
    ) -> Result<PlayerStatistics, StatsError> {
        if self.db.get_player(player_id).await?.is_none() {
            return Err(StatsError::NotFound(player_id));
        }

        let (games, wins) = self.db.match_totals(player_id, query).await?;
        let rank = match query.queue {
            Some(queue) if queue.is_ladder() => self.db.current_rank(player_id, queue).await?,
            _ => None,
        };

        let games = u32::try_from(games)
            .map_err(|_| StatsError::Provider(format!("game count out of range: {games}")))?;
        let wins = u32::try_from(wins)
            .map_err(|_| StatsError::Provider(format!("win count out of range: {wins}")))?;
        Ok(PlayerStatistics { games, wins, rank })
    }
}
