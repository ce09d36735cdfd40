// Leaderboard cache: stores the last computed leaderboard per competition as
// gzip-compressed JSON. Readers use it to avoid recomputing; the lifecycle
// never depends on it.

use std::io::{Read, Write};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::db::Database;
use crate::error::CacheError;
use crate::leaderboard::Leaderboard;

#[async_trait]
pub trait LeaderboardCache: Send + Sync {
    async fn store(&self, leaderboard: &Leaderboard, now: DateTime<Utc>) -> Result<(), CacheError>;
}

/// Cache backed by the `leaderboard_cache` table.
pub struct DbLeaderboardCache {
    db: Arc<Database>,
}

impl DbLeaderboardCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The cached leaderboard and when it was written, if any.
    pub async fn load(
        &self,
        competition_id: i64,
    ) -> Result<Option<(Leaderboard, DateTime<Utc>)>, CacheError> {
        let Some((data, cached_at)) = self.db.load_leaderboard_cache(competition_id).await? else {
            return Ok(None);
        };
        let json = decompress(&data)?;
        Ok(Some((serde_json::from_str(&json)?, cached_at)))
    }
}

#[async_trait]
impl LeaderboardCache for DbLeaderboardCache {
    async fn store(&self, leaderboard: &Leaderboard, now: DateTime<Utc>) -> Result<(), CacheError> {
        let data = compress(&serde_json::to_string(leaderboard)?)?;
        self.db
            .store_leaderboard_cache(leaderboard.competition_id, &data, now)
            .await?;
        Ok(())
    }
}

fn compress(json: &str) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(json.as_bytes())?;
    encoder.finish()
}

fn decompress(data: &[u8]) -> Result<String, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut result = String::new();
    decoder.read_to_string(&mut result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::competition::CompetitionState;
    use crate::criteria::Score;
    use crate::leaderboard::LeaderboardEntry;

    #[test]
    fn test_compress_round_trip() {
        let json = r#"{"entries":[]}"#;
        let data = compress(json).unwrap();
        assert_eq!(decompress(&data).unwrap(), json);
        assert!(decompress(b"not gzip").is_err());
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let now = Utc::now();
        let competition = db
            .insert_competition(&crate::db::tests_support::sample_new(), now)
            .await
            .unwrap();
        let cache = DbLeaderboardCache::new(db.clone());
        assert!(cache.load(competition.id).await.unwrap().is_none());

        let leaderboard = Leaderboard {
            competition_id: competition.id,
            state: CompetitionState::Ended,
            generated_at: now,
            entries: vec![LeaderboardEntry {
                rank: 1,
                player_id: 4,
                player_name: Some("dana".into()),
                score: Score::Count { value: 12 },
                metadata: None,
            }],
        };
        cache.store(&leaderboard, now).await.unwrap();

        let (loaded, cached_at) = cache.load(competition.id).await.unwrap().unwrap();
        assert_eq!(loaded, leaderboard);
        assert_eq!(cached_at, now);
    }
}
