// Leaderboards: score participants from snapshot pairs and rank them.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::cache::LeaderboardCache;
use crate::competition::{derive_state, Competition, CompetitionState};
use crate::criteria::{
    evaluate, CompetitionCriteria, Evaluation, Score, ScoreMetadata, SnapshotPayload,
};
use crate::db::Database;
use crate::error::LeaderboardError;
use crate::snapshot::{load_snapshots, CaptureSettings, SnapshotKind};
use crate::stats::{lookup_with_timeout, StatsProvider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based; tied scores share a rank.
    pub rank: u32,
    pub player_id: i64,
    pub player_name: Option<String>,
    pub score: Score,
    pub metadata: Option<ScoreMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub competition_id: i64,
    pub state: CompetitionState,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn empty(competition_id: i64, state: CompetitionState, now: DateTime<Utc>) -> Self {
        Self {
            competition_id,
            state,
            generated_at: now,
            entries: Vec::new(),
        }
    }

    /// Plain-text rendering of the top `limit` entries.
    pub fn render(&self, limit: usize) -> String {
        if self.entries.is_empty() {
            return "No qualifying participants.".to_string();
        }
        let mut out = String::new();
        for entry in self.entries.iter().take(limit) {
            let name = entry
                .player_name
                .clone()
                .unwrap_or_else(|| format!("player {}", entry.player_id));
            out.push_str(&format!("{}. {} - {}", entry.rank, name, entry.score));
            if let Some(meta) = entry.metadata {
                out.push_str(&format!(" ({}W {}L)", meta.wins, meta.losses));
            }
            out.push('\n');
        }
        if self.entries.len() > limit {
            out.push_str(&format!("...and {} more\n", self.entries.len() - limit));
        }
        out
    }
}

/// Sort scored participants best first and assign standard competition
/// ranks (1, 1, 3). Equal scores keep their input order.
pub fn rank_entries(scored: Vec<(i64, Evaluation)>) -> Vec<LeaderboardEntry> {
    let mut scored = scored;
    // `sort_by` is stable.
    scored.sort_by(|(_, a), (_, b)| b.score.compare(&a.score));

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(scored.len());
    for (position, (player_id, evaluation)) in scored.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score.compare(&evaluation.score) == Ordering::Equal => prev.rank,
            _ => position as u32 + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            player_id,
            player_name: None,
            score: evaluation.score,
            metadata: evaluation.metadata,
        });
    }
    entries
}

/// Evaluate every participant that has an end-side payload. Participants
/// without one never appear; `evaluate` drops those missing a start payload
/// when the criterion needs it.
pub fn score_participants(
    competition_id: i64,
    criteria: &CompetitionCriteria,
    starts: &HashMap<i64, SnapshotPayload>,
    ends: &[(i64, SnapshotPayload)],
) -> Vec<(i64, Evaluation)> {
    ends.iter()
        .filter_map(|(player_id, end)| {
            if !end.fits(criteria) {
                tracing::warn!(
                    competition_id,
                    player_id,
                    "Snapshot payload does not match criteria {}",
                    criteria.type_name()
                );
                return None;
            }
            evaluate(criteria, starts.get(player_id), end).map(|e| (*player_id, e))
        })
        .collect()
}

/// Builds leaderboards for the query path and for end-of-competition
/// announcements.
#[derive(Clone)]
pub struct LeaderboardService {
    db: Arc<Database>,
    stats: Arc<dyn StatsProvider>,
    cache: Option<Arc<dyn LeaderboardCache>>,
    settings: CaptureSettings,
}

impl LeaderboardService {
    pub fn new(
        db: Arc<Database>,
        stats: Arc<dyn StatsProvider>,
        cache: Option<Arc<dyn LeaderboardCache>>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            db,
            stats,
            cache,
            settings,
        }
    }

    /// The leaderboard as of `now`.
    ///
    /// Draft competitions have no leaderboard yet. Running competitions are
    /// scored against live statistics. Ended competitions use their END
    /// snapshots once captured, and live statistics until then. Cancelled
    /// competitions show their final standings only if they reached END.
    pub async fn current_leaderboard(
        &self,
        competition_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Leaderboard, LeaderboardError> {
        let row = self
            .db
            .get_competition(competition_id)
            .await?
            .ok_or(LeaderboardError::NotFound(competition_id))?;
        let competition = Competition::try_from(row)?;
        let season = match &competition.season_id {
            Some(id) => self.db.get_season(id).await?,
            None => None,
        };
        let state = derive_state(&competition, season.as_ref(), now)?;
        let has_end = self.db.has_capture(competition_id, SnapshotKind::End).await?;

        let leaderboard = match state {
            CompetitionState::Draft => return Ok(Leaderboard::empty(competition_id, state, now)),
            CompetitionState::Cancelled if !has_end => {
                return Ok(Leaderboard::empty(competition_id, state, now))
            }
            CompetitionState::Active => self.live_leaderboard(&competition, state, now).await?,
            CompetitionState::Ended if !has_end => {
                self.live_leaderboard(&competition, state, now).await?
            }
            CompetitionState::Ended | CompetitionState::Cancelled => {
                self.snapshot_leaderboard(&competition, state, now).await?
            }
        };

        self.offer_to_cache(&leaderboard, now).await;
        Ok(leaderboard)
    }

    /// Final standings from START and END snapshots.
    pub async fn final_leaderboard(
        &self,
        competition: &Competition,
        now: DateTime<Utc>,
    ) -> Result<Leaderboard, LeaderboardError> {
        let leaderboard = self
            .snapshot_leaderboard(competition, CompetitionState::Ended, now)
            .await?;
        self.offer_to_cache(&leaderboard, now).await;
        Ok(leaderboard)
    }

    async fn snapshot_leaderboard(
        &self,
        competition: &Competition,
        state: CompetitionState,
        now: DateTime<Utc>,
    ) -> Result<Leaderboard, LeaderboardError> {
        let starts = self.start_payloads(competition.id).await?;
        let ends: Vec<(i64, SnapshotPayload)> =
            load_snapshots::<LeaderboardError>(&self.db, competition.id, SnapshotKind::End)
                .await?
                .into_iter()
                .map(|s| (s.player_id, s.payload))
                .collect();
        self.assemble(competition, state, &starts, &ends, now).await
    }

    async fn live_leaderboard(
        &self,
        competition: &Competition,
        state: CompetitionState,
        now: DateTime<Utc>,
    ) -> Result<Leaderboard, LeaderboardError> {
        let starts = self.start_payloads(competition.id).await?;
        let roster = self.db.active_roster(competition.id).await?;
        let query = competition.criteria.stats_query();
        let stats = self.stats.as_ref();

        let lookups: Vec<_> = stream::iter(roster)
            .map(|player_id| {
                let query = &query;
                async move {
                    let result =
                        lookup_with_timeout(stats, player_id, query, self.settings.lookup_timeout)
                            .await;
                    (player_id, result)
                }
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut ends = Vec::with_capacity(lookups.len());
        for (player_id, result) in lookups {
            match result {
                Ok(current) => ends.push((player_id, competition.criteria.payload_from(&current))),
                Err(e) => tracing::warn!(
                    competition_id = competition.id,
                    player_id,
                    "Live statistics unavailable: {e}"
                ),
            }
        }
        self.assemble(competition, state, &starts, &ends, now).await
    }

    async fn start_payloads(
        &self,
        competition_id: i64,
    ) -> Result<HashMap<i64, SnapshotPayload>, LeaderboardError> {
        let snapshots =
            load_snapshots::<LeaderboardError>(&self.db, competition_id, SnapshotKind::Start)
                .await?;
        Ok(snapshots
            .into_iter()
            .map(|s| (s.player_id, s.payload))
            .collect())
    }

    async fn assemble(
        &self,
        competition: &Competition,
        state: CompetitionState,
        starts: &HashMap<i64, SnapshotPayload>,
        ends: &[(i64, SnapshotPayload)],
        now: DateTime<Utc>,
    ) -> Result<Leaderboard, LeaderboardError> {
        let scored = score_participants(competition.id, &competition.criteria, starts, ends);
        let mut entries = rank_entries(scored);
        let names = self.db.competition_player_names(competition.id).await?;
        for entry in &mut entries {
            entry.player_name = names.get(&entry.player_id).cloned();
        }
        Ok(Leaderboard {
            competition_id: competition.id,
            state,
            generated_at: now,
            entries,
        })
    }

    async fn offer_to_cache(&self, leaderboard: &Leaderboard, now: DateTime<Utc>) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.store(leaderboard, now).await {
            tracing::warn!(
                competition_id = leaderboard.competition_id,
                "Leaderboard cache write failed: {e}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Queue, Rank, Tier};

    fn count(value: i64) -> Evaluation {
        Evaluation {
            score: Score::Count { value },
            metadata: None,
        }
    }

    fn ranks(entries: &[LeaderboardEntry]) -> Vec<(i64, u32)> {
        entries.iter().map(|e| (e.player_id, e.rank)).collect()
    }

    #[test]
    fn test_ties_share_rank_and_skip() {
        // A=1, B=2, C=3
        let entries = rank_entries(vec![(1, count(10)), (2, count(10)), (3, count(8))]);
        assert_eq!(ranks(&entries), vec![(1, 1), (2, 1), (3, 3)]);
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let entries = rank_entries(vec![
            (5, count(2)),
            (6, count(9)),
            (7, count(2)),
            (8, count(-3)),
            (9, count(9)),
        ]);
        assert_eq!(
            ranks(&entries),
            vec![(6, 1), (9, 1), (5, 3), (7, 3), (8, 5)]
        );
    }

    #[test]
    fn test_rank_scores_order_by_tier_division_lp() {
        let rank = |tier, division, lp| Evaluation {
            score: Score::Rank {
                rank: Rank::new(tier, division, lp),
            },
            metadata: None,
        };
        let entries = rank_entries(vec![
            (1, rank(Tier::Gold, 1, 20)),
            (2, rank(Tier::Platinum, 4, 0)),
            (3, rank(Tier::Gold, 1, 75)),
            (4, rank(Tier::Gold, 2, 99)),
        ]);
        assert_eq!(ranks(&entries), vec![(2, 1), (3, 2), (1, 3), (4, 4)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(rank_entries(Vec::new()).is_empty());
    }

    #[test]
    fn test_start_only_participant_is_excluded() {
        let criteria = CompetitionCriteria::MostGamesPlayed { queue: Queue::Solo };
        let starts = HashMap::from([
            (1, SnapshotPayload::Games { games: 10 }),
            (2, SnapshotPayload::Games { games: 4 }),
        ]);
        // Player 2's END capture failed.
        let ends = vec![(1, SnapshotPayload::Games { games: 15 })];
        let scored = score_participants(1, &criteria, &starts, &ends);
        assert_eq!(scored, vec![(1, count(5))]);
    }

    #[test]
    fn test_end_only_participant_is_excluded_unless_rank() {
        let games = CompetitionCriteria::MostGamesPlayed { queue: Queue::Solo };
        let ends = vec![(3, SnapshotPayload::Games { games: 15 })];
        assert!(score_participants(1, &games, &HashMap::new(), &ends).is_empty());

        let highest = CompetitionCriteria::HighestRank { queue: Queue::Solo };
        let ends = vec![(
            3,
            SnapshotPayload::Rank {
                rank: Some(Rank::new(Tier::Silver, 2, 0)),
            },
        )];
        assert_eq!(score_participants(1, &highest, &HashMap::new(), &ends).len(), 1);
    }

    #[test]
    fn test_win_rate_threshold_drops_small_samples() {
        let criteria = CompetitionCriteria::HighestWinRate {
            queue: Queue::Solo,
            min_games: 10,
        };
        let starts = HashMap::from([
            (1, SnapshotPayload::Wins { games: 0, wins: 0 }),
            (2, SnapshotPayload::Wins { games: 0, wins: 0 }),
        ]);
        let ends = vec![
            (1, SnapshotPayload::Wins { games: 9, wins: 9 }),
            (2, SnapshotPayload::Wins { games: 12, wins: 7 }),
        ];
        let entries = rank_entries(score_participants(1, &criteria, &starts, &ends));
        assert_eq!(ranks(&entries), vec![(2, 1)]);
    }

    #[test]
    fn test_render() {
        let mut entries = rank_entries(vec![
            (
                1,
                Evaluation {
                    score: Score::Count { value: 7 },
                    metadata: Some(ScoreMetadata { wins: 7, losses: 3 }),
                },
            ),
            (2, count(4)),
        ]);
        entries[0].player_name = Some("ana".into());
        let board = Leaderboard {
            competition_id: 1,
            state: CompetitionState::Ended,
            generated_at: Utc::now(),
            entries,
        };
        assert_eq!(board.render(10), "1. ana - 7 (7W 3L)\n2. player 2 - 4\n");
        assert_eq!(board.render(1), "1. ana - 7 (7W 3L)\n...and 1 more\n");
        assert_eq!(
            Leaderboard::empty(1, CompetitionState::Draft, Utc::now()).render(5),
            "No qualifying participants."
        );
    }
}
