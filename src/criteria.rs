// Scoring criteria: how a participant's score is derived from a pair of
// statistics snapshots.
//
// Every criterion is "higher is better". A `None` evaluation means the
// participant is excluded from the leaderboard, not scored as zero.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IntegrityError, ValidationError};

/// League points spanned by one division.
pub const DIVISION_POINTS: i64 = 100;
/// League points spanned by one divided tier (four divisions).
pub const TIER_POINTS: i64 = 4 * DIVISION_POINTS;

/// Queue filter applied to statistics lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Queue {
    Solo,
    Flex,
    /// Solo and flex combined.
    RankedAny,
    Aram,
    Arena,
    Quickplay,
    /// No queue filter.
    All,
}

impl Queue {
    pub fn as_str(self) -> &'static str {
        match self {
            Queue::Solo => "SOLO",
            Queue::Flex => "FLEX",
            Queue::RankedAny => "RANKED_ANY",
            Queue::Aram => "ARAM",
            Queue::Arena => "ARENA",
            Queue::Quickplay => "QUICKPLAY",
            Queue::All => "ALL",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "SOLO" => Some(Queue::Solo),
            "FLEX" => Some(Queue::Flex),
            "RANKED_ANY" => Some(Queue::RankedAny),
            "ARAM" => Some(Queue::Aram),
            "ARENA" => Some(Queue::Arena),
            "QUICKPLAY" => Some(Queue::Quickplay),
            "ALL" => Some(Queue::All),
            _ => None,
        }
    }

    /// Whether this queue has its own ranked ladder.
    pub fn is_ladder(self) -> bool {
        matches!(self, Queue::Solo | Queue::Flex)
    }

    /// Concrete queues a match must have been played in to count.
    /// `None` means every queue counts.
    pub fn match_queues(self) -> Option<Vec<Queue>> {
        match self {
            Queue::All => None,
            Queue::RankedAny => Some(vec![Queue::Solo, Queue::Flex]),
            q => Some(vec![q]),
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Queue::Solo => "Ranked Solo/Duo",
            Queue::Flex => "Ranked Flex",
            Queue::RankedAny => "Ranked",
            Queue::Aram => "ARAM",
            Queue::Arena => "Arena",
            Queue::Quickplay => "Quickplay",
            Queue::All => "all queues",
        };
        f.write_str(name)
    }
}

/// Ranked tier, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Iron => "IRON",
            Tier::Bronze => "BRONZE",
            Tier::Silver => "SILVER",
            Tier::Gold => "GOLD",
            Tier::Platinum => "PLATINUM",
            Tier::Emerald => "EMERALD",
            Tier::Diamond => "DIAMOND",
            Tier::Master => "MASTER",
            Tier::Grandmaster => "GRANDMASTER",
            Tier::Challenger => "CHALLENGER",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "IRON" => Some(Tier::Iron),
            "BRONZE" => Some(Tier::Bronze),
            "SILVER" => Some(Tier::Silver),
            "GOLD" => Some(Tier::Gold),
            "PLATINUM" => Some(Tier::Platinum),
            "EMERALD" => Some(Tier::Emerald),
            "DIAMOND" => Some(Tier::Diamond),
            "MASTER" => Some(Tier::Master),
            "GRANDMASTER" => Some(Tier::Grandmaster),
            "CHALLENGER" => Some(Tier::Challenger),
            _ => None,
        }
    }

    /// Apex tiers have no divisions and share one league-point ladder.
    pub fn is_apex(self) -> bool {
        self >= Tier::Master
    }

    fn index(self) -> i64 {
        self as i64
    }
}

/// A ranked standing. Division 1 is the best division within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rank {
    pub tier: Tier,
    pub division: u8,
    pub lp: i32,
}

impl Rank {
    pub fn new(tier: Tier, division: u8, lp: i32) -> Self {
        let division = if tier.is_apex() { 1 } else { division.clamp(1, 4) };
        Self { tier, division, lp }
    }

    /// Position on a single league-point scale, so that climbing across
    /// divisions and tiers counts as positive movement.
    pub fn points(&self) -> i64 {
        if self.tier.is_apex() {
            Tier::Master.index() * TIER_POINTS + i64::from(self.lp)
        } else {
            self.tier.index() * TIER_POINTS
                + (4 - i64::from(self.division)) * DIVISION_POINTS
                + i64::from(self.lp)
        }
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then_with(|| other.division.cmp(&self.division))
            .then_with(|| self.lp.cmp(&other.lp))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tier.is_apex() {
            write!(f, "{} {} LP", self.tier.as_str(), self.lp)
        } else {
            let division = match self.division {
                1 => "I",
                2 => "II",
                3 => "III",
                _ => "IV",
            };
            write!(f, "{} {} {} LP", self.tier.as_str(), division, self.lp)
        }
    }
}

/// The scoring rule selected for a competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitionCriteria {
    MostGamesPlayed { queue: Queue },
    HighestRank { queue: Queue },
    MostRankClimb { queue: Queue },
    MostWinsPlayer { queue: Queue },
    MostWinsChampion {
        champion_id: i64,
        #[serde(default)]
        queue: Option<Queue>,
    },
    HighestWinRate { queue: Queue, min_games: u32 },
}

impl CompetitionCriteria {
    /// Name stored in the `criteria_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            CompetitionCriteria::MostGamesPlayed { .. } => "MOST_GAMES_PLAYED",
            CompetitionCriteria::HighestRank { .. } => "HIGHEST_RANK",
            CompetitionCriteria::MostRankClimb { .. } => "MOST_RANK_CLIMB",
            CompetitionCriteria::MostWinsPlayer { .. } => "MOST_WINS_PLAYER",
            CompetitionCriteria::MostWinsChampion { .. } => "MOST_WINS_CHAMPION",
            CompetitionCriteria::HighestWinRate { .. } => "HIGHEST_WIN_RATE",
        }
    }

    /// Parse the stored `(criteria_type, criteria_config)` pair.
    pub fn from_stored(
        competition_id: i64,
        criteria_type: &str,
        config: &str,
    ) -> Result<Self, IntegrityError> {
        let criteria: Self =
            serde_json::from_str(config).map_err(|e| IntegrityError::Criteria {
                competition_id,
                reason: e.to_string(),
            })?;
        if criteria.type_name() != criteria_type {
            return Err(IntegrityError::Criteria {
                competition_id,
                reason: format!(
                    "type column {criteria_type} does not match config {}",
                    criteria.type_name()
                ),
            });
        }
        Ok(criteria)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            CompetitionCriteria::HighestRank { queue }
            | CompetitionCriteria::MostRankClimb { queue }
                if !queue.is_ladder() =>
            {
                Err(ValidationError::InvalidCriteria(format!(
                    "rank criteria need a ranked queue (SOLO or FLEX), got {}",
                    queue.as_str()
                )))
            }
            CompetitionCriteria::HighestWinRate { min_games, .. } if *min_games == 0 => Err(
                ValidationError::InvalidCriteria("min_games must be at least 1".to_string()),
            ),
            CompetitionCriteria::MostWinsChampion { champion_id, .. } if *champion_id <= 0 => Err(
                ValidationError::InvalidCriteria("champion_id must be positive".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Lookup filters the statistics provider needs for this criterion.
    pub fn stats_query(&self) -> StatsQuery {
        match self {
            CompetitionCriteria::MostGamesPlayed { queue }
            | CompetitionCriteria::HighestRank { queue }
            | CompetitionCriteria::MostRankClimb { queue }
            | CompetitionCriteria::MostWinsPlayer { queue }
            | CompetitionCriteria::HighestWinRate { queue, .. } => StatsQuery {
                queue: Some(*queue),
                champion_id: None,
            },
            CompetitionCriteria::MostWinsChampion { champion_id, queue } => StatsQuery {
                queue: *queue,
                champion_id: Some(*champion_id),
            },
        }
    }

    /// Whether scoring diffs against the START snapshot.
    pub fn needs_start_snapshot(&self) -> bool {
        !matches!(self, CompetitionCriteria::HighestRank { .. })
    }

    /// Human-readable description for announcements.
    pub fn describe(&self) -> String {
        match self {
            CompetitionCriteria::MostGamesPlayed { queue } => {
                format!("Most games played ({queue})")
            }
            CompetitionCriteria::HighestRank { queue } => format!("Highest rank ({queue})"),
            CompetitionCriteria::MostRankClimb { queue } => format!("Most rank climb ({queue})"),
            CompetitionCriteria::MostWinsPlayer { queue } => format!("Most wins ({queue})"),
            CompetitionCriteria::MostWinsChampion { champion_id, queue } => match queue {
                Some(q) => format!("Most wins with champion {champion_id} ({q})"),
                None => format!("Most wins with champion {champion_id}"),
            },
            CompetitionCriteria::HighestWinRate { queue, min_games } => {
                format!("Highest win rate ({queue}, min {min_games} games)")
            }
        }
    }

    /// Build the snapshot payload this criterion scores from.
    pub fn payload_from(&self, stats: &PlayerStatistics) -> SnapshotPayload {
        match self {
            CompetitionCriteria::MostGamesPlayed { .. } => SnapshotPayload::Games {
                games: stats.games,
            },
            CompetitionCriteria::HighestRank { .. } | CompetitionCriteria::MostRankClimb { .. } => {
                SnapshotPayload::Rank { rank: stats.rank }
            }
            CompetitionCriteria::MostWinsPlayer { .. }
            | CompetitionCriteria::HighestWinRate { .. } => SnapshotPayload::Wins {
                games: stats.games,
                wins: stats.wins,
            },
            CompetitionCriteria::MostWinsChampion { champion_id, .. } => {
                SnapshotPayload::ChampionWins {
                    champion_id: *champion_id,
                    games: stats.games,
                    wins: stats.wins,
                }
            }
        }
    }
}

/// Filters passed to the statistics provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsQuery {
    pub queue: Option<Queue>,
    pub champion_id: Option<i64>,
}

/// Cumulative statistics for one player, already restricted to a `StatsQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerStatistics {
    pub games: u32,
    pub wins: u32,
    pub rank: Option<Rank>,
}

/// Snapshot body stored as JSON. The shape follows the criterion family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotPayload {
    Games { games: u32 },
    Rank { rank: Option<Rank> },
    Wins { games: u32, wins: u32 },
    ChampionWins { champion_id: i64, games: u32, wins: u32 },
}

impl SnapshotPayload {
    /// Whether this payload shape is the one `criteria` scores from.
    pub fn fits(&self, criteria: &CompetitionCriteria) -> bool {
        matches!(
            (criteria, self),
            (CompetitionCriteria::MostGamesPlayed { .. }, SnapshotPayload::Games { .. })
                | (CompetitionCriteria::HighestRank { .. }, SnapshotPayload::Rank { .. })
                | (CompetitionCriteria::MostRankClimb { .. }, SnapshotPayload::Rank { .. })
                | (CompetitionCriteria::MostWinsPlayer { .. }, SnapshotPayload::Wins { .. })
                | (CompetitionCriteria::HighestWinRate { .. }, SnapshotPayload::Wins { .. })
                | (
                    CompetitionCriteria::MostWinsChampion { .. },
                    SnapshotPayload::ChampionWins { .. }
                )
        )
    }
}

/// A participant's score under one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Score {
    Count { value: i64 },
    WinRate { wins: u32, games: u32 },
    Rank { rank: Rank },
}

impl Score {
    /// Win rate in [0, 1]; zero games yields zero.
    pub fn rate(wins: u32, games: u32) -> f64 {
        if games == 0 {
            0.0
        } else {
            f64::from(wins) / f64::from(games)
        }
    }

    /// Compare two scores by goodness: `Greater` means `self` ranks higher.
    pub fn compare(&self, other: &Score) -> Ordering {
        match (self, other) {
            (Score::Count { value: a }, Score::Count { value: b }) => a.cmp(b),
            (
                Score::WinRate { wins: wa, games: ga },
                Score::WinRate { wins: wb, games: gb },
            ) => {
                // Cross-multiply to compare wa/ga with wb/gb exactly.
                let lhs = u64::from(*wa) * u64::from(*gb);
                let rhs = u64::from(*wb) * u64::from(*ga);
                lhs.cmp(&rhs)
            }
            (Score::Rank { rank: a }, Score::Rank { rank: b }) => a.cmp(b),
            _ => self.variant_order().cmp(&other.variant_order()),
        }
    }

    fn variant_order(&self) -> u8 {
        match self {
            Score::Count { .. } => 0,
            Score::WinRate { .. } => 1,
            Score::Rank { .. } => 2,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Count { value } => write!(f, "{value}"),
            Score::WinRate { wins, games } => {
                write!(f, "{:.1}%", Score::rate(*wins, *games) * 100.0)
            }
            Score::Rank { rank } => write!(f, "{rank}"),
        }
    }
}

/// Optional detail shown next to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreMetadata {
    pub wins: u32,
    pub losses: u32,
}

/// Result of evaluating one participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: Score,
    pub metadata: Option<ScoreMetadata>,
}

impl Evaluation {
    fn plain(score: Score) -> Self {
        Self {
            score,
            metadata: None,
        }
    }
}

fn delta(end: u32, start: u32) -> i64 {
    i64::from(end) - i64::from(start)
}

/// Score one participant. `start` is the START snapshot; `end` is the END
/// snapshot (or live statistics while a competition is running).
///
/// Returns `None` when the participant must be left off the leaderboard:
/// a required snapshot is missing, the player is unranked where a rank is
/// needed, the payload does not fit the criterion, or the win-rate game
/// threshold is not met.
pub fn evaluate(
    criteria: &CompetitionCriteria,
    start: Option<&SnapshotPayload>,
    end: &SnapshotPayload,
) -> Option<Evaluation> {
    match criteria {
        CompetitionCriteria::MostGamesPlayed { .. } => match (start?, end) {
            (SnapshotPayload::Games { games: s }, SnapshotPayload::Games { games: e }) => {
                Some(Evaluation::plain(Score::Count { value: delta(*e, *s) }))
            }
            _ => None,
        },
        CompetitionCriteria::HighestRank { .. } => match end {
            SnapshotPayload::Rank { rank: Some(rank) } => {
                Some(Evaluation::plain(Score::Rank { rank: *rank }))
            }
            _ => None,
        },
        CompetitionCriteria::MostRankClimb { .. } => match (start?, end) {
            (
                SnapshotPayload::Rank { rank: Some(s) },
                SnapshotPayload::Rank { rank: Some(e) },
            ) => Some(Evaluation::plain(Score::Count {
                value: e.points() - s.points(),
            })),
            _ => None,
        },
        CompetitionCriteria::MostWinsPlayer { .. } => match (start?, end) {
            (
                SnapshotPayload::Wins { games: sg, wins: sw },
                SnapshotPayload::Wins { games: eg, wins: ew },
            ) => Some(win_count(*sg, *sw, *eg, *ew)),
            _ => None,
        },
        CompetitionCriteria::MostWinsChampion { champion_id, .. } => match (start?, end) {
            (
                SnapshotPayload::ChampionWins {
                    champion_id: sc,
                    games: sg,
                    wins: sw,
                },
                SnapshotPayload::ChampionWins {
                    champion_id: ec,
                    games: eg,
                    wins: ew,
                },
            ) if sc == champion_id && ec == champion_id => Some(win_count(*sg, *sw, *eg, *ew)),
            _ => None,
        },
        CompetitionCriteria::HighestWinRate { min_games, .. } => match (start?, end) {
            (
                SnapshotPayload::Wins { games: sg, wins: sw },
                SnapshotPayload::Wins { games: eg, wins: ew },
            ) => {
                let games = eg.checked_sub(*sg)?;
                let wins = ew.checked_sub(*sw)?.min(games);
                if games < *min_games {
                    return None;
                }
                Some(Evaluation {
                    score: Score::WinRate { wins, games },
                    metadata: Some(ScoreMetadata {
                        wins,
                        losses: games - wins,
                    }),
                })
            }
            _ => None,
        },
    }
}

fn win_count(start_games: u32, start_wins: u32, end_games: u32, end_wins: u32) -> Evaluation {
    let wins = delta(end_wins, start_wins);
    let games = delta(end_games, start_games);
    let losses = (games - wins).max(0);
    Evaluation {
        score: Score::Count { value: wins },
        metadata: Some(ScoreMetadata {
            wins: u32::try_from(wins.max(0)).unwrap_or(0),
            losses: u32::try_from(losses).unwrap_or(0),
        }),
    }
}
