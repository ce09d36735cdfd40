// Competition definitions and derived lifecycle state.
//
// State is never stored. It is recomputed from the cancellation flag and the
// competition's time window every time it is needed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::CompetitionCriteria;
use crate::db::Database;
use crate::error::{CompetitionError, IntegrityError, ValidationError};

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MIN_PARTICIPANTS: i64 = 2;
pub const MAX_PARTICIPANTS: i64 = 50;
pub const MAX_DURATION_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Open,
    InviteOnly,
    ServerWide,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Open => "OPEN",
            Visibility::InviteOnly => "INVITE_ONLY",
            Visibility::ServerWide => "SERVER_WIDE",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Visibility::Open),
            "INVITE_ONLY" => Some(Visibility::InviteOnly),
            "SERVER_WIDE" => Some(Visibility::ServerWide),
            _ => None,
        }
    }
}

/// Derived lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitionState {
    Draft,
    Active,
    Ended,
    Cancelled,
}

impl CompetitionState {
    /// Whether participants may still be added.
    pub fn accepts_participants(self) -> bool {
        matches!(self, CompetitionState::Draft | CompetitionState::Active)
    }
}

/// How a competition's window is defined. Exactly one mode applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompetitionTiming {
    FixedDates {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Season {
        season_id: String,
    },
}

/// A predefined ranked season, maintained outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Season {
    pub id: String,
    pub name: String,
    pub start_date: DateTime<Utc>,
    /// Set once the season is marked ended.
    pub end_date: Option<DateTime<Utc>>,
}

/// A stored competition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Competition {
    pub id: i64,
    pub server_id: String,
    pub owner_id: String,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub visibility: Visibility,
    pub max_participants: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub season_id: Option<String>,
    pub criteria: CompetitionCriteria,
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Competition {
    /// Resolve the timing mode, failing on rows that break the XOR rule.
    pub fn timing(&self) -> Result<CompetitionTiming, IntegrityError> {
        match (self.start_date, self.end_date, &self.season_id) {
            (Some(start), Some(end), None) => Ok(CompetitionTiming::FixedDates { start, end }),
            (None, None, Some(season_id)) => Ok(CompetitionTiming::Season {
                season_id: season_id.clone(),
            }),
            (None, None, None) => Err(IntegrityError::MissingTiming {
                competition_id: self.id,
            }),
            (Some(_), None, None) | (None, Some(_), None) => {
                Err(IntegrityError::PartialDateRange {
                    competition_id: self.id,
                })
            }
            _ => Err(IntegrityError::ConflictingTiming {
                competition_id: self.id,
            }),
        }
    }

    /// Effective `(start, end)` window. `None` start means not yet known.
    /// `None` end means open-ended (season still running).
    pub fn window(
        &self,
        season: Option<&Season>,
    ) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), IntegrityError> {
        Ok(match self.timing()? {
            CompetitionTiming::FixedDates { start, end } => (Some(start), Some(end)),
            CompetitionTiming::Season { season_id } => match season {
                Some(s) if s.id == season_id => (Some(s.start_date), s.end_date),
                _ => (None, None),
            },
        })
    }
}

/// Derive a competition's lifecycle state at `now`.
///
/// Precedence: cancelled, then draft (`now < start`), then active
/// (`now < end` or no end yet), otherwise ended. The window is half-open:
/// `start` itself is ACTIVE and `end` itself is ENDED.
pub fn derive_state(
    competition: &Competition,
    season: Option<&Season>,
    now: DateTime<Utc>,
) -> Result<CompetitionState, IntegrityError> {
    if competition.is_cancelled {
        return Ok(CompetitionState::Cancelled);
    }

    let (start, end) = competition.window(season)?;
    let state = match (start, end) {
        (None, _) => CompetitionState::Draft,
        (Some(start), _) if now < start => CompetitionState::Draft,
        (Some(_), None) => CompetitionState::Active,
        (Some(_), Some(end)) if now < end => CompetitionState::Active,
        (Some(_), Some(_)) => CompetitionState::Ended,
    };
    Ok(state)
}

/// Input for creating a competition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCompetition {
    pub server_id: String,
    pub owner_id: String,
    pub channel_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub visibility: Visibility,
    pub max_participants: i64,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub season_id: Option<String>,
    pub criteria: CompetitionCriteria,
}

impl NewCompetition {
    /// Check everything that can be checked without the database.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(ValidationError::TitleTooLong {
                max: MAX_TITLE_LENGTH,
            });
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(ValidationError::DescriptionTooLong {
                max: MAX_DESCRIPTION_LENGTH,
            });
        }
        if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&self.max_participants) {
            return Err(ValidationError::ParticipantLimitOutOfRange {
                min: MIN_PARTICIPANTS,
                max: MAX_PARTICIPANTS,
            });
        }

        let has_dates = self.start_date.is_some() || self.end_date.is_some();
        match (has_dates, &self.season_id) {
            (true, Some(_)) => return Err(ValidationError::ConflictingTiming),
            (false, None) => return Err(ValidationError::MissingTiming),
            (true, None) => {
                let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
                    return Err(ValidationError::MissingTiming);
                };
                if start >= end {
                    return Err(ValidationError::InvalidDateRange);
                }
                if end - start > Duration::days(MAX_DURATION_DAYS) {
                    return Err(ValidationError::DurationTooLong {
                        max_days: MAX_DURATION_DAYS,
                    });
                }
            }
            (false, Some(_)) => {}
        }

        self.criteria.validate()
    }
}

/// Caps on competitions that are neither cancelled nor ended.
#[derive(Debug, Clone, Copy)]
pub struct ActiveLimits {
    pub per_owner: i64,
    pub per_server: i64,
}

impl Default for ActiveLimits {
    fn default() -> Self {
        Self {
            per_owner: 1,
            per_server: 2,
        }
    }
}

/// Validate and store a new competition.
pub async fn create_competition(
    db: &Database,
    new: &NewCompetition,
    limits: ActiveLimits,
    now: DateTime<Utc>,
) -> Result<Competition, CompetitionError> {
    new.validate()?;

    if let Some(season_id) = &new.season_id {
        let season = db
            .get_season(season_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownSeason(season_id.clone()))?;
        if season.end_date.is_some_and(|end| end <= now) {
            return Err(ValidationError::SeasonEnded(season_id.clone()).into());
        }
    }

    if db.count_active_for_owner(&new.owner_id, now).await? >= limits.per_owner {
        return Err(ValidationError::OwnerLimitReached {
            max: limits.per_owner,
        }
        .into());
    }
    if db.count_active_for_server(&new.server_id, now).await? >= limits.per_server {
        return Err(ValidationError::ServerLimitReached {
            max: limits.per_server,
        }
        .into());
    }

    let row = db.insert_competition(new, now).await?;
    let competition = Competition::try_from(row)?;
    tracing::info!(
        competition_id = competition.id,
        server_id = %competition.server_id,
        criteria = competition.criteria.type_name(),
        "Competition created"
    );
    Ok(competition)
}

/// Load a competition together with its season, if it references one.
pub async fn load_competition(
    db: &Database,
    id: i64,
) -> Result<(Competition, Option<Season>), CompetitionError> {
    let row = db
        .get_competition(id)
        .await?
        .ok_or(CompetitionError::NotFound(id))?;
    let competition = Competition::try_from(row)?;
    let season = match &competition.season_id {
        Some(season_id) => db.get_season(season_id).await?,
        None => None,
    };
    Ok((competition, season))
}

pub async fn competition_state(
    db: &Database,
    id: i64,
    now: DateTime<Utc>,
) -> Result<CompetitionState, CompetitionError> {
    let (competition, season) = load_competition(db, id).await?;
    Ok(derive_state(&competition, season.as_ref(), now)?)
}

/// Cancel a competition. Cancelling twice is a no-op; snapshots already
/// taken are kept.
pub async fn cancel_competition(
    db: &Database,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Competition, CompetitionError> {
    if !db.cancel_competition(id, now).await? {
        return Err(CompetitionError::NotFound(id));
    }
    tracing::info!(competition_id = id, "Competition cancelled");
    let (competition, _) = load_competition(db, id).await?;
    Ok(competition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Queue;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fixed(start: DateTime<Utc>, end: DateTime<Utc>) -> Competition {
        Competition {
            id: 1,
            server_id: "srv".into(),
            owner_id: "owner".into(),
            channel_id: "chan".into(),
            title: "Spring grind".into(),
            description: String::new(),
            visibility: Visibility::Open,
            max_participants: 10,
            start_date: Some(start),
            end_date: Some(end),
            season_id: None,
            criteria: CompetitionCriteria::MostGamesPlayed { queue: Queue::Solo },
            is_cancelled: false,
            created_at: start - Duration::days(1),
            updated_at: start - Duration::days(1),
        }
    }

    fn seasonal(season_id: &str) -> Competition {
        let mut c = fixed(now(), now() + Duration::days(1));
        c.start_date = None;
        c.end_date = None;
        c.season_id = Some(season_id.into());
        c
    }

    fn new_competition() -> NewCompetition {
        NewCompetition {
            server_id: "srv".into(),
            owner_id: "owner".into(),
            channel_id: "chan".into(),
            title: "Climb".into(),
            description: "who climbs most".into(),
            visibility: Visibility::Open,
            max_participants: 8,
            start_date: Some(now() + Duration::hours(1)),
            end_date: Some(now() + Duration::days(8)),
            season_id: None,
            criteria: CompetitionCriteria::MostRankClimb { queue: Queue::Solo },
        }
    }

    #[test]
    fn test_state_window_boundaries() {
        let start = now();
        let end = now() + Duration::days(7);
        let c = fixed(start, end);

        let before = derive_state(&c, None, start - Duration::seconds(1)).unwrap();
        assert_eq!(before, CompetitionState::Draft);
        assert_eq!(
            derive_state(&c, None, start).unwrap(),
            CompetitionState::Active
        );
        assert_eq!(
            derive_state(&c, None, end - Duration::seconds(1)).unwrap(),
            CompetitionState::Active
        );
        assert_eq!(derive_state(&c, None, end).unwrap(), CompetitionState::Ended);
    }

    #[test]
    fn test_cancelled_overrides_dates() {
        let mut c = fixed(now() - Duration::days(10), now() - Duration::days(1));
        c.is_cancelled = true;
        assert_eq!(
            derive_state(&c, None, now()).unwrap(),
            CompetitionState::Cancelled
        );
        let mut c = fixed(now() - Duration::days(1), now() + Duration::days(1));
        c.is_cancelled = true;
        assert_eq!(
            derive_state(&c, None, now()).unwrap(),
            CompetitionState::Cancelled
        );
    }

    #[test]
    fn test_missing_timing_fails_loudly() {
        let mut c = fixed(now(), now());
        c.start_date = None;
        c.end_date = None;
        assert_eq!(
            derive_state(&c, None, now()),
            Err(IntegrityError::MissingTiming { competition_id: 1 })
        );
    }

    #[test]
    fn test_conflicting_timing_fails() {
        let mut c = fixed(now(), now() + Duration::days(1));
        c.season_id = Some("s1".into());
        assert!(matches!(
            derive_state(&c, None, now()),
            Err(IntegrityError::ConflictingTiming { .. })
        ));
    }

    #[test]
    fn test_season_states() {
        let c = seasonal("2026-split-1");
        // Unknown season: nothing has started yet.
        assert_eq!(
            derive_state(&c, None, now()).unwrap(),
            CompetitionState::Draft
        );

        let mut season = Season {
            id: "2026-split-1".into(),
            name: "Split 1".into(),
            start_date: now() - Duration::days(3),
            end_date: None,
        };
        assert_eq!(
            derive_state(&c, Some(&season), now()).unwrap(),
            CompetitionState::Active
        );

        season.end_date = Some(now());
        assert_eq!(
            derive_state(&c, Some(&season), now()).unwrap(),
            CompetitionState::Ended
        );

        season.start_date = now() + Duration::days(1);
        season.end_date = None;
        assert_eq!(
            derive_state(&c, Some(&season), now()).unwrap(),
            CompetitionState::Draft
        );
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(new_competition().validate().is_ok());

        let mut seasonal = new_competition();
        seasonal.start_date = None;
        seasonal.end_date = None;
        seasonal.season_id = Some("s1".into());
        assert!(seasonal.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let mut c = new_competition();
        c.title = "   ".into();
        assert_eq!(c.validate(), Err(ValidationError::EmptyTitle));

        let mut c = new_competition();
        c.title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(matches!(
            c.validate(),
            Err(ValidationError::TitleTooLong { .. })
        ));

        let mut c = new_competition();
        c.max_participants = 1;
        assert!(matches!(
            c.validate(),
            Err(ValidationError::ParticipantLimitOutOfRange { .. })
        ));

        let mut c = new_competition();
        c.end_date = c.start_date;
        assert_eq!(c.validate(), Err(ValidationError::InvalidDateRange));

        let mut c = new_competition();
        c.end_date = Some(now() + Duration::days(MAX_DURATION_DAYS + 2));
        assert!(matches!(
            c.validate(),
            Err(ValidationError::DurationTooLong { .. })
        ));

        let mut c = new_competition();
        c.season_id = Some("s1".into());
        assert_eq!(c.validate(), Err(ValidationError::ConflictingTiming));

        let mut c = new_competition();
        c.start_date = None;
        c.end_date = None;
        assert_eq!(c.validate(), Err(ValidationError::MissingTiming));

        let mut c = new_competition();
        c.end_date = None;
        assert_eq!(c.validate(), Err(ValidationError::MissingTiming));

        let mut c = new_competition();
        c.criteria = CompetitionCriteria::HighestRank { queue: Queue::Arena };
        assert!(matches!(
            c.validate(),
            Err(ValidationError::InvalidCriteria(_))
        ));
    }

    #[test]
    fn test_exactly_ninety_days_is_allowed() {
        let mut c = new_competition();
        c.end_date = c.start_date.map(|s| s + Duration::days(MAX_DURATION_DAYS));
        assert!(c.validate().is_ok());
    }

    // ── Creation against the database ─────────────────────────────────

    async fn db() -> Database {
        Database::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_enforces_owner_and_server_caps() {
        let db = db().await;
        let now = now();
        let limits = ActiveLimits {
            per_owner: 1,
            per_server: 2,
        };

        let first = create_competition(&db, &new_competition(), limits, now)
            .await
            .unwrap();
        assert_eq!(first.title, "Climb");

        let err = create_competition(&db, &new_competition(), limits, now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompetitionError::Validation(ValidationError::OwnerLimitReached { max: 1 })
        ));

        let mut other_owner = new_competition();
        other_owner.owner_id = "someone-else".into();
        create_competition(&db, &other_owner, limits, now)
            .await
            .unwrap();

        let mut third = new_competition();
        third.owner_id = "third".into();
        let err = create_competition(&db, &third, limits, now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompetitionError::Validation(ValidationError::ServerLimitReached { max: 2 })
        ));

        // Cancelling frees the owner's slot.
        cancel_competition(&db, first.id, now).await.unwrap();
        create_competition(&db, &new_competition(), limits, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_checks_season() {
        let db = db().await;
        let mut c = new_competition();
        c.start_date = None;
        c.end_date = None;
        c.season_id = Some("s1".into());

        let err = create_competition(&db, &c, ActiveLimits::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompetitionError::Validation(ValidationError::UnknownSeason(_))
        ));

        db.upsert_season(&Season {
            id: "s1".into(),
            name: "Split".into(),
            start_date: now() - Duration::days(30),
            end_date: Some(now() - Duration::days(1)),
        })
        .await
        .unwrap();
        let err = create_competition(&db, &c, ActiveLimits::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompetitionError::Validation(ValidationError::SeasonEnded(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_writes_nothing() {
        let db = db().await;
        let mut c = new_competition();
        c.max_participants = 0;
        assert!(create_competition(&db, &c, ActiveLimits::default(), now())
            .await
            .is_err());
        assert!(db.list_competitions_for_server("srv").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_and_cancel_through_db() {
        let db = db().await;
        let created = create_competition(&db, &new_competition(), ActiveLimits::default(), now())
            .await
            .unwrap();

        assert_eq!(
            competition_state(&db, created.id, now()).await.unwrap(),
            CompetitionState::Draft
        );
        assert_eq!(
            competition_state(&db, created.id, now() + Duration::days(2))
                .await
                .unwrap(),
            CompetitionState::Active
        );

        let cancelled = cancel_competition(&db, created.id, now()).await.unwrap();
        assert!(cancelled.is_cancelled);
        assert_eq!(
            competition_state(&db, created.id, now() + Duration::days(2))
                .await
                .unwrap(),
            CompetitionState::Cancelled
        );

        assert!(matches!(
            cancel_competition(&db, 404, now()).await,
            Err(CompetitionError::NotFound(404))
        ));
    }
}
