// Error types for competition creation, participation, lifecycle and side effects.

/// Rejected competition input. Returned before anything is written.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("title is required")]
    EmptyTitle,

    #[error("title must be at most {max} characters")]
    TitleTooLong { max: usize },

    #[error("description must be at most {max} characters")]
    DescriptionTooLong { max: usize },

    #[error("max participants must be between {min} and {max}")]
    ParticipantLimitOutOfRange { min: i64, max: i64 },

    #[error("specify either a date range or a season, not both")]
    ConflictingTiming,

    #[error("a date range or a season is required")]
    MissingTiming,

    #[error("start date must be before end date")]
    InvalidDateRange,

    #[error("competition cannot last longer than {max_days} days")]
    DurationTooLong { max_days: i64 },

    #[error("unknown season: {0}")]
    UnknownSeason(String),

    #[error("season {0} has already ended")]
    SeasonEnded(String),

    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("owner already has {max} active competition(s)")]
    OwnerLimitReached { max: i64 },

    #[error("server already has {max} active competition(s)")]
    ServerLimitReached { max: i64 },
}

/// Errors from creating or loading competitions.
#[derive(thiserror::Error, Debug)]
pub enum CompetitionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("competition {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A denied participant operation. `Display` is the reason shown to users.
#[derive(thiserror::Error, Debug)]
pub enum ParticipantError {
    #[error("player is already a participant")]
    AlreadyParticipant,

    #[error("player left this competition and cannot rejoin")]
    PreviouslyLeft,

    #[error("competition is full ({max} participants)")]
    CapacityExceeded { max: i64 },

    #[error("competition is cancelled or has ended")]
    InactiveCompetition,

    #[error("competition is invite-only")]
    InviteRequired,

    #[error("player has no pending invitation")]
    NotInvited,

    #[error("participants can only be added as invited or joined")]
    InvalidStatus,

    #[error("competition {0} not found")]
    CompetitionNotFound(i64),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ParticipantError {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ParticipantError::AlreadyParticipant => "already_participant",
            ParticipantError::PreviouslyLeft => "previously_left",
            ParticipantError::CapacityExceeded { .. } => "capacity_exceeded",
            ParticipantError::InactiveCompetition => "inactive_competition",
            ParticipantError::InviteRequired => "invite_required",
            ParticipantError::NotInvited => "not_invited",
            ParticipantError::InvalidStatus => "invalid_status",
            ParticipantError::CompetitionNotFound(_) => "not_found",
            ParticipantError::Integrity(_) => "integrity",
            ParticipantError::Database(_) => "database",
        }
    }
}

/// Stored data that breaks an invariant upstream of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IntegrityError {
    #[error("competition {competition_id} has neither a date range nor a season")]
    MissingTiming { competition_id: i64 },

    #[error("competition {competition_id} has both a date range and a season")]
    ConflictingTiming { competition_id: i64 },

    #[error("competition {competition_id} has an incomplete date range")]
    PartialDateRange { competition_id: i64 },

    #[error("competition {competition_id} has unreadable criteria: {reason}")]
    Criteria { competition_id: i64, reason: String },

    #[error("snapshot for player {player_id} in competition {competition_id} is unreadable: {reason}")]
    Payload {
        competition_id: i64,
        player_id: i64,
        reason: String,
    },

    #[error("unknown {field} value: {value}")]
    UnknownValue { field: &'static str, value: String },
}

/// Failure to look up a player's current statistics.
#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error("no statistics for player {0}")]
    NotFound(i64),

    #[error("statistics lookup for player {player_id} timed out after {seconds}s")]
    Timeout { player_id: i64, seconds: u64 },

    #[error("statistics provider failed: {0}")]
    Provider(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a failed notification delivery.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("missing permission to post in channel {channel_id}")]
    PermissionDenied { channel_id: String },

    #[error("notification failed: {0}")]
    Other(String),
}

impl NotifyError {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            NotifyError::PermissionDenied { .. } => "permission_denied",
            NotifyError::Other(_) => "other",
        }
    }
}

/// Leaderboard cache read/write failure.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cache encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cache compression failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A single competition's transition failed. Other competitions in the tick
/// are unaffected.
#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Leaderboard(#[from] LeaderboardError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from the leaderboard query path.
#[derive(thiserror::Error, Debug)]
pub enum LeaderboardError {
    #[error("competition {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
