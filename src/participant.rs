// Participant registry: membership rules for a competition's roster.
//
// Every check here runs before a write, so a denied operation never mutates
// state. Capacity is enforced again by the insert itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::competition::{derive_state, Competition, Visibility};
use crate::db::{Database, ParticipantRow};
use crate::error::{IntegrityError, ParticipantError};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Invited,
    Joined,
    Left,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantStatus::Invited => "INVITED",
            ParticipantStatus::Joined => "JOINED",
            ParticipantStatus::Left => "LEFT",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "INVITED" => Some(ParticipantStatus::Invited),
            "JOINED" => Some(ParticipantStatus::Joined),
            "LEFT" => Some(ParticipantStatus::Left),
            _ => None,
        }
    }
}

/// A player's membership record in one competition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub competition_id: i64,
    pub player_id: i64,
    pub status: ParticipantStatus,
    pub invited_at: Option<DateTime<Utc>>,
    pub invited_by: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = IntegrityError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        let status = ParticipantStatus::from_str_name(&row.status).ok_or_else(|| {
            IntegrityError::UnknownValue {
                field: "participant status",
                value: row.status.clone(),
            }
        })?;
        Ok(Participant {
            competition_id: row.competition_id,
            player_id: row.player_id,
            status,
            invited_at: row.invited_at,
            invited_by: row.invited_by,
            joined_at: row.joined_at,
            left_at: row.left_at,
        })
    }
}

/// Enforces roster invariants on top of the participants table.
#[derive(Clone)]
pub struct ParticipantRegistry {
    db: Arc<Database>,
}

impl ParticipantRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Add a player with status INVITED or JOINED.
    pub async fn add_participant(
        &self,
        competition_id: i64,
        player_id: i64,
        status: ParticipantStatus,
        invited_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Participant, ParticipantError> {
        let result = self
            .try_add(competition_id, player_id, status, invited_by, now)
            .await;
        record_denial(&result);
        result
    }

    async fn try_add(
        &self,
        competition_id: i64,
        player_id: i64,
        status: ParticipantStatus,
        invited_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Participant, ParticipantError> {
        let competition = self.load_accepting(competition_id, now).await?;

        if let Some(existing) = self.db.get_participant(competition_id, player_id).await? {
            return Err(match Participant::try_from(existing)?.status {
                ParticipantStatus::Left => ParticipantError::PreviouslyLeft,
                _ => ParticipantError::AlreadyParticipant,
            });
        }

        match status {
            ParticipantStatus::Left => return Err(ParticipantError::InvalidStatus),
            ParticipantStatus::Joined
                if competition.visibility == Visibility::InviteOnly && invited_by.is_none() =>
            {
                return Err(ParticipantError::InviteRequired)
            }
            _ => {}
        }

        let inserted = match self
            .db
            .insert_participant_within_capacity(
                competition_id,
                player_id,
                status,
                invited_by,
                competition.max_participants,
                now,
            )
            .await
        {
            Ok(inserted) => inserted,
            // A concurrent add for the same pair won the race.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ParticipantError::AlreadyParticipant)
            }
            Err(e) => return Err(e.into()),
        };
        if !inserted {
            return Err(ParticipantError::CapacityExceeded {
                max: competition.max_participants,
            });
        }

        tracing::info!(
            competition_id,
            player_id,
            status = status.as_str(),
            "Participant added"
        );
        self.fetch(competition_id, player_id).await
    }

    /// Mark a player as having left. A player who is not an active
    /// participant is left alone and no error is raised.
    pub async fn remove_participant(
        &self,
        competition_id: i64,
        player_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ParticipantError> {
        if self
            .db
            .mark_participant_left(competition_id, player_id, now)
            .await?
        {
            tracing::info!(competition_id, player_id, "Participant left");
        }
        Ok(())
    }

    pub async fn get_participant_status(
        &self,
        competition_id: i64,
        player_id: i64,
    ) -> Result<Option<ParticipantStatus>, ParticipantError> {
        match self.db.get_participant(competition_id, player_id).await? {
            Some(row) => Ok(Some(Participant::try_from(row)?.status)),
            None => Ok(None),
        }
    }

    /// INVITED -> JOINED.
    pub async fn accept_invite(
        &self,
        competition_id: i64,
        player_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Participant, ParticipantError> {
        let result = self.try_accept(competition_id, player_id, now).await;
        record_denial(&result);
        result
    }

    async fn try_accept(
        &self,
        competition_id: i64,
        player_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Participant, ParticipantError> {
        self.load_accepting(competition_id, now).await?;
        if !self
            .db
            .accept_participant_invite(competition_id, player_id, now)
            .await?
        {
            return Err(ParticipantError::NotInvited);
        }
        tracing::info!(competition_id, player_id, "Invitation accepted");
        self.fetch(competition_id, player_id).await
    }

    pub async fn list_participants(
        &self,
        competition_id: i64,
    ) -> Result<Vec<Participant>, ParticipantError> {
        let rows = self.db.list_participants(competition_id).await?;
        let participants = rows
            .into_iter()
            .map(Participant::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(participants)
    }

    /// Load a competition and make sure it still takes roster changes.
    async fn load_accepting(
        &self,
        competition_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Competition, ParticipantError> {
        let row = self
            .db
            .get_competition(competition_id)
            .await?
            .ok_or(ParticipantError::CompetitionNotFound(competition_id))?;
        let competition = Competition::try_from(row)?;
        let season = match &competition.season_id {
            Some(id) => self.db.get_season(id).await?,
            None => None,
        };
        if !derive_state(&competition, season.as_ref(), now)?.accepts_participants() {
            return Err(ParticipantError::InactiveCompetition);
        }
        Ok(competition)
    }

    async fn fetch(
        &self,
        competition_id: i64,
        player_id: i64,
    ) -> Result<Participant, ParticipantError> {
        let row = self
            .db
            .get_participant(competition_id, player_id)
            .await?
            .ok_or(ParticipantError::Database(sqlx::Error::RowNotFound))?;
        Ok(Participant::try_from(row)?)
    }
}

fn record_denial<T>(result: &Result<T, ParticipantError>) {
    if let Err(e) = result {
        metrics::PARTICIPANT_DENIALS_TOTAL
            .with_label_values(&[e.label()])
            .inc();
    }
}
