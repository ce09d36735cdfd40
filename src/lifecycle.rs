// Lifecycle reconciler: advances competitions from DRAFT to ACTIVE to ENDED
// by capturing snapshots, and announces each transition.
//
// Detection is driven by capture claims: a competition is selected for start
// until its START claim exists, and for end until its END claim exists. Each
// competition is processed independently; one failure is logged and the tick
// moves on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::LeaderboardCache;
use crate::competition::{derive_state, Competition, CompetitionState, CompetitionTiming};
use crate::db::{CompetitionRow, Database};
use crate::error::{LifecycleError, NotifyError};
use crate::leaderboard::LeaderboardService;
use crate::metrics;
use crate::notify::NotificationSink;
use crate::snapshot::{capture_snapshots, CaptureOutcome, CaptureSettings, SnapshotKind};
use crate::stats::StatsProvider;

/// Entries shown in an end-of-competition announcement.
const ANNOUNCED_ENTRIES: usize = 10;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub started: Vec<i64>,
    pub ended: Vec<i64>,
    pub failed: Vec<i64>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.started.is_empty() && self.ended.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    End,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::End => "end",
        }
    }

    fn kind(self) -> SnapshotKind {
        match self {
            Phase::Start => SnapshotKind::Start,
            Phase::End => SnapshotKind::End,
        }
    }
}

pub struct Reconciler {
    db: Arc<Database>,
    stats: Arc<dyn StatsProvider>,
    notifier: Arc<dyn NotificationSink>,
    leaderboards: LeaderboardService,
    settings: CaptureSettings,
}

impl Reconciler {
    pub fn new(
        db: Arc<Database>,
        stats: Arc<dyn StatsProvider>,
        notifier: Arc<dyn NotificationSink>,
        cache: Option<Arc<dyn LeaderboardCache>>,
        settings: CaptureSettings,
    ) -> Self {
        let leaderboards = LeaderboardService::new(db.clone(), stats.clone(), cache, settings);
        Self {
            db,
            stats,
            notifier,
            leaderboards,
            settings,
        }
    }

    pub fn leaderboards(&self) -> &LeaderboardService {
        &self.leaderboards
    }

    /// Run start detection, then end detection, as of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let tick_id = Uuid::new_v4();
        let span = tracing::info_span!("lifecycle_tick", %tick_id);
        let started_at = Instant::now();

        let report = async {
            let mut report = TickReport::default();
            self.run_phase(Phase::Start, now, &mut report).await;
            self.run_phase(Phase::End, now, &mut report).await;
            if !report.is_idle() {
                tracing::info!(
                    started = report.started.len(),
                    ended = report.ended.len(),
                    failed = report.failed.len(),
                    "Lifecycle tick finished"
                );
            }
            report
        }
        .instrument(span)
        .await;

        metrics::TICK_DURATION_SECONDS.observe(started_at.elapsed().as_secs_f64());
        report
    }

    async fn run_phase(&self, phase: Phase, now: DateTime<Utc>, report: &mut TickReport) {
        let due = match phase {
            Phase::Start => self.db.competitions_to_start(now).await,
            Phase::End => self.db.competitions_to_end(now).await,
        };
        let due = match due {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(phase = phase.label(), "Detection query failed: {e}");
                metrics::TRANSITION_FAILURES_TOTAL
                    .with_label_values(&[phase.label()])
                    .inc();
                return;
            }
        };
        metrics::PENDING_TRANSITIONS.set(due.len() as i64);

        let results = join_all(due.into_iter().map(|row| {
            let competition_id = row.id;
            async move { (competition_id, self.transition(phase, row, now).await) }
        }))
        .await;

        for (competition_id, result) in results {
            match result {
                Ok(true) => {
                    metrics::TRANSITIONS_TOTAL
                        .with_label_values(&[phase.label()])
                        .inc();
                    match phase {
                        Phase::Start => report.started.push(competition_id),
                        Phase::End => report.ended.push(competition_id),
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        competition_id,
                        phase = phase.label(),
                        "Transition failed: {e}"
                    );
                    metrics::TRANSITION_FAILURES_TOTAL
                        .with_label_values(&[phase.label()])
                        .inc();
                    report.failed.push(competition_id);
                }
            }
        }
    }

    /// Returns false when another worker already captured this boundary.
    async fn transition(
        &self,
        phase: Phase,
        row: CompetitionRow,
        now: DateTime<Utc>,
    ) -> Result<bool, LifecycleError> {
        let competition = Competition::try_from(row)?;
        let season = match &competition.season_id {
            Some(id) => self.db.get_season(id).await?,
            None => None,
        };
        let state = derive_state(&competition, season.as_ref(), now)?;
        let expected = match phase {
            Phase::Start => CompetitionState::Active,
            Phase::End => CompetitionState::Ended,
        };
        // A competition whose whole window passed between two ticks still gets
        // its START capture; the end phase of the same tick then ends it.
        if state != expected && !(phase == Phase::Start && state == CompetitionState::Ended) {
            tracing::warn!(
                competition_id = competition.id,
                phase = phase.label(),
                ?state,
                "Selected for transition in an unexpected state, skipping"
            );
            return Ok(false);
        }

        let roster = self.db.active_roster(competition.id).await?;
        let outcome = capture_snapshots(
            &self.db,
            self.stats.as_ref(),
            &competition,
            phase.kind(),
            &roster,
            &self.settings,
            now,
        )
        .await?;
        let report = match outcome {
            CaptureOutcome::Captured(report) => report,
            CaptureOutcome::AlreadyCaptured => return Ok(false),
        };

        if !roster.is_empty() && report.succeeded == 0 {
            tracing::warn!(
                competition_id = competition.id,
                phase = phase.label(),
                failed = report.failed,
                "No snapshots captured, skipping announcement"
            );
            return Ok(true);
        }

        let message = match phase {
            Phase::Start => start_message(&competition, roster.len()),
            Phase::End => {
                match self.leaderboards.final_leaderboard(&competition, now).await {
                    Ok(leaderboard) => format!(
                        "Competition \"{}\" has ended! Final standings:\n{}",
                        competition.title,
                        leaderboard.render(ANNOUNCED_ENTRIES)
                    ),
                    Err(e) => {
                        // END is committed; the announcement just goes out
                        // without standings.
                        tracing::error!(
                            competition_id = competition.id,
                            "Final leaderboard failed: {e}"
                        );
                        format!("Competition \"{}\" has ended!", competition.title)
                    }
                }
            }
        };
        self.announce(&competition, &message).await;
        Ok(true)
    }

    async fn announce(&self, competition: &Competition, message: &str) {
        let result = self
            .notifier
            .send(message, &competition.channel_id, &competition.server_id)
            .await;
        let Err(e) = result else {
            return;
        };
        metrics::NOTIFICATIONS_FAILED_TOTAL
            .with_label_values(&[e.label()])
            .inc();
        match e {
            NotifyError::PermissionDenied { .. } => tracing::warn!(
                competition_id = competition.id,
                channel_id = %competition.channel_id,
                "Announcement not delivered: {e}"
            ),
            NotifyError::Other(_) => tracing::error!(
                competition_id = competition.id,
                channel_id = %competition.channel_id,
                "Announcement not delivered: {e}"
            ),
        }
    }
}

fn start_message(competition: &Competition, participants: usize) -> String {
    let ends = match competition.timing() {
        Ok(CompetitionTiming::FixedDates { end, .. }) => {
            format!("Ends {}.", end.format("%Y-%m-%d %H:%M UTC"))
        }
        _ => "Ends with the season.".to_string(),
    };
    format!(
        "Competition \"{}\" has started! {}. {} participant(s). {}",
        competition.title,
        competition.criteria.describe(),
        participants,
        ends
    )
}

/// Spawn a background task that runs a lifecycle tick every `interval`.
pub fn spawn_lifecycle_worker(
    reconciler: Arc<Reconciler>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            reconciler.tick(Utc::now()).await;
            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::competition::Visibility;
    use crate::criteria::{CompetitionCriteria, Queue};

    fn competition(timing: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Competition {
        let now = Utc::now();
        Competition {
            id: 3,
            server_id: "srv".into(),
            owner_id: "owner".into(),
            channel_id: "chan".into(),
            title: "Climb".into(),
            description: String::new(),
            visibility: Visibility::Open,
            max_participants: 5,
            start_date: timing.map(|t| t.0),
            end_date: timing.map(|t| t.1),
            season_id: timing.is_none().then(|| "s1".to_string()),
            criteria: CompetitionCriteria::MostWinsPlayer { queue: Queue::Solo },
            is_cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_start_message() {
        let start = DateTime::parse_from_rfc3339("2026-05-01T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2026-05-08T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            start_message(&competition(Some((start, end))), 2),
            "Competition \"Climb\" has started! Most wins (Ranked Solo/Duo). 2 participant(s). Ends 2026-05-08 18:00 UTC."
        );
        assert!(start_message(&competition(None), 0).ends_with("Ends with the season."));
    }

    #[test]
    fn test_tick_report_idle() {
        assert!(TickReport::default().is_idle());
        let report = TickReport {
            started: vec![1],
            ..Default::default()
        };
        assert!(!report.is_idle());
    }
}
