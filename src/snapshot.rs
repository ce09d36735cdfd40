// Snapshot capture: freeze every rostered participant's statistics at a
// lifecycle boundary.
//
// Lookups run first, concurrently and outside any transaction. The writes
// then commit as one unit together with the capture claim, so a competition
// is either fully captured for a kind or not at all.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::competition::Competition;
use crate::criteria::SnapshotPayload;
use crate::db::{claim_capture, finish_capture, insert_snapshot, Database, SnapshotRow};
use crate::error::{IntegrityError, LifecycleError};
use crate::metrics;
use crate::stats::{lookup_with_timeout, StatsProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotKind {
    Start,
    End,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Start => "START",
            SnapshotKind::End => "END",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "START" => Some(SnapshotKind::Start),
            "END" => Some(SnapshotKind::End),
            _ => None,
        }
    }
}

/// An immutable capture of one participant's statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub competition_id: i64,
    pub player_id: i64,
    pub kind: SnapshotKind,
    pub payload: SnapshotPayload,
    pub captured_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = IntegrityError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let kind = SnapshotKind::from_str_name(&row.snapshot_type).ok_or_else(|| {
            IntegrityError::UnknownValue {
                field: "snapshot type",
                value: row.snapshot_type.clone(),
            }
        })?;
        let payload = serde_json::from_str(&row.payload).map_err(|e| IntegrityError::Payload {
            competition_id: row.competition_id,
            player_id: row.player_id,
            reason: e.to_string(),
        })?;
        Ok(Snapshot {
            competition_id: row.competition_id,
            player_id: row.player_id,
            kind,
            payload,
            captured_at: row.captured_at,
        })
    }
}

/// Load every snapshot of `kind` for a competition, in capture order.
pub async fn load_snapshots<E>(
    db: &Database,
    competition_id: i64,
    kind: SnapshotKind,
) -> Result<Vec<Snapshot>, E>
where
    E: From<sqlx::Error> + From<IntegrityError>,
{
    let rows = db.list_snapshots(competition_id, kind).await?;
    let snapshots = rows
        .into_iter()
        .map(Snapshot::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(snapshots)
}

/// Bounds applied to the statistics lookups of one capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub lookup_timeout: Duration,
    pub concurrency: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(10),
            concurrency: 8,
        }
    }
}

/// How many participants were captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CaptureReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl CaptureReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(CaptureReport),
    /// Another capture of the same kind already committed.
    AlreadyCaptured,
}

/// Capture `kind` snapshots for every player in `roster`.
///
/// A failed lookup or insert is logged and counted against that one player;
/// the rest of the roster is still captured. Database errors outside the
/// per-player writes fail the whole capture and roll it back.
pub async fn capture_snapshots(
    db: &Database,
    stats: &dyn StatsProvider,
    competition: &Competition,
    kind: SnapshotKind,
    roster: &[i64],
    settings: &CaptureSettings,
    now: DateTime<Utc>,
) -> Result<CaptureOutcome, LifecycleError> {
    let query = competition.criteria.stats_query();
    let lookups: Vec<_> = stream::iter(roster.iter().copied())
        .map(|player_id| {
            let query = &query;
            async move {
                let result =
                    lookup_with_timeout(stats, player_id, query, settings.lookup_timeout).await;
                (player_id, result)
            }
        })
        .buffered(settings.concurrency.max(1))
        .collect()
        .await;

    let mut tx = db.begin().await?;
    if !claim_capture(&mut tx, competition.id, kind, now).await? {
        tx.rollback().await?;
        tracing::info!(
            competition_id = competition.id,
            kind = kind.as_str(),
            "Capture already claimed, skipping"
        );
        return Ok(CaptureOutcome::AlreadyCaptured);
    }

    let mut report = CaptureReport::default();
    for (player_id, result) in lookups {
        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    competition_id = competition.id,
                    player_id,
                    kind = kind.as_str(),
                    "Statistics lookup failed: {e}"
                );
                report.failed += 1;
                continue;
            }
        };

        let payload = serde_json::to_string(&competition.criteria.payload_from(&stats))?;
        match insert_snapshot(&mut tx, competition.id, player_id, kind, &payload, now).await {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                tracing::warn!(
                    competition_id = competition.id,
                    player_id,
                    kind = kind.as_str(),
                    "Snapshot insert failed: {e}"
                );
                report.failed += 1;
            }
        }
    }

    finish_capture(
        &mut tx,
        competition.id,
        kind,
        report.succeeded as i64,
        report.failed as i64,
    )
    .await?;
    tx.commit().await?;

    metrics::SNAPSHOTS_CAPTURED_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc_by(report.succeeded as u64);
    metrics::SNAPSHOTS_FAILED_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc_by(report.failed as u64);

    tracing::info!(
        competition_id = competition.id,
        kind = kind.as_str(),
        succeeded = report.succeeded,
        failed = report.failed,
        "Snapshots captured"
    );
    Ok(CaptureOutcome::Captured(report))
}
