// Prometheus metrics for the competition service.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Competitions selected for a transition in the most recent tick.
    pub static ref PENDING_TRANSITIONS: IntGauge = IntGauge::new(
        "competitions_pending_transitions",
        "Competitions due for a transition in the last tick",
    )
    .unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Lifecycle transitions completed, by phase (start, end).
    pub static ref TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("competitions_transitions_total", "Lifecycle transitions completed"),
        &["phase"],
    )
    .unwrap();

    /// Lifecycle transitions that failed, by phase.
    pub static ref TRANSITION_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("competitions_transition_failures_total", "Lifecycle transitions that failed"),
        &["phase"],
    )
    .unwrap();

    /// Snapshots written, by kind.
    pub static ref SNAPSHOTS_CAPTURED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("competitions_snapshots_captured_total", "Snapshots written"),
        &["kind"],
    )
    .unwrap();

    /// Participants skipped during capture, by kind.
    pub static ref SNAPSHOTS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("competitions_snapshots_failed_total", "Participants skipped during capture"),
        &["kind"],
    )
    .unwrap();

    /// Announcements that could not be delivered, by reason.
    pub static ref NOTIFICATIONS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("competitions_notifications_failed_total", "Undelivered announcements"),
        &["reason"],
    )
    .unwrap();

    /// Denied participant operations, by reason.
    pub static ref PARTICIPANT_DENIALS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("competitions_participant_denials_total", "Denied participant operations"),
        &["reason"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("competitions_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall time of one lifecycle tick in seconds.
    pub static ref TICK_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("competitions_tick_duration_seconds", "Lifecycle tick duration in seconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PENDING_TRANSITIONS.clone()),
        Box::new(TRANSITIONS_TOTAL.clone()),
        Box::new(TRANSITION_FAILURES_TOTAL.clone()),
        Box::new(SNAPSHOTS_CAPTURED_TOTAL.clone()),
        Box::new(SNAPSHOTS_FAILED_TOTAL.clone()),
        Box::new(NOTIFICATIONS_FAILED_TOTAL.clone()),
        Box::new(PARTICIPANT_DENIALS_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(TICK_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        // Registering twice (tests, repeated router builds) is harmless.
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("metric already registered: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Normalize a URL path for metric labels: replace numeric path segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
