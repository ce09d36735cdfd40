use std::sync::Arc;

use chrono::Utc;
use tower_http::cors::CorsLayer;

use scout_competitions::cache::{DbLeaderboardCache, LeaderboardCache};
use scout_competitions::config::Config;
use scout_competitions::db::Database;
use scout_competitions::lifecycle::{spawn_lifecycle_worker, Reconciler};
use scout_competitions::notify::{LogNotifier, NotificationSink, WebhookNotifier};
use scout_competitions::stats::{DbStatsProvider, StatsProvider};
use scout_competitions::{api, metrics};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let stats: Arc<dyn StatsProvider> = Arc::new(DbStatsProvider::new(db.clone()));
    let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => {
            tracing::warn!("NOTIFY_WEBHOOK_URL not set, announcements are only logged");
            Arc::new(LogNotifier)
        }
    };
    let cache: Arc<dyn LeaderboardCache> = Arc::new(DbLeaderboardCache::new(db.clone()));

    let reconciler = Arc::new(Reconciler::new(
        db.clone(),
        stats,
        notifier,
        Some(cache),
        config.capture_settings(),
    ));

    if config.run_once {
        let report = reconciler.tick(Utc::now()).await;
        tracing::info!(
            started = ?report.started,
            ended = ?report.ended,
            failed = ?report.failed,
            "Single lifecycle tick complete"
        );
        return;
    }

    spawn_lifecycle_worker(reconciler.clone(), config.lifecycle_interval);

    let app = api::router(db, reconciler.leaderboards().clone(), config.active_limits())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Competition service listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
