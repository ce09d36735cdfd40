// HTTP API routes (competitions, participants, leaderboards, metrics).

use axum::{
    body::Body,
    extract::{Json, Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::competition::{
    cancel_competition, create_competition, derive_state, load_competition, ActiveLimits,
    NewCompetition,
};
use crate::db::Database;
use crate::error::{CompetitionError, LeaderboardError, ParticipantError};
use crate::leaderboard::LeaderboardService;
use crate::metrics;
use crate::participant::{ParticipantRegistry, ParticipantStatus};

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddParticipantRequest {
    pub player_id: i64,
    /// Defaults to JOINED.
    pub status: Option<ParticipantStatus>,
    pub invited_by: Option<String>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub participants: ParticipantRegistry,
    pub leaderboards: LeaderboardService,
    pub limits: ActiveLimits,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: impl std::fmt::Display) -> impl IntoResponse {
    tracing::error!("Internal error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn competition_error(e: CompetitionError) -> Response {
    match e {
        CompetitionError::Validation(v) => {
            json_error(StatusCode::BAD_REQUEST, &v.to_string()).into_response()
        }
        CompetitionError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "Competition not found").into_response()
        }
        e => internal_error(e).into_response(),
    }
}

fn participant_error(e: ParticipantError) -> Response {
    let status = match e {
        ParticipantError::AlreadyParticipant
        | ParticipantError::PreviouslyLeft
        | ParticipantError::CapacityExceeded { .. }
        | ParticipantError::InactiveCompetition
        | ParticipantError::InviteRequired
        | ParticipantError::NotInvited => StatusCode::CONFLICT,
        ParticipantError::InvalidStatus => StatusCode::BAD_REQUEST,
        ParticipantError::CompetitionNotFound(_) => StatusCode::NOT_FOUND,
        ParticipantError::Integrity(_) | ParticipantError::Database(_) => {
            return internal_error(e).into_response();
        }
    };
    json_error(status, &e.to_string()).into_response()
}

fn leaderboard_error(e: LeaderboardError) -> Response {
    match e {
        LeaderboardError::NotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "Competition not found").into_response()
        }
        e => internal_error(e).into_response(),
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(db: Arc<Database>, leaderboards: LeaderboardService, limits: ActiveLimits) -> Router {
    metrics::register_metrics();
    let state = AppState {
        participants: ParticipantRegistry::new(db.clone()),
        db,
        leaderboards,
        limits,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        // Competitions
        .route("/api/competitions", post(create))
        .route("/api/competitions/{id}", get(get_competition))
        .route("/api/competitions/{id}/cancel", post(cancel))
        .route("/api/competitions/{id}/leaderboard", get(get_leaderboard))
        // Participants
        .route(
            "/api/competitions/{id}/participants",
            get(list_participants).post(add_participant),
        )
        .route(
            "/api/competitions/{id}/participants/{player_id}",
            get(participant_status).delete(remove_participant),
        )
        .route(
            "/api/competitions/{id}/participants/{player_id}/accept",
            post(accept_invite),
        )
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn track_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let response = next.run(req).await;
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    response
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "scout-competitions" }))
}

async fn get_metrics() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

// ── Competition handlers ──────────────────────────────────────────────

async fn create(
    State(state): State<AppState>,
    Json(req): Json<NewCompetition>,
) -> impl IntoResponse {
    match create_competition(&state.db, &req, state.limits, Utc::now()).await {
        Ok(competition) => (StatusCode::CREATED, Json(json!(competition))).into_response(),
        Err(e) => competition_error(e),
    }
}

async fn get_competition(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let (competition, season) = match load_competition(&state.db, id).await {
        Ok(loaded) => loaded,
        Err(e) => return competition_error(e),
    };
    match derive_state(&competition, season.as_ref(), Utc::now()) {
        Ok(derived) => (
            StatusCode::OK,
            Json(json!({ "competition": competition, "state": derived, "season": season })),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn cancel(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match cancel_competition(&state.db, id, Utc::now()).await {
        Ok(competition) => (StatusCode::OK, Json(json!(competition))).into_response(),
        Err(e) => competition_error(e),
    }
}

async fn get_leaderboard(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.leaderboards.current_leaderboard(id, Utc::now()).await {
        Ok(leaderboard) => (StatusCode::OK, Json(json!(leaderboard))).into_response(),
        Err(e) => leaderboard_error(e),
    }
}

// ── Participant handlers ──────────────────────────────────────────────

async fn list_participants(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.db.get_competition(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "Competition not found").into_response()
        }
        Err(e) => return internal_error(e).into_response(),
    }
    match state.participants.list_participants(id).await {
        Ok(participants) => (StatusCode::OK, Json(json!(participants))).into_response(),
        Err(e) => participant_error(e),
    }
}

async fn add_participant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AddParticipantRequest>,
) -> impl IntoResponse {
    match state.db.get_player(req.player_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "Player not found").into_response(),
        Err(e) => return internal_error(e).into_response(),
    }
    let status = req.status.unwrap_or(ParticipantStatus::Joined);
    match state
        .participants
        .add_participant(id, req.player_id, status, req.invited_by.as_deref(), Utc::now())
        .await
    {
        Ok(participant) => (StatusCode::CREATED, Json(json!(participant))).into_response(),
        Err(e) => participant_error(e),
    }
}

async fn participant_status(
    State(state): State<AppState>,
    Path((id, player_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    match state.participants.get_participant_status(id, player_id).await {
        Ok(status) => (StatusCode::OK, Json(json!({ "status": status }))).into_response(),
        Err(e) => participant_error(e),
    }
}

async fn remove_participant(
    State(state): State<AppState>,
    Path((id, player_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    match state
        .participants
        .remove_participant(id, player_id, Utc::now())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => participant_error(e),
    }
}

async fn accept_invite(
    State(state): State<AppState>,
    Path((id, player_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    match state
        .participants
        .accept_invite(id, player_id, Utc::now())
        .await
    {
        Ok(participant) => (StatusCode::OK, Json(json!(participant))).into_response(),
        Err(e) => participant_error(e),
    }
}
