use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::broker;
use crate::error::AppError;
use crate::models::worker::GeoPoint;
use crate::state::AppState;
use crate::tracking::{Eta, LocationSnapshot, Ping, PingOutcome};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/:assignment_id", get(get_location))
        .route("/tracking/:assignment_id/ping", post(record_ping))
}

#[derive(Deserialize)]
pub struct PingRequest {
    pub location: GeoPoint,
    pub recorded_at: Option<DateTime<Utc>>,
    pub heading: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub accuracy_m: Option<f64>,
}

#[derive(Serialize)]
pub struct PingResponse {
    pub outcome: PingOutcome,
}

#[derive(Serialize)]
pub struct TrackingResponse {
    #[serde(flatten)]
    pub snapshot: LocationSnapshot,
    pub eta: Option<Eta>,
}

async fn record_ping(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
    Json(payload): Json<PingRequest>,
) -> Result<(StatusCode, Json<PingResponse>), AppError> {
    let ping = Ping {
        location: payload.location,
        recorded_at: payload.recorded_at.unwrap_or_else(Utc::now),
        heading: payload.heading,
        speed_kmh: payload.speed_kmh,
        accuracy_m: payload.accuracy_m,
    };
    let outcome = broker::record_location(&state, assignment_id, ping)?;

    Ok((StatusCode::ACCEPTED, Json(PingResponse { outcome })))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
) -> Result<Json<TrackingResponse>, AppError> {
    let order_id = state
        .assignments
        .get(&assignment_id)
        .map(|entry| entry.order_id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {} not found", assignment_id)))?;
    let snapshot = state.tracking.current_location(assignment_id)?;

    let dropoff = state.orders.get(&order_id).and_then(|order| order.dropoff);
    let eta = match dropoff {
        Some(dropoff) => Some(state.tracking.estimated_time_remaining(assignment_id, &dropoff)?),
        None => None,
    };

    Ok(Json(TrackingResponse { snapshot, eta }))
}
