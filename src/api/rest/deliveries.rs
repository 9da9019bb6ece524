use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::broker::{self, CancelOutcome, OfferView};
use crate::error::AppError;
use crate::models::assignment::DeliveryAssignment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/offers", get(list_offers))
        .route("/deliveries/offers/:order_id/accept", post(accept_offer))
        .route("/deliveries/offers/:order_id/cancel", post(cancel_claim))
        .route("/deliveries/offers/:order_id/reoffer", post(reoffer))
        .route("/deliveries/assignments", get(list_assignments))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffersQuery {
    pub worker_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentsQuery {
    pub order_id: Option<Uuid>,
    pub worker_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct WorkerRequest {
    pub worker_id: Uuid,
}

async fn list_offers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OffersQuery>,
) -> Result<Json<Vec<OfferView>>, AppError> {
    if !state.workers.contains_key(&query.worker_id) {
        return Err(AppError::NotFound(format!(
            "worker {} not found",
            query.worker_id
        )));
    }

    Ok(Json(broker::open_offers_for(&state, query.worker_id)))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<WorkerRequest>,
) -> Result<Json<DeliveryAssignment>, AppError> {
    let assignment = broker::accept_offer(&state, order_id, payload.worker_id)?;
    Ok(Json(assignment))
}

async fn cancel_claim(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<WorkerRequest>,
) -> Result<Json<CancelOutcome>, AppError> {
    let outcome = broker::cancel_claim(&state, payload.worker_id, order_id)?;
    Ok(Json(outcome))
}

async fn reoffer(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<DeliveryAssignment>, AppError> {
    let assignment = broker::reoffer(&state, order_id)?;
    Ok(Json(assignment))
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssignmentsQuery>,
) -> Json<Vec<DeliveryAssignment>> {
    let mut assignments: Vec<DeliveryAssignment> = state
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|a| query.order_id.is_none_or(|id| a.order_id == id))
        .filter(|a| query.worker_id.is_none_or(|id| a.worker_id == Some(id)))
        .collect();
    assignments.sort_by(|a, b| a.offered_at.cmp(&b.offered_at));

    Json(assignments)
}
