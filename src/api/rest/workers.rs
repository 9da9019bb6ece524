use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::worker::{DeliveryWorker, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workers", post(create_worker).get(list_workers))
        .route("/workers/:id", get(get_worker))
        .route("/workers/:id/availability", patch(update_worker_availability))
        .route("/workers/:id/location", patch(update_worker_location))
}

#[derive(Deserialize)]
pub struct CreateWorkerRequest {
    pub name: String,
    pub location: Option<GeoPoint>,
    pub service_area: Option<GeoPoint>,
    pub capacity: Option<u8>,
    pub rating: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    if point.is_valid() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "coordinate ({}, {}) is out of range",
            point.lat, point.lng
        )))
    }
}

async fn create_worker(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateWorkerRequest>,
) -> Result<Json<DeliveryWorker>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let capacity = payload
        .capacity
        .unwrap_or(state.settings.default_worker_capacity);
    if capacity == 0 {
        return Err(AppError::Validation("capacity must be > 0".to_string()));
    }

    for point in [payload.location, payload.service_area].iter().flatten() {
        validate_point(point)?;
    }

    let worker = DeliveryWorker {
        id: Uuid::new_v4(),
        name: payload.name,
        available: true,
        location: payload.location,
        service_area: payload.service_area,
        capacity,
        active_assignments: 0,
        total_deliveries: 0,
        total_earnings: 0.0,
        cancellations: 0,
        rating: payload.rating.unwrap_or(5.0).clamp(0.0, 5.0),
        updated_at: Utc::now(),
    };

    state.workers.insert(worker.id, worker.clone());
    info!(worker_id = %worker.id, capacity, "worker registered");

    Ok(Json(worker))
}

async fn list_workers(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryWorker>> {
    let workers = state
        .workers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(workers)
}

async fn get_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryWorker>, AppError> {
    let worker = state
        .workers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("worker {} not found", id)))?;

    Ok(Json(worker.value().clone()))
}

async fn update_worker_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<DeliveryWorker>, AppError> {
    let mut worker = state
        .workers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("worker {} not found", id)))?;

    worker.available = payload.available;
    worker.updated_at = Utc::now();

    Ok(Json(worker.clone()))
}

async fn update_worker_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<DeliveryWorker>, AppError> {
    validate_point(&payload.location)?;

    let mut worker = state
        .workers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("worker {} not found", id)))?;

    worker.location = Some(payload.location);
    worker.updated_at = Utc::now();

    Ok(Json(worker.clone()))
}
