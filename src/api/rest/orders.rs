use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::lifecycle::advance_status;
use crate::error::AppError;
use crate::models::order::{ActorRole, Order, OrderStatus};
use crate::models::worker::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", post(update_order_status))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub pickup_address: String,
    pub delivery_address: String,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub special_instructions: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub actor: ActorRole,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if !payload.total_amount.is_finite() || payload.total_amount < 0.0 {
        return Err(AppError::Validation(
            "total_amount must be a non-negative number".to_string(),
        ));
    }
    if payload.pickup_address.trim().is_empty() || payload.delivery_address.trim().is_empty() {
        return Err(AppError::Validation("addresses cannot be empty".to_string()));
    }
    for point in [payload.pickup, payload.dropoff].iter().flatten() {
        if !point.is_valid() {
            return Err(AppError::Validation(format!(
                "coordinate ({}, {}) is out of range",
                point.lat, point.lng
            )));
        }
    }

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        status: OrderStatus::Pending,
        store_id: payload.store_id,
        customer_id: payload.customer_id,
        total_amount: payload.total_amount,
        pickup_address: payload.pickup_address,
        delivery_address: payload.delivery_address,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        special_instructions: payload.special_instructions,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    state.orders.insert(order.id, order.clone());
    info!(order_id = %order.id, store_id = %order.store_id, "order created");

    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order.value().clone()))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = advance_status(&state, id, payload.status, payload.actor)?;
    Ok(Json(order))
}
