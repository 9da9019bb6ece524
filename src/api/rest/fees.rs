use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::geo::fee::{FeeQuote, ZoneTable};
use crate::models::worker::GeoPoint;
use crate::models::zone::DeliveryZone;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fees/calculate", post(calculate_fee))
        .route("/zones", get(list_zones).put(replace_zones))
}

#[derive(Deserialize)]
pub struct FeeRequest {
    pub origin: Option<GeoPoint>,
    pub destination: Option<GeoPoint>,
}

async fn calculate_fee(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeeRequest>,
) -> Result<Json<FeeQuote>, AppError> {
    let quote = state
        .zones
        .load()
        .quote(payload.origin.as_ref(), payload.destination.as_ref())?;
    Ok(Json(quote))
}

async fn list_zones(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryZone>> {
    Json(state.zones.load().zones().to_vec())
}

/// Open offers keep the fees they were quoted; only new offers see the table.
async fn replace_zones(
    State(state): State<Arc<AppState>>,
    Json(zones): Json<Vec<DeliveryZone>>,
) -> Result<Json<Vec<DeliveryZone>>, AppError> {
    let table = ZoneTable::new(zones)?;
    let zones = table.zones().to_vec();
    state.zones.store(Arc::new(table));
    info!(zones = zones.len(), "zone table replaced");

    Ok(Json(zones))
}
