//! Shared builders for engine unit tests.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::engine::lifecycle::advance_status;
use crate::models::order::{ActorRole, Order, OrderStatus};
use crate::models::worker::{DeliveryWorker, GeoPoint};
use crate::state::AppState;

pub const PICKUP: GeoPoint = GeoPoint {
    lat: 52.5200,
    lng: 13.4050,
};
pub const DROPOFF: GeoPoint = GeoPoint {
    lat: 52.5300,
    lng: 13.4200,
};

pub fn state() -> Arc<AppState> {
    state_with(EngineSettings::default())
}

pub fn state_with(settings: EngineSettings) -> Arc<AppState> {
    let (state, _outbox_rx) = AppState::new(settings, 64, 64);
    Arc::new(state)
}

pub fn store_id(seed: u128) -> Uuid {
    Uuid::from_u128(10_000 + seed)
}

pub fn customer_id(seed: u128) -> Uuid {
    Uuid::from_u128(20_000 + seed)
}

/// Inserts a pending order between two points in central Berlin.
pub fn order(state: &AppState, seed: u128) -> Uuid {
    let now = Utc::now();
    let order = Order {
        id: Uuid::from_u128(seed),
        status: OrderStatus::Pending,
        store_id: store_id(seed),
        customer_id: customer_id(seed),
        total_amount: 420.0,
        pickup_address: format!("Store {seed}, Alexanderplatz"),
        delivery_address: format!("Customer {seed}, Prenzlauer Berg"),
        pickup: Some(PICKUP),
        dropoff: Some(DROPOFF),
        special_instructions: Some("ring twice".to_string()),
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    let id = order.id;
    state.orders.insert(id, order);
    id
}

/// Pending order walked to ready_for_pickup, which opens the first offer.
pub fn ready_order(state: &AppState, seed: u128) -> Uuid {
    let id = order(state, seed);
    advance_status(state, id, OrderStatus::Processing, ActorRole::Store).unwrap();
    advance_status(state, id, OrderStatus::ReadyForPickup, ActorRole::Store).unwrap();
    id
}

pub fn worker(state: &AppState, seed: u128, location: GeoPoint) -> Uuid {
    let worker = DeliveryWorker {
        id: Uuid::from_u128(30_000 + seed),
        name: format!("rider-{seed}"),
        available: true,
        location: Some(location),
        service_area: None,
        capacity: 1,
        active_assignments: 0,
        total_deliveries: 0,
        total_earnings: 0.0,
        cancellations: 0,
        rating: 4.8,
        updated_at: Utc::now(),
    };
    let id = worker.id;
    state.workers.insert(id, worker);
    id
}
