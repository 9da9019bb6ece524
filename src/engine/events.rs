use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::order::{ActorRole, OrderStatus};
use crate::models::worker::GeoPoint;

/// Everything the push endpoint streams to dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderStatusChanged {
        order_id: Uuid,
        status: OrderStatus,
        actor: ActorRole,
    },
    OfferCreated {
        order_id: Uuid,
        assignment_id: Uuid,
        attempt: u32,
        radius_km: f64,
        workers: usize,
        expires_at: DateTime<Utc>,
    },
    OfferClaimed {
        order_id: Uuid,
        assignment_id: Uuid,
        worker_id: Uuid,
    },
    OfferExpired {
        order_id: Uuid,
        assignment_id: Uuid,
        attempt: u32,
    },
    OfferEscalated {
        order_id: Uuid,
        attempts: u32,
    },
    AssignmentCancelled {
        order_id: Uuid,
        assignment_id: Uuid,
        worker_id: Option<Uuid>,
    },
    DeliveryCompleted {
        order_id: Uuid,
        assignment_id: Uuid,
        worker_id: Uuid,
        fee: f64,
    },
    LocationUpdated {
        assignment_id: Uuid,
        location: GeoPoint,
        recorded_at: DateTime<Utc>,
    },
}
