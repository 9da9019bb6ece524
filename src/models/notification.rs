use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DeliveryOffer,
    ClaimVoid,
    OrderStatusChanged,
    OfferEscalation,
    AssignmentCancelled,
}

/// Payload keyed by notification type; the serialized `type` tag is the kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    DeliveryOffer {
        order_id: Uuid,
        assignment_id: Uuid,
        fee: f64,
        distance_km: f64,
        approach_km: f64,
        pickup_address: String,
        delivery_address: String,
        special_instructions: Option<String>,
        expires_at: DateTime<Utc>,
    },
    ClaimVoid {
        order_id: Uuid,
        assignment_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        status: OrderStatus,
    },
    OfferEscalation {
        order_id: Uuid,
        attempts: u32,
        radius_km: f64,
    },
    AssignmentCancelled {
        order_id: Uuid,
        assignment_id: Uuid,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationPayload::DeliveryOffer { .. } => NotificationKind::DeliveryOffer,
            NotificationPayload::ClaimVoid { .. } => NotificationKind::ClaimVoid,
            NotificationPayload::OrderStatusChanged { .. } => NotificationKind::OrderStatusChanged,
            NotificationPayload::OfferEscalation { .. } => NotificationKind::OfferEscalation,
            NotificationPayload::AssignmentCancelled { .. } => {
                NotificationKind::AssignmentCancelled
            }
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            NotificationPayload::DeliveryOffer { order_id, .. }
            | NotificationPayload::ClaimVoid { order_id, .. }
            | NotificationPayload::OrderStatusChanged { order_id, .. }
            | NotificationPayload::OfferEscalation { order_id, .. }
            | NotificationPayload::AssignmentCancelled { order_id, .. } => *order_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient_id: Uuid, payload: NotificationPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            kind: payload.kind(),
            payload,
            read: false,
            created_at: Utc::now(),
        }
    }
}
