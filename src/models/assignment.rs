use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    Offered,
    Claimed,
    Expired,
    Cancelled,
    Completed,
}

impl AssignmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssignmentState::Expired | AssignmentState::Cancelled | AssignmentState::Completed
        )
    }
}

/// What one worker was quoted when the offer went out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerQuote {
    pub worker_id: Uuid,
    pub fee: f64,
    pub distance_km: f64,
    pub approach_km: f64,
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAssignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub worker_id: Option<Uuid>,
    pub state: AssignmentState,
    pub fee: f64,
    pub distance_km: f64,
    /// Zero for the first offer cycle, incremented on every automatic re-offer.
    pub attempt: u32,
    pub radius_km: f64,
    pub offered_to: Vec<WorkerQuote>,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl DeliveryAssignment {
    pub fn quote_for(&self, worker_id: Uuid) -> Option<&WorkerQuote> {
        self.offered_to
            .iter()
            .find(|quote| quote.worker_id == worker_id)
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.state == AssignmentState::Offered && self.worker_id.is_none() && now < self.expires_at
    }

    /// Claimed or completed: the row that owns the order.
    pub fn holds_order(&self) -> bool {
        matches!(
            self.state,
            AssignmentState::Claimed | AssignmentState::Completed
        )
    }
}
