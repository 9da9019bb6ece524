use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryWorker {
    pub id: Uuid,
    pub name: String,
    pub available: bool,
    pub location: Option<GeoPoint>,
    /// Center of the area the worker usually serves; offers quote from here when set.
    pub service_area: Option<GeoPoint>,
    pub capacity: u8,
    pub active_assignments: u8,
    pub total_deliveries: u64,
    pub total_earnings: f64,
    pub cancellations: u32,
    pub rating: f64,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryWorker {
    pub fn has_capacity(&self) -> bool {
        self.active_assignments < self.capacity
    }

    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.active_assignments as f64 / self.capacity as f64
    }
}
