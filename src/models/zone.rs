use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryZone {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub included_km: f64,
    pub base_fee: f64,
    pub per_km_fee: f64,
}

impl DeliveryZone {
    pub fn new(name: impl Into<String>, included_km: f64, base_fee: f64, per_km_fee: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            included_km,
            base_fee,
            per_km_fee,
        }
    }
}
