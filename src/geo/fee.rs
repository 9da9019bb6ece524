//! Distance-banded delivery pricing.
//!
//! A distance is priced by the zone with the smallest included threshold that
//! still covers it. Distances beyond every threshold fall into the widest zone
//! and pay its per-kilometer rate for the overage.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::distance;
use crate::models::worker::GeoPoint;
use crate::models::zone::DeliveryZone;

/// Zones ordered by ascending threshold. Construction rejects tables that
/// would price a longer trip below a shorter one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DeliveryZone>", into = "Vec<DeliveryZone>")]
pub struct ZoneTable {
    zones: Vec<DeliveryZone>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeQuote {
    pub fee: f64,
    pub distance_km: f64,
    pub zone: DeliveryZone,
}

impl ZoneTable {
    pub fn new(mut zones: Vec<DeliveryZone>) -> Result<Self, AppError> {
        if zones.is_empty() {
            return Err(AppError::Validation(
                "zone table must contain at least one zone".to_string(),
            ));
        }

        for zone in &zones {
            let values = [zone.included_km, zone.base_fee, zone.per_km_fee];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(AppError::Validation(format!(
                    "zone {} has a negative or non-finite value",
                    zone.name
                )));
            }
        }

        zones.sort_by(|a, b| a.included_km.total_cmp(&b.included_km));

        for pair in zones.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if lower.included_km == upper.included_km {
                return Err(AppError::Validation(format!(
                    "zones {} and {} share threshold {} km",
                    lower.name, upper.name, lower.included_km
                )));
            }
            if upper.base_fee < lower.base_fee {
                return Err(AppError::Validation(format!(
                    "zone {} is cheaper than the nearer zone {}",
                    upper.name, lower.name
                )));
            }
        }

        Ok(Self { zones })
    }

    pub fn zones(&self) -> &[DeliveryZone] {
        &self.zones
    }

    pub fn zone_for(&self, distance_km: f64) -> &DeliveryZone {
        self.zones
            .iter()
            .find(|zone| zone.included_km >= distance_km)
            .unwrap_or_else(|| self.widest())
    }

    fn widest(&self) -> &DeliveryZone {
        // Non-empty by construction.
        &self.zones[self.zones.len() - 1]
    }

    pub fn fee(&self, distance_km: f64) -> Result<FeeQuote, AppError> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(AppError::Validation(format!(
                "distance must be a finite, non-negative number, got {distance_km}"
            )));
        }

        let zone = self.zone_for(distance_km);
        let overage = (distance_km - zone.included_km).max(0.0);
        let fee = round_currency(zone.base_fee + zone.per_km_fee * overage);

        Ok(FeeQuote {
            fee,
            distance_km,
            zone: zone.clone(),
        })
    }

    /// Distance between two coordinates priced against this table.
    pub fn quote(&self, from: Option<&GeoPoint>, to: Option<&GeoPoint>) -> Result<FeeQuote, AppError> {
        let distance_km = distance(from, to)?;
        self.fee(distance_km)
    }
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self {
            zones: vec![
                DeliveryZone::new("nearby", 3.0, 30.0, 8.0),
                DeliveryZone::new("standard", 7.0, 50.0, 8.0),
                DeliveryZone::new("extended", 12.0, 80.0, 10.0),
            ],
        }
    }
}

impl TryFrom<Vec<DeliveryZone>> for ZoneTable {
    type Error = AppError;

    fn try_from(zones: Vec<DeliveryZone>) -> Result<Self, Self::Error> {
        Self::new(zones)
    }
}

impl From<ZoneTable> for Vec<DeliveryZone> {
    fn from(table: ZoneTable) -> Self {
        table.zones
    }
}

fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
