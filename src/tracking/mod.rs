//! Latest-position store for assignments in flight.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::worker::GeoPoint;

/// Pings stamped further ahead than this are rejected; accepting one would
/// shadow every honest ping that follows.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// One position report from a worker's device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ping {
    pub location: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    /// Degrees clockwise from north.
    pub heading: Option<f64>,
    pub speed_kmh: Option<f64>,
    /// Horizontal accuracy reported by the device, in meters.
    pub accuracy_m: Option<f64>,
}

impl Ping {
    pub fn at(location: GeoPoint, recorded_at: DateTime<Utc>) -> Self {
        Self {
            location,
            recorded_at,
            heading: None,
            speed_kmh: None,
            accuracy_m: None,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if !self.location.is_valid() {
            return Err(AppError::Validation(format!(
                "ping location ({}, {}) is out of range",
                self.location.lat, self.location.lng
            )));
        }
        if self
            .heading
            .is_some_and(|h| !(h.is_finite() && (0.0..360.0).contains(&h)))
        {
            return Err(AppError::Validation("heading must be within [0, 360)".to_string()));
        }
        let negative = |v: Option<f64>| v.is_some_and(|v| !(v.is_finite() && v >= 0.0));
        if negative(self.speed_kmh) || negative(self.accuracy_m) {
            return Err(AppError::Validation(
                "speed and accuracy must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PingOutcome {
    Recorded,
    DiscardedOutOfOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationSnapshot {
    pub assignment_id: Uuid,
    pub location: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    pub heading: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub stale: bool,
    pub age_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Eta {
    pub distance_remaining_km: f64,
    pub minutes: f64,
    pub arrives_at: DateTime<Utc>,
    pub stale: bool,
}

pub struct LiveTrackingStore {
    positions: DashMap<Uuid, Ping>,
    stale_after: Duration,
    average_speed_kmh: f64,
}

impl LiveTrackingStore {
    pub fn new(stale_after: Duration, average_speed_kmh: f64) -> Self {
        Self {
            positions: DashMap::new(),
            stale_after,
            average_speed_kmh,
        }
    }

    pub fn record_ping(&self, assignment_id: Uuid, ping: Ping) -> Result<PingOutcome, AppError> {
        ping.validate()?;

        let now = Utc::now();
        if (ping.recorded_at - now).num_seconds() > MAX_CLOCK_SKEW_SECS {
            return Err(AppError::Validation(format!(
                "ping timestamp {} is in the future",
                ping.recorded_at
            )));
        }

        match self.positions.entry(assignment_id) {
            Entry::Occupied(mut entry) => {
                if ping.recorded_at < entry.get().recorded_at {
                    return Ok(PingOutcome::DiscardedOutOfOrder);
                }
                entry.insert(ping);
            }
            Entry::Vacant(entry) => {
                entry.insert(ping);
            }
        }

        Ok(PingOutcome::Recorded)
    }

    pub fn current_location(&self, assignment_id: Uuid) -> Result<LocationSnapshot, AppError> {
        self.current_location_at(assignment_id, Utc::now())
    }

    pub fn current_location_at(
        &self,
        assignment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LocationSnapshot, AppError> {
        let ping = self
            .positions
            .get(&assignment_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                AppError::NotFound(format!("no location recorded for assignment {assignment_id}"))
            })?;

        let age = now - ping.recorded_at;
        let stale = age
            .to_std()
            .map(|age| age > self.stale_after)
            .unwrap_or(false);

        Ok(LocationSnapshot {
            assignment_id,
            location: ping.location,
            recorded_at: ping.recorded_at,
            heading: ping.heading,
            speed_kmh: ping.speed_kmh,
            accuracy_m: ping.accuracy_m,
            stale,
            age_seconds: age.num_seconds().max(0),
        })
    }

    pub fn estimated_time_remaining(
        &self,
        assignment_id: Uuid,
        destination: &GeoPoint,
    ) -> Result<Eta, AppError> {
        self.estimated_time_remaining_at(assignment_id, destination, Utc::now())
    }

    pub fn estimated_time_remaining_at(
        &self,
        assignment_id: Uuid,
        destination: &GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<Eta, AppError> {
        if !destination.is_valid() {
            return Err(AppError::GeoDataMissing(
                "destination coordinate is not usable".to_string(),
            ));
        }

        let snapshot = self.current_location_at(assignment_id, now)?;
        let distance_remaining_km = haversine_km(&snapshot.location, destination);
        let minutes = distance_remaining_km / self.average_speed_kmh * 60.0;
        let arrives_at = now + chrono::Duration::milliseconds((minutes * 60_000.0).round() as i64);

        Ok(Eta {
            distance_remaining_km,
            minutes,
            arrives_at,
            stale: snapshot.stale,
        })
    }

    pub fn clear(&self, assignment_id: Uuid) {
        self.positions.remove(&assignment_id);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
