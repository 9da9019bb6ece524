pub mod fee;

use crate::error::AppError;
use crate::models::worker::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    // Clamp guards asin against rounding just above 1.0 for antipodal points.
    let haversine = (sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng).clamp(0.0, 1.0);
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Great-circle distance between two optional coordinates, in kilometers.
pub fn distance(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> Result<f64, AppError> {
    let a = require_point(a, "origin")?;
    let b = require_point(b, "destination")?;
    Ok(haversine_km(a, b).max(0.0))
}

fn require_point<'a>(point: Option<&'a GeoPoint>, label: &str) -> Result<&'a GeoPoint, AppError> {
    match point {
        Some(p) if p.is_valid() => Ok(p),
        Some(p) => Err(AppError::GeoDataMissing(format!(
            "{label} coordinate is not usable: ({}, {})",
            p.lat, p.lng
        ))),
        None => Err(AppError::GeoDataMissing(format!("{label} coordinate is absent"))),
    }
}

#[cfg(test)]
mod tests {
    use super::{distance, haversine_km};
    use crate::error::AppError;
    use crate::models::worker::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(12.9716, 77.5946);
        let b = GeoPoint::new(13.0827, 80.2707);
        let ab = distance(Some(&a), Some(&b)).unwrap();
        let ba = distance(Some(&b), Some(&a)).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn missing_coordinate_is_geo_data_missing() {
        let a = GeoPoint::new(12.9716, 77.5946);
        let err = distance(Some(&a), None).unwrap_err();
        assert!(matches!(err, AppError::GeoDataMissing(_)));
    }

    #[test]
    fn non_finite_coordinate_is_geo_data_missing() {
        let a = GeoPoint::new(f64::NAN, 77.5946);
        let b = GeoPoint::new(12.0, 77.0);
        let err = distance(Some(&a), Some(&b)).unwrap_err();
        assert!(matches!(err, AppError::GeoDataMissing(_)));

        let c = GeoPoint::new(12.0, f64::INFINITY);
        assert!(distance(Some(&b), Some(&c)).is_err());
    }
}
