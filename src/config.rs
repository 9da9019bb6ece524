use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::geo::fee::ZoneTable;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub notification_queue_size: usize,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Knobs the broker, tracker and dispatcher read at runtime.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub offer_ttl: Duration,
    pub max_offer_retries: u32,
    pub service_radius_km: f64,
    pub radius_expansion_factor: f64,
    pub default_worker_capacity: u8,
    pub stale_after: Duration,
    pub average_speed_kmh: f64,
    pub expiry_sweep_interval: Duration,
    pub notify_max_attempts: u32,
    pub notify_retry_backoff: Duration,
    pub zones: ZoneTable,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            offer_ttl: Duration::from_secs(600),
            max_offer_retries: 2,
            service_radius_km: 5.0,
            radius_expansion_factor: 1.5,
            default_worker_capacity: 1,
            stale_after: Duration::from_secs(120),
            average_speed_kmh: 20.0,
            expiry_sweep_interval: Duration::from_millis(1000),
            notify_max_attempts: 3,
            notify_retry_backoff: Duration::from_millis(200),
            zones: ZoneTable::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let zones = match env::var("DELIVERY_ZONES") {
            Ok(raw) => serde_json::from_str::<ZoneTable>(&raw)
                .map_err(|err| AppError::Internal(format!("invalid DELIVERY_ZONES: {err}")))?,
            Err(_) => ZoneTable::default(),
        };

        let engine = EngineSettings {
            offer_ttl: Duration::from_secs(parse_or_default("OFFER_TTL_SECS", 600)?),
            max_offer_retries: parse_or_default("MAX_OFFER_RETRIES", 2)?,
            service_radius_km: parse_or_default("SERVICE_RADIUS_KM", 5.0)?,
            radius_expansion_factor: parse_or_default("RADIUS_EXPANSION_FACTOR", 1.5)?,
            default_worker_capacity: parse_or_default("DEFAULT_WORKER_CAPACITY", 1)?,
            stale_after: Duration::from_secs(parse_or_default("STALE_AFTER_SECS", 120)?),
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", 20.0)?,
            expiry_sweep_interval: Duration::from_millis(parse_or_default(
                "EXPIRY_SWEEP_INTERVAL_MS",
                1000,
            )?),
            notify_max_attempts: parse_or_default("NOTIFY_MAX_ATTEMPTS", 3)?,
            notify_retry_backoff: Duration::from_millis(parse_or_default(
                "NOTIFY_RETRY_BACKOFF_MS",
                200,
            )?),
            zones,
        };
        engine.validate()?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            notification_queue_size: parse_or_default("NOTIFICATION_QUEUE_SIZE", 1024)?,
            engine,
        })
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.offer_ttl.is_zero() {
            return Err(AppError::Internal("OFFER_TTL_SECS must be > 0".to_string()));
        }
        if !(self.service_radius_km.is_finite() && self.service_radius_km > 0.0) {
            return Err(AppError::Internal("SERVICE_RADIUS_KM must be > 0".to_string()));
        }
        if !(self.radius_expansion_factor.is_finite() && self.radius_expansion_factor >= 1.0) {
            return Err(AppError::Internal(
                "RADIUS_EXPANSION_FACTOR must be >= 1".to_string(),
            ));
        }
        if !(self.average_speed_kmh.is_finite() && self.average_speed_kmh > 0.0) {
            return Err(AppError::Internal("AVERAGE_SPEED_KMH must be > 0".to_string()));
        }
        if self.default_worker_capacity == 0 {
            return Err(AppError::Internal(
                "DEFAULT_WORKER_CAPACITY must be > 0".to_string(),
            ));
        }
        if self.expiry_sweep_interval.is_zero() {
            return Err(AppError::Internal(
                "EXPIRY_SWEEP_INTERVAL_MS must be > 0".to_string(),
            ));
        }
        if self.notify_max_attempts == 0 {
            return Err(AppError::Internal("NOTIFY_MAX_ATTEMPTS must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn offer_ttl_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.offer_ttl).unwrap_or_else(|_| chrono::Duration::minutes(10))
    }

    /// Search radius for the given offer cycle.
    pub fn radius_for_attempt(&self, attempt: u32) -> f64 {
        self.service_radius_km * self.radius_expansion_factor.powi(attempt as i32)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
