use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Upper bound for the inactivity window: one week.
const MAX_INACTIVITY_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub driver_inactivity_minutes: i64,
    pub monitor_interval_secs: u64,
    /// Floor for the estimated-earnings field shown to couriers. Display only.
    pub min_courier_earnings: f64,
    pub courier_rate_per_km: f64,
    pub courier_speed_kmh: f64,
    pub connection_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            driver_inactivity_minutes: 10,
            monitor_interval_secs: 120,
            min_courier_earnings: 50.0,
            courier_rate_per_km: 10.0,
            courier_speed_kmh: 25.0,
            connection_buffer_size: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            driver_inactivity_minutes: parse_or_default(
                "DRIVER_INACTIVITY_MINUTES",
                defaults.driver_inactivity_minutes,
            )?,
            monitor_interval_secs: parse_or_default(
                "MONITOR_INTERVAL_SECS",
                defaults.monitor_interval_secs,
            )?,
            min_courier_earnings: parse_or_default(
                "MIN_COURIER_EARNINGS",
                defaults.min_courier_earnings,
            )?,
            courier_rate_per_km: parse_or_default(
                "COURIER_RATE_PER_KM",
                defaults.courier_rate_per_km,
            )?,
            courier_speed_kmh: parse_or_default("COURIER_SPEED_KMH", defaults.courier_speed_kmh)?,
            connection_buffer_size: parse_or_default(
                "CONNECTION_BUFFER_SIZE",
                defaults.connection_buffer_size,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_INACTIVITY_MINUTES).contains(&self.driver_inactivity_minutes) {
            return Err(AppError::Internal(format!(
                "invalid DRIVER_INACTIVITY_MINUTES: must be between 1 and {MAX_INACTIVITY_MINUTES}"
            )));
        }
        if self.monitor_interval_secs == 0 {
            return Err(AppError::Internal(
                "invalid MONITOR_INTERVAL_SECS: must be > 0".to_string(),
            ));
        }
        if self.courier_speed_kmh <= 0.0 {
            return Err(AppError::Internal(
                "invalid COURIER_SPEED_KMH: must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn inactivity_cutoff(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.driver_inactivity_minutes.clamp(1, MAX_INACTIVITY_MINUTES))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
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
