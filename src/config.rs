use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub log_level: String,
    pub request_timeout: Duration,
    pub refresh_timeout: Duration,
    pub list_poll_interval: Duration,
    pub detail_poll_interval: Duration,
    pub foreground_sample_interval: Duration,
    pub background_sample_interval: Duration,
    /// Minimum movement (meters) before a foreground fix is pushed upstream.
    pub foreground_distance_m: f64,
    pub background_distance_m: f64,
    pub token_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:4000/api".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            request_timeout: millis("REQUEST_TIMEOUT_MS", 15_000)?,
            refresh_timeout: millis("REFRESH_TIMEOUT_MS", 10_000)?,
            list_poll_interval: millis("LIST_POLL_INTERVAL_MS", 10_000)?,
            detail_poll_interval: millis("DETAIL_POLL_INTERVAL_MS", 30_000)?,
            foreground_sample_interval: millis("FG_SAMPLE_INTERVAL_MS", 5_000)?,
            background_sample_interval: millis("BG_SAMPLE_INTERVAL_MS", 30_000)?,
            foreground_distance_m: parse_or_default("FG_DISTANCE_M", 10.0)?,
            background_distance_m: parse_or_default("BG_DISTANCE_M", 100.0)?,
            token_path: PathBuf::from(
                env::var("TOKEN_PATH").unwrap_or_else(|_| "driver-tokens.json".to_string()),
            ),
        })
    }
}

fn millis(key: &str, default: u64) -> Result<Duration, DispatchError> {
    Ok(Duration::from_millis(parse_or_default(key, default)?))
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
