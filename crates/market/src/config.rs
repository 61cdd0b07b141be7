//! Market configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `RUBUY_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `RUBUY_HOST` - Bind address (default: 127.0.0.1)
//! - `RUBUY_PORT` - Listen port (default: 3000)
//! - `RUBUY_RATES_URL` - Daily exchange rate feed (default: CBR daily JSON mirror)
//! - `RUBUY_RATES_TIMEOUT_SECS` - Rate lookup timeout (default: 5)
//! - `RUBUY_MARKUP_PCT` - Nominal freight markup as a fraction (default: 0.03)
//! - `RUBUY_MARKUP_MIN_PCT` / `RUBUY_MARKUP_MAX_PCT` - Markup clamp bounds (default: 0 / 0.15)
//! - `RUBUY_FREIGHT_FEE_CNY` - Flat freight fee in CNY (default: 0)
//! - `RUBUY_ROUND_DIGITS` - Monetary output precision, at most 8 (default: 2)
//! - `RUBUY_JANITOR_INTERVAL_SECS` - Janitor period (default: 600)
//! - `RUBUY_TEMPORARY_MODEL_TTL_SECS` - Age after which temporary models are purged (default: 3600)
//! - `RUBUY_LOG_JSON` - Emit JSON logs when set
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Trace sample rate (default: 0.1)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use crate::shipment::freight::PricingParams;

const DEFAULT_RATES_URL: &str = "https://www.cbr-xml-daily.ru/daily_json.js";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Market application configuration.
///
/// Implements `Debug` manually to redact the database URL.
#[derive(Clone)]
pub struct MarketConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Rate gateway settings
    pub rates: RatesConfig,
    /// Default freight pricing parameters
    pub pricing: PricingParams,
    /// Temporary model cleanup
    pub janitor: JanitorConfig,
    /// Emit JSON logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

impl std::fmt::Debug for MarketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketConfig")
            .field("database_url", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rates", &self.rates)
            .field("pricing", &self.pricing)
            .field("janitor", &self.janitor)
            .field("log_json", &self.log_json)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish_non_exhaustive()
    }
}

/// Exchange rate source settings.
#[derive(Debug, Clone)]
pub struct RatesConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Janitor schedule.
#[derive(Debug, Clone, Copy)]
pub struct JanitorConfig {
    pub interval: Duration,
    pub temporary_model_ttl: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            temporary_model_ttl: Duration::from_secs(3600),
        }
    }
}

impl MarketConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or any value
    /// fails to parse or validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("RUBUY_DATABASE_URL")?;
        let host = parse_env::<IpAddr>("RUBUY_HOST", "127.0.0.1")?;
        let port = parse_env::<u16>("RUBUY_PORT", "3000")?;

        let rates = RatesConfig {
            url: get_env_or_default("RUBUY_RATES_URL", DEFAULT_RATES_URL),
            timeout: Duration::from_secs(parse_env::<u64>("RUBUY_RATES_TIMEOUT_SECS", "5")?),
        };

        let pricing = pricing_from_env()?;

        let janitor = JanitorConfig {
            interval: Duration::from_secs(parse_env::<u64>("RUBUY_JANITOR_INTERVAL_SECS", "600")?),
            temporary_model_ttl: Duration::from_secs(parse_env::<u64>(
                "RUBUY_TEMPORARY_MODEL_TTL_SECS",
                "3600",
            )?),
        };

        Ok(Self {
            database_url,
            host,
            port,
            rates,
            pricing,
            janitor,
            log_json: get_optional_env("RUBUY_LOG_JSON").is_some(),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env::<f32>("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn pricing_from_env() -> Result<PricingParams, ConfigError> {
    let pricing = PricingParams {
        markup_pct: parse_env::<Decimal>("RUBUY_MARKUP_PCT", "0.03")?,
        min_pct: parse_env::<Decimal>("RUBUY_MARKUP_MIN_PCT", "0")?,
        max_pct: parse_env::<Decimal>("RUBUY_MARKUP_MAX_PCT", "0.15")?,
        fee_cny: parse_env::<Decimal>("RUBUY_FREIGHT_FEE_CNY", "0")?,
        round_digits: parse_env::<u32>("RUBUY_ROUND_DIGITS", "2")?,
    };
    pricing
        .validate()
        .map_err(|e| ConfigError::InvalidEnvVar("RUBUY_MARKUP_*".to_string(), e.to_string()))?;
    Ok(pricing)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
