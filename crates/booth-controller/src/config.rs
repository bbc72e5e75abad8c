//! Booth Controller configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP API bind address.
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default voucher redemption window in days.
pub const DEFAULT_VOUCHER_TTL_DAYS: i64 = 14;

/// Default grace added to the reservation TTL beyond the seeded duration.
///
/// Bounds how long a crashed process can strand a voucher; the session
/// clock normally releases the reservation well before this fires.
pub const DEFAULT_RESERVATION_GRACE_SECONDS: u64 = 60;

/// Default initial backoff for expiry-write retries.
pub const DEFAULT_EXPIRY_RETRY_INITIAL_MS: u64 = 250;

/// Default maximum backoff for expiry-write retries.
pub const DEFAULT_EXPIRY_RETRY_MAX_MS: u64 = 10_000;

/// Default booth instance ID prefix.
pub const DEFAULT_BOOTH_ID_PREFIX: &str = "booth";

/// Booth Controller configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL for the durable store. When absent the service
    /// runs on the in-memory store (single-process dev mode only).
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: Option<SecretString>,

    /// HTTP API bind address (default: "0.0.0.0:8080").
    pub http_bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this booth controller instance.
    pub booth_id: String,

    /// Voucher redemption window in days (default: 14).
    pub voucher_ttl_days: i64,

    /// Grace added to the exclusivity reservation TTL in seconds (default: 60).
    pub reservation_grace_seconds: u64,

    /// Initial backoff for expiry-write retries in milliseconds (default: 250).
    pub expiry_retry_initial_ms: u64,

    /// Maximum backoff for expiry-write retries in milliseconds (default: 10000).
    pub expiry_retry_max_ms: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("http_bind_address", &self.http_bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("booth_id", &self.booth_id)
            .field("voucher_ttl_days", &self.voucher_ttl_days)
            .field("reservation_grace_seconds", &self.reservation_grace_seconds)
            .field("expiry_retry_initial_ms", &self.expiry_retry_initial_ms)
            .field("expiry_retry_max_ms", &self.expiry_retry_max_ms)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = vars
            .get("REDIS_URL")
            .map(|url| SecretString::from(url.clone()));

        let http_bind_address = vars
            .get("BOOTH_HTTP_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HTTP_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("BOOTH_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let voucher_ttl_days = vars
            .get("BOOTH_VOUCHER_TTL_DAYS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_VOUCHER_TTL_DAYS);
        if voucher_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "BOOTH_VOUCHER_TTL_DAYS must be positive".to_string(),
            ));
        }

        let reservation_grace_seconds = vars
            .get("BOOTH_RESERVATION_GRACE_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RESERVATION_GRACE_SECONDS);

        let expiry_retry_initial_ms = vars
            .get("BOOTH_EXPIRY_RETRY_INITIAL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EXPIRY_RETRY_INITIAL_MS);

        let expiry_retry_max_ms = vars
            .get("BOOTH_EXPIRY_RETRY_MAX_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EXPIRY_RETRY_MAX_MS);

        if expiry_retry_initial_ms == 0 || expiry_retry_max_ms < expiry_retry_initial_ms {
            return Err(ConfigError::InvalidValue(
                "expiry retry backoff bounds are inconsistent".to_string(),
            ));
        }

        // Generate booth instance ID
        let booth_id = vars.get("BOOTH_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_BOOTH_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            redis_url,
            http_bind_address,
            health_bind_address,
            booth_id,
            voucher_ttl_days,
            reservation_grace_seconds,
            expiry_retry_initial_ms,
            expiry_retry_max_ms,
        })
    }
}
