use chrono::TimeDelta;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

/// Thresholds driving the per-device tracking engine.
///
/// Angles are in degrees, durations in seconds. `Default` carries the values
/// used when the corresponding environment variable is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    /// Silence (or stall) longer than this drives a device to `Detenido`
    /// and abandons its open vuelta.
    pub idle_timeout_seconds: i64,
    /// Minimum angular delta between samples that counts as movement.
    pub movement_threshold_deg: f64,
    /// Deltas at or below this count as "angle unchanged".
    pub pause_tolerance_deg: f64,
    /// Consecutive unchanged samples before `Regando -> Pausado`.
    pub pause_samples: u32,
    /// Backward deltas up to this are sensor noise: progress is held.
    pub reversal_noise_deg: f64,
    /// A vuelta completes once travel reaches `360 - completion_tolerance_deg`.
    pub completion_tolerance_deg: f64,
    /// Minimum dwell for a sector to count as fully irrigated.
    pub min_dwell_seconds: f64,
    /// Reported pressure below this means the device is not irrigating.
    pub min_active_pressure_psi: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 900,
            movement_threshold_deg: 0.5,
            pause_tolerance_deg: 0.2,
            pause_samples: 3,
            reversal_noise_deg: 2.0,
            completion_tolerance_deg: 2.0,
            min_dwell_seconds: 60.0,
            min_active_pressure_psi: 1.0,
        }
    }
}

impl TrackingConfig {
    /// Idle timeout as a duration; saturates instead of overflowing.
    #[must_use]
    pub fn idle_timeout(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.idle_timeout_seconds).unwrap_or(TimeDelta::MAX)
    }

    /// Reject thresholds the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let idle_ok = TimeDelta::try_seconds(self.idle_timeout_seconds)
            .is_some_and(|d| d > TimeDelta::zero());
        if !idle_ok {
            return Err(ConfigError::Invalid {
                key: "IDLE_TIMEOUT_SECONDS",
                value: self.idle_timeout_seconds.to_string(),
            });
        }
        Ok(())
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let tracking = Self {
            idle_timeout_seconds: env_or("IDLE_TIMEOUT_SECONDS", defaults.idle_timeout_seconds),
            movement_threshold_deg: env_or("MOVEMENT_THRESHOLD_DEG", defaults.movement_threshold_deg),
            pause_tolerance_deg: env_or("PAUSE_TOLERANCE_DEG", defaults.pause_tolerance_deg),
            pause_samples: env_or("PAUSE_SAMPLES", defaults.pause_samples),
            reversal_noise_deg: env_or("REVERSAL_NOISE_DEG", defaults.reversal_noise_deg),
            completion_tolerance_deg: env_or(
                "COMPLETION_TOLERANCE_DEG",
                defaults.completion_tolerance_deg,
            ),
            min_dwell_seconds: env_or("MIN_DWELL_SECONDS", defaults.min_dwell_seconds),
            min_active_pressure_psi: env_or(
                "MIN_ACTIVE_PRESSURE_PSI",
                defaults.min_active_pressure_psi,
            ),
        };
        tracking.validate()?;
        Ok(tracking)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Ingestion
    pub sweep_interval_seconds: u64,
    pub persist_retry_max: u32,
    pub persist_retry_delay_ms: u64,

    // API settings
    pub api_host: String,
    pub api_port: u16,

    // Rate limiting
    pub disable_rate_limiting: bool,
    pub rate_limit_telemetry_per_second: u64,
    pub rate_limit_telemetry_burst: u32,
    pub rate_limit_query_per_second: u64,
    pub rate_limit_query_burst: u32,

    // Caching
    pub cache_ttl_seconds: u64,
    pub cache_max_bytes: u64,

    // Engine thresholds
    pub tracking: TrackingConfig,

    // Application metadata
    pub deployment: Deployment,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set,
    /// `ConfigError::Invalid` if a tracking threshold is unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Ingestion
            sweep_interval_seconds: env_or("SWEEP_INTERVAL_SECONDS", 30),
            persist_retry_max: env_or("PERSIST_RETRY_MAX", 3),
            persist_retry_delay_ms: env_or("PERSIST_RETRY_DELAY_MS", 200),

            // API settings
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env_or("API_PORT", 3000),

            // Rate limiting
            disable_rate_limiting: env_or("DISABLE_RATE_LIMITING", false),
            rate_limit_telemetry_per_second: env_or("RATE_LIMIT_TELEMETRY_PER_SECOND", 20),
            rate_limit_telemetry_burst: env_or("RATE_LIMIT_TELEMETRY_BURST", 200),
            rate_limit_query_per_second: env_or("RATE_LIMIT_QUERY_PER_SECOND", 5),
            rate_limit_query_burst: env_or("RATE_LIMIT_QUERY_BURST", 60),

            // Caching
            cache_ttl_seconds: env_or("CACHE_TTL_SECONDS", 300), // 5 minutes default
            cache_max_bytes: env_or("CACHE_MAX_BYTES", 67_108_864), // 64MB default

            tracking: TrackingConfig::from_env()?,

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        })
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Read an environment variable, falling back to `default` when it is unset
/// or does not parse.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
