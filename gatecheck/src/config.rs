//! Configuration for the validation engine, matcher, scanner and store.
//!
//! Every section has defaults matching the behavior field scanners were
//! tuned for. [`GateConfig::from_env`] overlays `GATECHECK_*` environment
//! variables and validates the result.
//!
//! # Example
//!
//! ```no_run
//! use gatecheck::config::GateConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GateConfig::from_env()?;
//! println!("Match threshold: {}", config.biometric.match_threshold);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable holds an unparseable value
    #[error("Failed to parse {var}: {value:?}")]
    ParseError {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Validation engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Default scan location recorded in validation records
    pub location: String,
    /// Reject secure tickets scanned without a comparison image
    pub require_face_for_secure: bool,
}

impl ValidationConfig {
    /// Set the default location
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Require a face photo for every secure ticket
    #[must_use]
    pub const fn with_require_face_for_secure(mut self, require: bool) -> Self {
        self.require_face_for_secure = require;
        self
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            location: "Event Entrance".to_string(),
            require_face_for_secure: false,
        }
    }
}

/// Face enrollment and matching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricConfig {
    /// Minimum detector confidence (0.0-1.0)
    pub min_confidence: f32,
    /// Similarity at or above which two faces match (0.0-1.0)
    pub match_threshold: f64,
    /// Minimum face side relative to the image's short side (0.0-1.0)
    pub min_face_fraction: f32,
    /// Maximum distance of the face center from the image center, as a
    /// fraction of the image dimension (0.0-0.5)
    pub max_center_offset: f32,
    /// Frames to try in `capture_and_enroll` before giving up
    pub capture_attempts: u32,
}

impl BiometricConfig {
    /// Set the match threshold
    #[must_use]
    pub const fn with_match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    /// Set the minimum detector confidence
    #[must_use]
    pub const fn with_min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = confidence;
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any threshold is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::ValidationError(
                "min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::ValidationError(
                "match_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_face_fraction) {
            return Err(ConfigError::ValidationError(
                "min_face_fraction must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=0.5).contains(&self.max_center_offset) {
            return Err(ConfigError::ValidationError(
                "max_center_offset must be between 0.0 and 0.5".to_string(),
            ));
        }
        if self.capture_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "capture_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BiometricConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            match_threshold: 0.6,
            min_face_fraction: 0.2,
            max_center_offset: 0.25,
            capture_attempts: 10,
        }
    }
}

/// Scanner session timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Delay between capture polls in milliseconds
    pub poll_interval_ms: u64,
    /// Seconds without a decodable code before a scan is abandoned
    pub session_timeout_secs: u64,
}

impl ScannerConfig {
    /// Set the poll interval
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the session timeout
    #[must_use]
    pub const fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_secs = timeout.as_secs();
        self
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get session timeout as Duration
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if an interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.session_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            session_timeout_secs: 30,
        }
    }
}

/// Ticket store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL; `None` selects the in-memory store
    pub redis_url: Option<String>,
    /// Namespace prefix for Redis keys
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "gatecheck".to_string(),
        }
    }
}

/// Complete gate configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Validation engine
    pub validation: ValidationConfig,
    /// Face matching
    pub biometric: BiometricConfig,
    /// Scanner session
    pub scanner: ScannerConfig,
    /// Ticket store
    pub store: StoreConfig,
}

impl GateConfig {
    /// Load configuration from `GATECHECK_*` environment variables
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            validation: ValidationConfig {
                location: std::env::var("GATECHECK_LOCATION")
                    .unwrap_or(defaults.validation.location),
                require_face_for_secure: env_or(
                    "GATECHECK_REQUIRE_FACE_FOR_SECURE",
                    defaults.validation.require_face_for_secure,
                )?,
            },
            biometric: BiometricConfig {
                min_confidence: env_or(
                    "GATECHECK_MIN_FACE_CONFIDENCE",
                    defaults.biometric.min_confidence,
                )?,
                match_threshold: env_or(
                    "GATECHECK_MATCH_THRESHOLD",
                    defaults.biometric.match_threshold,
                )?,
                min_face_fraction: env_or(
                    "GATECHECK_MIN_FACE_FRACTION",
                    defaults.biometric.min_face_fraction,
                )?,
                max_center_offset: env_or(
                    "GATECHECK_MAX_CENTER_OFFSET",
                    defaults.biometric.max_center_offset,
                )?,
                capture_attempts: defaults.biometric.capture_attempts,
            },
            scanner: ScannerConfig {
                poll_interval_ms: env_or(
                    "GATECHECK_POLL_INTERVAL_MS",
                    defaults.scanner.poll_interval_ms,
                )?,
                session_timeout_secs: env_or(
                    "GATECHECK_SESSION_TIMEOUT_SECS",
                    defaults.scanner.session_timeout_secs,
                )?,
            },
            store: StoreConfig {
                redis_url: std::env::var("REDIS_URL").ok(),
                key_prefix: std::env::var("GATECHECK_REDIS_PREFIX")
                    .unwrap_or(defaults.store.key_prefix),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate entire configuration
    ///
    /// # Errors
    ///
    /// Returns error if any configuration section is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.biometric.validate()?;
        self.scanner.validate()?;
        if self.store.key_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "key_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::ParseError { var, value }),
        Err(_) => Ok(default),
    }
}
