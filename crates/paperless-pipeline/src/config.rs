//! Configuration management
//!
//! All settings come from the process environment, optionally seeded from a
//! `.env` file. Each stage loads only the sections it uses, so a result
//! writer does not need MinIO credentials and an OCR worker does not need a
//! database URL.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Worker Configuration Constants
// ============================================================================

/// Default number of unacknowledged deliveries per consumer.
pub const DEFAULT_PREFETCH: u16 = 1;

/// Default grace period for the in-flight message on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default pause before a transient failure is handed back to the broker.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Read `.env` into the environment if present. Existing variables win.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Read a required variable. Empty or whitespace-only counts as unset.
pub fn require(name: &'static str) -> ConfigResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Read an optional variable, falling back to `default` when unset.
pub fn optional(name: &'static str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parse an optional variable. Unlike a silent fallback, a value that is
/// present but unparseable is reported.
pub fn parse_or<T>(name: &'static str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            })
        },
        _ => Ok(default),
    }
}

/// What a worker does with a delivery whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Nack without requeue on every failure.
    #[default]
    Discard,
    /// Requeue a transient failure once, discard everything else.
    RequeueTransient,
}

impl FromStr for RetryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "requeue-transient" | "requeue_transient" => Ok(Self::RequeueTransient),
            other => Err(format!(
                "unknown retry policy '{}', expected 'discard' or 'requeue-transient'",
                other
            )),
        }
    }
}

/// Consume-loop settings shared by all three workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub prefetch: u16,
    pub shutdown_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_PREFETCH,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            retry_policy: RetryPolicy::Discard,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            prefetch: parse_or("WORKER_PREFETCH", DEFAULT_PREFETCH)?,
            shutdown_timeout: Duration::from_secs(parse_or(
                "WORKER_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?),
            retry_policy: parse_or("WORKER_RETRY_POLICY", RetryPolicy::Discard)?,
            retry_delay: Duration::from_millis(parse_or(
                "WORKER_RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY_MS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.prefetch == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKER_PREFETCH",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_worker_env() {
        for name in [
            "WORKER_PREFETCH",
            "WORKER_SHUTDOWN_TIMEOUT_SECS",
            "WORKER_RETRY_POLICY",
            "WORKER_RETRY_DELAY_MS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_worker_defaults() {
        clear_worker_env();
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.prefetch, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_policy, RetryPolicy::Discard);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
    }

    #[test]
    #[serial]
    fn test_worker_overrides() {
        clear_worker_env();
        std::env::set_var("WORKER_PREFETCH", "4");
        std::env::set_var("WORKER_RETRY_POLICY", "requeue-transient");
        std::env::set_var("WORKER_RETRY_DELAY_MS", "250");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.prefetch, 4);
        assert_eq!(config.retry_policy, RetryPolicy::RequeueTransient);
        assert_eq!(config.retry_delay, Duration::from_millis(250));

        clear_worker_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_value_is_reported() {
        clear_worker_env();
        std::env::set_var("WORKER_PREFETCH", "lots");

        let err = WorkerConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "WORKER_PREFETCH",
                ..
            }
        ));

        clear_worker_env();
    }

    #[test]
    #[serial]
    fn test_zero_prefetch_rejected() {
        clear_worker_env();
        std::env::set_var("WORKER_PREFETCH", "0");
        assert!(WorkerConfig::from_env().is_err());
        clear_worker_env();
    }

    #[test]
    #[serial]
    fn test_require_treats_blank_as_missing() {
        std::env::set_var("PAPERLESS_TEST_REQUIRED", "   ");
        assert!(matches!(
            require("PAPERLESS_TEST_REQUIRED"),
            Err(ConfigError::Missing("PAPERLESS_TEST_REQUIRED"))
        ));
        std::env::set_var("PAPERLESS_TEST_REQUIRED", "value");
        assert_eq!(require("PAPERLESS_TEST_REQUIRED").unwrap(), "value");
        std::env::remove_var("PAPERLESS_TEST_REQUIRED");
    }

    #[test]
    fn test_retry_policy_parse() {
        assert_eq!("discard".parse::<RetryPolicy>().unwrap(), RetryPolicy::Discard);
        assert_eq!(
            "Requeue-Transient".parse::<RetryPolicy>().unwrap(),
            RetryPolicy::RequeueTransient
        );
        assert!("forever".parse::<RetryPolicy>().is_err());
    }
}
