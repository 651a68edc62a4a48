//! Room service configuration.
//!
//! Configuration is loaded from environment variables. The database URL and
//! the token signing secret are redacted in Debug output.

use crate::services::CoordinatorSettings;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default extra attempts after a lost optimistic-concurrency race.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Default extra attempts after a room code collision.
pub const DEFAULT_CODE_RETRIES: u32 = 3;

/// Upper bound for both retry settings.
pub const MAX_RETRIES: u32 = 10;

/// Default per-operation deadline in milliseconds.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5000;

/// Default database pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_SHUTDOWN_DRAIN_SECONDS: u64 = 30;

/// Room service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// HS256 secret shared with the identity service.
    pub auth_token_secret: SecretString,

    /// JWT clock skew tolerance in seconds.
    pub jwt_clock_skew_seconds: u64,

    /// Extra attempts after a lost optimistic-concurrency race.
    pub conflict_retries: u32,

    /// Extra attempts after a room code collision.
    pub code_retries: u32,

    /// Per-operation deadline in milliseconds.
    pub operation_timeout_ms: u64,

    /// Maximum database pool connections.
    pub db_max_connections: u32,

    /// Seconds to keep serving in-flight requests after a shutdown signal.
    pub shutdown_drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("auth_token_secret", &"[REDACTED]")
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("conflict_retries", &self.conflict_retries)
            .field("code_retries", &self.code_retries)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("db_max_connections", &self.db_max_connections)
            .field("shutdown_drain_seconds", &self.shutdown_drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

/// Parse an optional numeric variable and check it lies in `min..=max`.
fn bounded<T>(
    vars: &HashMap<String, String>,
    var: &str,
    default: T,
    min: T,
    max: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display + Copy,
    T::Err: fmt::Display,
{
    let Some(raw) = vars.get(var) else {
        return Ok(default);
    };

    let value: T = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: format!("expected an integer, got '{raw}': {e}"),
    })?;

    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: format!("must be between {min} and {max}, got {value}"),
        });
    }

    Ok(value)
}

fn required(vars: &HashMap<String, String>, var: &str) -> Result<String, ConfigError> {
    vars.get(var)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;
        let auth_token_secret = SecretString::from(required(vars, "AUTH_TOKEN_SECRET")?);

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwt_clock_skew_seconds = bounded(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            1,
            MAX_CLOCK_SKEW.as_secs(),
        )?;

        let conflict_retries = bounded(
            vars,
            "ROOM_CONFLICT_RETRIES",
            DEFAULT_CONFLICT_RETRIES,
            1,
            MAX_RETRIES,
        )?;

        let code_retries = bounded(
            vars,
            "ROOM_CODE_RETRIES",
            DEFAULT_CODE_RETRIES,
            1,
            MAX_RETRIES,
        )?;

        let operation_timeout_ms = bounded(
            vars,
            "OPERATION_TIMEOUT_MS",
            DEFAULT_OPERATION_TIMEOUT_MS,
            1,
            600_000,
        )?;

        let db_max_connections = bounded(
            vars,
            "DB_MAX_CONNECTIONS",
            DEFAULT_DB_MAX_CONNECTIONS,
            1,
            1000,
        )?;

        let shutdown_drain_seconds = bounded(
            vars,
            "SHUTDOWN_DRAIN_SECONDS",
            DEFAULT_SHUTDOWN_DRAIN_SECONDS,
            0,
            300,
        )?;

        Ok(Config {
            database_url,
            bind_address,
            auth_token_secret,
            jwt_clock_skew_seconds,
            conflict_retries,
            code_retries,
            operation_timeout_ms,
            db_max_connections,
            shutdown_drain_seconds,
        })
    }

    pub fn jwt_clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds)
    }

    /// Coordinator tunables derived from this configuration.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            conflict_retries: self.conflict_retries,
            code_retries: self.code_retries,
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://huddle:pw@localhost/huddle".to_string(),
            ),
            (
                "AUTH_TOKEN_SECRET".to_string(),
                "shared-signing-secret".to_string(),
            ),
        ])
    }

    fn with(key: &str, value: &str) -> HashMap<String, String> {
        let mut vars = base_vars();
        vars.insert(key.to_string(), value.to_string());
        vars
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.jwt_clock_skew_seconds, 300);
        assert_eq!(config.conflict_retries, DEFAULT_CONFLICT_RETRIES);
        assert_eq!(config.code_retries, DEFAULT_CODE_RETRIES);
        assert_eq!(config.operation_timeout_ms, DEFAULT_OPERATION_TIMEOUT_MS);
        assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(config.shutdown_drain_seconds, DEFAULT_SHUTDOWN_DRAIN_SECONDS);
        assert_eq!(
            config.auth_token_secret.expose_secret(),
            "shared-signing-secret"
        );
    }

    #[test]
    fn test_missing_required_vars() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(var)) if var == "DATABASE_URL"
        ));

        let mut vars = base_vars();
        vars.remove("AUTH_TOKEN_SECRET");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(var)) if var == "AUTH_TOKEN_SECRET"
        ));

        assert!(matches!(
            Config::from_vars(&with("AUTH_TOKEN_SECRET", "")),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("ROOM_CONFLICT_RETRIES".to_string(), "5".to_string());
        vars.insert("OPERATION_TIMEOUT_MS".to_string(), "250".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");

        let settings = config.coordinator_settings();
        assert_eq!(settings.conflict_retries, 5);
        assert_eq!(settings.code_retries, DEFAULT_CODE_RETRIES);
        assert_eq!(settings.operation_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_clock_skew_bounds() {
        assert!(Config::from_vars(&with("JWT_CLOCK_SKEW_SECONDS", "600")).is_ok());
        assert!(matches!(
            Config::from_vars(&with("JWT_CLOCK_SKEW_SECONDS", "601")),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_vars(&with("JWT_CLOCK_SKEW_SECONDS", "0")),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_vars(&with("JWT_CLOCK_SKEW_SECONDS", "-5")),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_retry_bounds() {
        assert!(Config::from_vars(&with("ROOM_CONFLICT_RETRIES", "10")).is_ok());
        assert!(Config::from_vars(&with("ROOM_CONFLICT_RETRIES", "11")).is_err());
        assert!(Config::from_vars(&with("ROOM_CODE_RETRIES", "0")).is_err());
        assert!(Config::from_vars(&with("ROOM_CODE_RETRIES", "three")).is_err());
    }

    #[test]
    fn test_error_names_the_variable() {
        let err = Config::from_vars(&with("DB_MAX_CONNECTIONS", "lots")).unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("huddle:pw"));
        assert!(!debug.contains("shared-signing-secret"));
    }
}
