//! Configuration loading.
//!
//! Layering, lowest to highest precedence: built-in defaults, an optional
//! TOML file, then environment variables.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables recognised by the loader.
pub mod env {
    pub const PORT: &str = "PORT";
    pub const HOST: &str = "HOST";
    pub const JSON_LIMIT: &str = "JSON_LIMIT";
    pub const URL_LIMIT: &str = "URL_LIMIT";
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
    pub const KEEP_ALIVE_TIMEOUT: &str = "KEEP_ALIVE_TIMEOUT";
    pub const HEADERS_TIMEOUT: &str = "HEADERS_TIMEOUT";
    pub const SHUTDOWN_GRACE_PERIOD: &str = "SHUTDOWN_GRACE_PERIOD";
    pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
    pub const COMPRESSION_THRESHOLD: &str = "COMPRESSION_THRESHOLD";
    pub const NODE_ENV: &str = "NODE_ENV";
    pub const EXIT_ON_UNCAUGHT: &str = "EXIT_ON_UNCAUGHT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const METRICS_ADDR: &str = "METRICS_ADDR";
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value `{value}` for {name}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional file and the process environment.
pub fn load(file: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    load_with(file, |name| std::env::var(name).ok())
}

/// Load configuration using `lookup` in place of the process environment.
pub fn load_with<F>(file: Option<&Path>, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match file {
        Some(path) => load_file(path)?,
        None => GatewayConfig::default(),
    };

    apply_env(&mut config, &lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML configuration file without applying the environment.
pub fn load_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env<F>(config: &mut GatewayConfig, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(value) = var(env::PORT) {
        config.listener.port = parse(env::PORT, &value)?;
    }
    if let Some(value) = var(env::HOST) {
        config.listener.host = value.trim().to_string();
    }
    if let Some(value) = var(env::MAX_CONNECTIONS) {
        config.listener.max_connections = parse(env::MAX_CONNECTIONS, &value)?;
    }
    if let Some(value) = var(env::JSON_LIMIT) {
        config.limits.json = parse(env::JSON_LIMIT, &value)?;
    }
    if let Some(value) = var(env::URL_LIMIT) {
        config.limits.url = parse(env::URL_LIMIT, &value)?;
    }
    if let Some(value) = var(env::REQUEST_TIMEOUT) {
        config.timeouts.request_ms = parse(env::REQUEST_TIMEOUT, &value)?;
    }
    if let Some(value) = var(env::KEEP_ALIVE_TIMEOUT) {
        config.timeouts.keep_alive_ms = parse(env::KEEP_ALIVE_TIMEOUT, &value)?;
    }
    if let Some(value) = var(env::HEADERS_TIMEOUT) {
        config.timeouts.headers_ms = parse(env::HEADERS_TIMEOUT, &value)?;
    }
    if let Some(value) = var(env::SHUTDOWN_GRACE_PERIOD) {
        config.timeouts.shutdown_grace_ms = parse(env::SHUTDOWN_GRACE_PERIOD, &value)?;
    }
    if let Some(value) = var(env::COMPRESSION_THRESHOLD) {
        config.compression.threshold = parse(env::COMPRESSION_THRESHOLD, &value)?;
    }
    if let Some(value) = var(env::NODE_ENV) {
        config.environment = value.trim().to_string();
    }
    if let Some(value) = var(env::EXIT_ON_UNCAUGHT) {
        config.exit_on_uncaught = Some(parse_bool(env::EXIT_ON_UNCAUGHT, &value)?);
    }
    if let Some(value) = var(env::LOG_LEVEL) {
        config.observability.log_level = value.trim().to_string();
    }
    if let Some(value) = var(env::METRICS_ADDR) {
        config.observability.metrics_address = Some(value.trim().to_string());
    }

    Ok(())
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidVar {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = load_with(None, lookup(&[])).unwrap();
        assert_eq!(config.listener.port, 3001);
        assert_eq!(config.limits.json.as_str(), "50mb");
        assert_eq!(config.limits.url.as_u64(), 50 * 1024 * 1024);
        assert_eq!(config.timeouts.request_ms, 300_000);
        assert_eq!(config.timeouts.keep_alive_ms, 30_000);
        assert_eq!(config.timeouts.headers_ms, 31_000);
        assert_eq!(config.compression.threshold, 1024);
        assert!(!config.is_production());
        assert!(!config.exits_on_uncaught());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = load_with(
            None,
            lookup(&[
                ("PORT", "8080"),
                ("JSON_LIMIT", "10mb"),
                ("URL_LIMIT", "1mb"),
                ("REQUEST_TIMEOUT", "100"),
                ("NODE_ENV", "production"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.limits.json.as_u64(), 10 * 1024 * 1024);
        assert_eq!(config.limits.url.as_str(), "1mb");
        assert_eq!(config.timeouts.request_ms, 100);
        assert!(config.is_production());
        assert!(config.exits_on_uncaught());
    }

    #[test]
    fn uncaught_policy_can_be_overridden() {
        let config = load_with(
            None,
            lookup(&[("NODE_ENV", "production"), ("EXIT_ON_UNCAUGHT", "false")]),
        )
        .unwrap();
        assert!(config.is_production());
        assert!(!config.exits_on_uncaught());
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = load_with(None, lookup(&[("PORT", "  ")])).unwrap();
        assert_eq!(config.listener.port, 3001);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = load_with(None, lookup(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { name: "PORT", .. }));

        let err = load_with(None, lookup(&[("JSON_LIMIT", "50 parsecs")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { name: "JSON_LIMIT", .. }));
    }

    #[test]
    fn validation_runs_after_environment() {
        let err = load_with(None, lookup(&[("REQUEST_TIMEOUT", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            environment = "staging"

            [limits]
            json = "5mb"

            [timeouts]
            request_ms = 2500
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.json.as_str(), "5mb");
        assert_eq!(config.limits.url.as_str(), "50mb");
        assert_eq!(config.timeouts.request_ms, 2500);
        assert_eq!(config.timeouts.keep_alive_ms, 30_000);
        assert_eq!(config.listener.port, 3001);
        assert!(!config.is_production());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_file(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
