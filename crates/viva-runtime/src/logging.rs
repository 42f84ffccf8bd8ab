//! Logging setup

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use viva_core::{VivaError, VivaResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for the viva crates, used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// Print the emitting module with each line
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Filter directives applied when `RUST_LOG` is unset
    pub fn directives(&self) -> String {
        format!("viva={}", self.level)
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init(config: &LogConfig) -> VivaResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())
            .map_err(|e| VivaError::Config(format!("log level {:?}: {}", config.level, e)))?,
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.with_target)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(config.with_target)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| VivaError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives() {
        let config = LogConfig {
            level: "debug".into(),
            ..Default::default()
        };
        assert_eq!(config.directives(), "viva=debug");
    }

    #[test]
    fn test_format_from_json() {
        let config: LogConfig = serde_json::from_str(r#"{ "format": "json" }"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig::default();
        // The first call may race with another test in this binary
        let _ = init(&config);
        assert!(matches!(init(&config), Err(VivaError::Config(_))));
    }
}
