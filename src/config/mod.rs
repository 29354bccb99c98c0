pub mod validation;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;
use crate::error::StreamError;
use crate::stream::parser::Framing;
use crate::stream::writer::{error_message_handler, OnError, DEFAULT_ERROR_MESSAGE};
use crate::util::{IdGenerator, RandomIdGenerator, DEFAULT_ID_SIZE};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for StreamError {
    fn from(err: ConfigError) -> Self {
        StreamError::Config(err.to_string())
    }
}

/// Parser settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub framing: Framing,
}

/// Writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Text of the `error` part written when a producer fails.
    #[serde(default = "default_error_message")]
    pub error_message: String,
}

fn default_error_message() -> String {
    DEFAULT_ERROR_MESSAGE.to_string()
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            error_message: default_error_message(),
        }
    }
}

impl WriterConfig {
    #[must_use]
    pub fn on_error(&self) -> OnError {
        error_message_handler(self.error_message.clone())
    }
}

/// Default id generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default = "default_id_size")]
    pub size: usize,
}

fn default_id_size() -> usize {
    DEFAULT_ID_SIZE
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            size: default_id_size(),
        }
    }
}

impl IdConfig {
    #[must_use]
    pub fn id_generator(&self) -> Arc<dyn IdGenerator> {
        Arc::new(RandomIdGenerator::new(self.prefix.clone(), self.size))
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit one JSON object per log line instead of human-readable text.
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Top-level application configuration. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub ids: IdConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Same as [`load_config`], minus the I/O failure.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.stream.framing, Framing::Sse);
        assert_eq!(config.writer.error_message, DEFAULT_ERROR_MESSAGE);
        assert_eq!(config.ids.prefix.as_deref(), Some("msg"));
        assert_eq!(config.ids.size, 16);
        assert_eq!(config.features.log_level, "INFO");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.stream.framing, Framing::Sse);
        assert_eq!(config.ids.size, DEFAULT_ID_SIZE);
        assert!(config.ids.prefix.is_none());
        assert!(!config.features.log_json);
    }

    #[test]
    fn test_legacy_framing_and_custom_error_message() {
        let config = parse_config(
            "stream:\n  framing: legacy\nwriter:\n  error_message: try again\n",
        )
        .unwrap();
        assert_eq!(config.stream.framing, Framing::Legacy);
        let on_error = config.writer.on_error();
        assert_eq!(on_error(&StreamError::Execute("x".to_string())), "try again");
    }

    #[test]
    fn test_id_generator_honors_prefix_and_size() {
        let config = parse_config("ids:\n  prefix: msg\n  size: 8\n").unwrap();
        let id = config.ids.id_generator().generate();
        assert!(id.starts_with("msg-"));
        assert_eq!(id.len(), 12);
    }

    #[test]
    fn test_unknown_framing_is_rejected() {
        let err = parse_config("stream:\n  framing: websocket\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_config_error_converts_to_stream_error() {
        let err: StreamError = ConfigError::Validation("bad".to_string()).into();
        assert_eq!(err.to_string(), "Config error: Config validation error: bad");
    }
}
