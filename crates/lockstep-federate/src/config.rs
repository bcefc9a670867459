//! Federate configuration.
//!
//! Configuration is plain in-memory data built with the fluent methods, or
//! loaded from a small JSON document:
//!
//! ```json
//! {
//!     "name": "pi-sender",
//!     "core": "inproc",
//!     "period": 0.01,
//!     "input_delay": 0.0,
//!     "log_level": "info"
//! }
//! ```
//!
//! Durations are in seconds. Every field except `name` is optional.

use std::path::Path;

use lockstep_proto::{CoreKind, LogLevel, SimTime};
use serde::{Deserialize, Serialize};

/// Errors from loading a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be read.
    #[error("cannot read config file: {0}")]
    Io(String),

    /// The document could not be parsed.
    #[error("invalid config document: {0}")]
    Parse(String),
}

/// Everything a federate needs to join a federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederateConfig {
    /// Federate name, unique within the federation.
    pub name: String,

    /// Transport selection; must match the broker's.
    #[serde(default)]
    pub core: CoreKind,

    /// Simulated-time offset between a publish and its visibility to this
    /// federate's subscriptions.
    #[serde(default)]
    pub input_delay: SimTime,

    /// Grant quantum: granted times land on multiples of this and always
    /// advance by at least one quantum. Zero disables quantization.
    #[serde(default)]
    pub period: SimTime,

    /// Verbosity for this federate's logging.
    #[serde(default)]
    pub log_level: LogLevel,
}

impl FederateConfig {
    /// Configuration with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core: CoreKind::default(),
            input_delay: SimTime::ZERO,
            period: SimTime::ZERO,
            log_level: LogLevel::default(),
        }
    }

    /// Select the core (transport).
    #[must_use]
    pub fn with_core(mut self, core: CoreKind) -> Self {
        self.core = core;
        self
    }

    /// Set the input delay.
    #[must_use]
    pub fn with_input_delay(mut self, input_delay: SimTime) -> Self {
        self.input_delay = input_delay;
        self
    }

    /// Set the grant period.
    #[must_use]
    pub fn with_period(mut self, period: SimTime) -> Self {
        self.period = period;
        self
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Parse a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed JSON, unknown core/log-level
    /// strings, or negative durations.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// `ConfigError::Io` if the file cannot be read, `ConfigError::Parse`
    /// for document errors.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let document =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_builder() {
        let built = FederateConfig::new("battery");
        assert_eq!(built.core, CoreKind::InProcess);
        assert_eq!(built.period, SimTime::ZERO);
        assert_eq!(built.log_level, LogLevel::Info);
    }

    #[test]
    fn json_document_matches_the_builder() {
        let document = r#"{
            "name": "pi-sender",
            "core": "inproc",
            "period": 0.01,
            "log_level": "debug"
        }"#;
        let parsed = FederateConfig::from_json_str(document).expect("parse failed");
        let built = FederateConfig::new("pi-sender")
            .with_core(CoreKind::InProcess)
            .with_period(SimTime::from_seconds(0.01))
            .with_log_level(LogLevel::Debug);
        assert_eq!(parsed, built);
    }

    #[test]
    fn unsupported_core_fails_to_parse() {
        let document = r#"{ "name": "sender", "core": "zmq" }"#;
        let err = FederateConfig::from_json_str(document);
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn negative_duration_fails_to_parse() {
        let document = r#"{ "name": "sender", "period": -1.0 }"#;
        assert!(FederateConfig::from_json_str(document).is_err());
    }

    #[test]
    fn missing_name_fails_to_parse() {
        assert!(FederateConfig::from_json_str("{}").is_err());
    }

    #[test]
    fn config_loads_from_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sender.json");
        std::fs::write(&path, r#"{ "name": "pi-sender", "input_delay": 0.01 }"#)
            .expect("write config");

        let config = FederateConfig::from_json_file(&path).expect("load config");
        assert_eq!(config.name, "pi-sender");
        assert_eq!(config.input_delay, SimTime::from_seconds(0.01));

        let missing = FederateConfig::from_json_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
