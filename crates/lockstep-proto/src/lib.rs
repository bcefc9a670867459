//! Shared vocabulary for the lockstep co-simulation protocol.
//!
//! This crate defines the types every layer speaks: simulation time,
//! identifier newtypes, the core (transport) selector, the published value
//! type, the federate lifecycle phases, and the log-level selector.
//!
//! It contains no I/O and no state machines; those live in `lockstep-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod time;

use serde::{Deserialize, Serialize};
pub use time::SimTime;

/// Identifies a federate within a federation.
///
/// Assigned by the broker at registration, unique for the lifetime of the
/// federation (ids of finalized federates are not reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FederateId(pub u64);

impl std::fmt::Display for FederateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fed-{}", self.0)
    }
}

/// Identifies a registered publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicationId(pub u64);

impl std::fmt::Display for PublicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pub-{}", self.0)
    }
}

/// Identifies a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Errors from parsing vocabulary types out of their string forms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The core type string names a transport this build does not provide.
    #[error("core type {0:?} requires network transport support")]
    UnsupportedCore(String),

    /// The core type string is not recognized at all.
    #[error("unknown core type: {0:?}")]
    UnknownCore(String),

    /// The log level string is not recognized.
    #[error("unknown log level: {0:?}")]
    UnknownLogLevel(String),
}

/// Selects the transport a federation runs over.
///
/// Only the in-process core is implemented; the recognized network core
/// names parse to [`ParseError::UnsupportedCore`] so that a configuration
/// written for a networked deployment fails loudly rather than silently
/// running in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CoreKind {
    /// All federates and the broker share one process.
    #[default]
    InProcess,
}

impl CoreKind {
    /// Canonical string form, matching what [`std::str::FromStr`] accepts.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProcess => "inproc",
        }
    }
}

impl std::str::FromStr for CoreKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inproc" | "inprocess" | "test" => Ok(Self::InProcess),
            "zmq" | "tcp" | "udp" | "ipc" | "mpi" => Err(ParseError::UnsupportedCore(s.to_owned())),
            _ => Err(ParseError::UnknownCore(s.to_owned())),
        }
    }
}

impl TryFrom<String> for CoreKind {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CoreKind> for String {
    fn from(kind: CoreKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl std::fmt::Display for CoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a publication's values.
///
/// Only double-precision reals are exchanged; the enum exists so the
/// declaration surface does not change shape when more types are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// IEEE 754 double-precision real.
    #[default]
    Double,
}

/// Federate lifecycle phase.
///
/// Phases advance strictly left to right; `Finalized` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Handle exists, not yet connected to a broker.
    Created,
    /// Connected and registered with the broker.
    Registered,
    /// Declaring publications and subscriptions.
    Initializing,
    /// Advancing time and exchanging values.
    Executing,
    /// Terminal; resources released.
    Finalized,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Registered => "registered",
            Self::Initializing => "initializing",
            Self::Executing => "executing",
            Self::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Verbosity selector carried in broker and federate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Errors and warnings.
    Warn,
    /// Normal operational logging.
    #[default]
    Info,
    /// Per-operation detail.
    Debug,
    /// Everything, including grant evaluation internals.
    Trace,
}

impl LogLevel {
    /// Canonical lowercase name, usable as a `tracing` filter directive.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(ParseError::UnknownLogLevel(s.to_owned())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, ParseError> {
        s.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_owned()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn core_kind_accepts_in_process_aliases() {
        assert_eq!(CoreKind::from_str("inproc"), Ok(CoreKind::InProcess));
        assert_eq!(CoreKind::from_str("Test"), Ok(CoreKind::InProcess));
    }

    #[test]
    fn core_kind_rejects_network_cores_as_unsupported() {
        assert_eq!(CoreKind::from_str("zmq"), Err(ParseError::UnsupportedCore("zmq".into())));
    }

    #[test]
    fn core_kind_rejects_garbage_as_unknown() {
        assert!(matches!(CoreKind::from_str("quantum"), Err(ParseError::UnknownCore(_))));
    }

    #[test]
    fn log_level_parses_and_displays() {
        assert_eq!(LogLevel::from_str("WARN"), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::Created < Phase::Registered);
        assert!(Phase::Executing < Phase::Finalized);
    }
}
