//! Federate error types.

use lockstep_broker::BrokerError;
use lockstep_core::FederationError;

use crate::config::ConfigError;

/// Errors from federate operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FederateError {
    /// Operation requires a broker connection the federate does not have.
    #[error("federate is not connected to a broker")]
    NotConnected,

    /// `connect` called on a federate that already connected once.
    #[error("federate is already connected")]
    AlreadyConnected,

    /// Operation other than `finalize` on a finalized federate.
    #[error("federate is finalized")]
    Finalized,

    /// Error reported by the broker.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FederateError {
    /// Whether the federate can keep participating after this error.
    ///
    /// Lifecycle misuse and configuration problems are bugs in the caller;
    /// a grant timeout is operational and retryable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NotConnected | Self::AlreadyConnected | Self::Finalized | Self::Config(_) => true,
            Self::Broker(err) => !err.is_retryable(),
        }
    }
}

impl From<FederationError> for FederateError {
    fn from(err: FederationError) -> Self {
        Self::Broker(BrokerError::Federation(err))
    }
}
