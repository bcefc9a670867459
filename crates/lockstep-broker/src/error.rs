//! Broker error types.

use lockstep_core::FederationError;
use lockstep_proto::{FederateId, SimTime};

/// Errors from broker operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The expected federate count was not reached within the bounded wait.
    #[error("broker startup failed: {connected} of {expected} federates connected in time")]
    Startup {
        /// Declared federation size.
        expected: usize,
        /// Federates actually registered when the wait expired.
        connected: usize,
    },

    /// An optional `request_time` timeout expired before the grant rule was
    /// satisfied.
    #[error("time grant for {federate} timed out (requested {requested})")]
    GrantTimeout {
        /// Federate whose request is still pending.
        federate: FederateId,
        /// The time it asked for.
        requested: SimTime,
    },

    /// The broker was dropped while a federate was parked on it.
    #[error("broker shut down while waiting")]
    Closed,

    /// A federation state-machine error, unchanged.
    #[error(transparent)]
    Federation(#[from] FederationError),
}

impl BrokerError {
    /// Whether the caller can retry the failed operation as-is.
    ///
    /// A timed-out grant stays pending broker-side; re-requesting the same
    /// time re-parks the federate without disturbing anyone's frontier.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GrantTimeout { .. })
    }
}
