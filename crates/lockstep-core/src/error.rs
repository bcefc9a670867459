//! Federation error types.

use lockstep_proto::{FederateId, Phase};

use crate::{coordinator::CoordinatorError, store::StoreError};

/// Errors from federation operations.
///
/// Everything here is local to the calling federate and recoverable; no
/// variant poisons the federation as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FederationError {
    /// A federate tried to register after the executing barrier released.
    #[error("registration closed: federation is already executing")]
    RegistrationClosed,

    /// A federate with this name is already registered.
    #[error("duplicate federate name: {0:?}")]
    DuplicateFederate(String),

    /// A publication with this name is already registered.
    #[error("duplicate publication name: {0:?}")]
    DuplicatePublication(String),

    /// The federate id is not registered in this federation.
    #[error("unknown federate: {0}")]
    UnknownFederate(FederateId),

    /// Structural declaration attempted after the federate left the
    /// initializing phase.
    #[error("late registration: {federate} is already {phase}")]
    LateRegistration {
        /// Federate that attempted the declaration.
        federate: FederateId,
        /// Phase it had already reached.
        phase: Phase,
    },

    /// Strict-references mode: a subscription's target was never registered
    /// by the time the federation entered executing mode.
    #[error("unresolved subscription target: {0:?}")]
    UnresolvedReference(String),

    /// Operation called in the wrong lifecycle phase.
    #[error("{operation} requires the {expected} phase, but {federate} is {actual}")]
    InvalidPhase {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Federate that issued it.
        federate: FederateId,
        /// Phase the operation requires.
        expected: Phase,
        /// Phase the federate is actually in.
        actual: Phase,
    },

    /// A federate used a publication or subscription handle it does not own.
    #[error("{federate} does not own {handle}")]
    NotOwner {
        /// Federate that issued the operation.
        federate: FederateId,
        /// Display form of the foreign handle.
        handle: String,
    },

    /// Time-coordination error.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Value-store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}
