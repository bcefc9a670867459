//! Sans-IO coordination state machines for the lockstep protocol.
//!
//! Everything in this crate is pure state: mutating operations return action
//! values describing which federates to wake, and the broker runtime
//! executes them. No clocks are read, no tasks are spawned, nothing blocks —
//! which is what makes the grant rule testable without a runtime.
//!
//! ## Architecture
//!
//! ```text
//! lockstep-core
//!   ├─ Federation    (registry, lifecycle phases, executing barrier)
//!   ├─ Coordinator   (time-granting rule over request frontiers)
//!   ├─ ValueStore    (per-subscription delivery slots)
//!   └─ Environment   (wall-clock abstraction for the runtime's waits)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coordinator;
pub mod env;
mod error;
mod federation;
pub mod store;

pub use coordinator::{Coordinator, CoordinatorError, Grant};
pub use env::Environment;
pub use error::FederationError;
pub use federation::{Federation, FederationAction};
pub use store::{StoreError, ValueStore};
