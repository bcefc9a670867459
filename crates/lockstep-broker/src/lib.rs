//! Lockstep broker runtime.
//!
//! This crate turns the pure federation state machine from `lockstep-core`
//! into the live rendezvous object federates connect to:
//!
//! ```text
//! lockstep-broker
//!   ├─ Broker        (async mutex + parked-waiter channels)
//!   ├─ BrokerConfig  (core selection, federation size, strictness)
//!   └─ SystemEnv     (production Environment impl)
//! ```
//!
//! The broker serializes `request_time`/`finalize` — the protocol's one true
//! concurrency-control point — behind a single lock, and suspends callers on
//! oneshot channels instead of polling. Actions emitted by the state machine
//! are executed before the lock is released.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod error;
mod system_env;

pub use broker::{Broker, BrokerConfig};
pub use error::BrokerError;
pub use system_env::SystemEnv;
