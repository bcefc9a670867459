//! Federate-side API for the lockstep co-simulation protocol.
//!
//! A federate is created from a [`FederateConfig`] (built in memory or
//! loaded from JSON), connected to a [`Broker`](lockstep_broker::Broker),
//! and driven through its lifecycle:
//!
//! ```text
//! created ──connect──▶ registered ──enter_initializing──▶ initializing
//!     ──enter_executing──▶ executing ──finalize──▶ finalized
//! ```
//!
//! In the executing phase the federate loops: `request_time`, then read
//! updated subscriptions and publish new values at the granted time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod federate;

pub use config::{ConfigError, FederateConfig};
pub use error::FederateError;
pub use federate::{Federate, PubHandle, SubHandle};
