//! avatar-sessions - account and avatar session-lifecycle engine.
//!
//! Authenticates connecting clients, owns the small account record (six avatar
//! slots, deletion history, estate link) and mediates every state-changing
//! request a client makes against that account. Each request runs as an
//! [`ops::Operation`] driven by asynchronous replies from the [`store`] and
//! the [`fabric`] router; the [`dispatcher::SessionDispatcher`] guarantees at
//! most one live operation per connection and per account.

pub mod config;
pub mod dispatcher;
pub mod dna;
pub mod error;
pub mod fabric;
pub mod ids;
pub mod metrics;
pub mod namedb;
pub mod naming;
pub mod ops;
pub mod protocol;
pub mod records;
pub mod sessions;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use dispatcher::{Dispatch, DispatcherError, DispatcherParams, SessionDispatcher};
pub use error::{OperationError, RouterError};
pub use ids::{Channel, ObjectId};
pub use ops::Outcome;
