//! Roomcast session layer.
//!
//! Transport-agnostic building blocks shared by the server and future
//! clients:
//!
//! - [`env::Environment`]: abstraction over time, randomness, and the wall
//!   clock, so protocol logic runs identically under real resources and
//!   deterministic test doubles
//! - [`connection::Connection`]: the per-connection session state machine
//!   (handshake, heartbeats, timeouts, graceful shutdown), written in the
//!   action pattern: methods take the current time and return actions for a
//!   driver to execute, never performing I/O themselves

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
