//! Error types for the roomcast session layer.
//!
//! Strongly-typed errors for connection state machine operations. We avoid
//! `std::io::Error` for protocol logic to keep failures matchable and
//! recoverable at the layer that caused them.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: String,
    },

    /// Received unexpected frame for current state
    #[error("unexpected frame: received opcode {opcode:#06x} in state {state:?}")]
    UnexpectedFrame {
        /// Current state when the frame was received
        state: ConnectionState,
        /// Opcode of the unexpected frame
        opcode: u16,
    },

    /// Unsupported protocol version in a Hello frame
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload type does not match the frame opcode
    #[error("invalid payload: expected {expected} for opcode {opcode:#06x}")]
    InvalidPayload {
        /// Expected payload type
        expected: &'static str,
        /// Opcode that was received
        opcode: u16,
    },

    /// Frame encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(#[from] roomcast_proto::ProtocolError),

    /// Protocol invariant violated
    #[error("protocol error: {0}")]
    Protocol(String),
}
