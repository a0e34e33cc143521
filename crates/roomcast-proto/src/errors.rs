//! Protocol error types.
//!
//! Every decoding failure maps to a specific variant so callers can tell
//! structural violations (bad magic, truncation) apart from payload-level
//! failures (malformed CBOR). Encoding can only fail on oversized payloads
//! or CBOR serialization errors.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than a complete frame header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes actually available
        actual: usize,
    },

    /// Header claims more payload bytes than the buffer holds.
    #[error("frame truncated: payload expected {expected} bytes, got {actual}")]
    FrameTruncated {
        /// Payload length the header claims
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Magic number does not identify a roomcast frame.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Protocol version is not supported by this implementation.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the protocol size limit.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual or claimed payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// CBOR serialization failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed or the opcode is unknown.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),
}
