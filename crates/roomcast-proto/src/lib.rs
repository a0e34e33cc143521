//! Roomcast wire protocol.
//!
//! Frames are the unit of exchange between clients and the server: a fixed
//! 16-byte binary header (Big Endian) for O(1) routing decisions, followed by
//! a CBOR-encoded payload body. The header carries only what routing needs
//! (opcode, request correlation, payload length); everything
//! application-level, including room identifiers, lives in the payload.
//!
//! # Layers
//!
//! - [`FrameHeader`]: raw binary header, parsed zero-copy from network bytes
//! - [`Frame`]: header + raw payload bytes (transport layer, no CBOR parsing)
//! - [`Payload`]: typed payload enum, one variant per [`Opcode`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{ErrorPayload, Payload};

/// ALPN protocol identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"roomcast";
