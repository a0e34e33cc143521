//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 16-byte structure serialized as raw binary
//! (Big Endian). This lets the server make routing decisions without touching
//! the CBOR payload: one header read yields the opcode and the exact number
//! of payload bytes to pull off the stream.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 16-byte frame header (Big Endian network byte order).
///
/// All multi-byte integers are stored in Big Endian format to match network
/// byte order. Fields are stored as raw byte arrays to avoid alignment
/// issues.
///
/// Room identifiers are client-supplied strings and therefore live in the
/// CBOR payload, not here: the header carries only what the read loop needs
/// before deserializing anything.
///
/// # Security
///
/// The `#[repr(C, packed)]` layout with zerocopy traits ensures this struct
/// can be safely cast from untrusted network bytes: every 16-byte pattern is
/// a valid bit pattern, so the cast itself cannot misbehave. Validation
/// (magic, version, payload bound) happens in [`FrameHeader::from_bytes`]
/// before any payload allocation.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (6 bytes: 0-5)
    magic: [u8; 4], // 0x524F4F4D ("ROOM" in ASCII)
    version: u8,    // 0x01
    flags: u8,      // reserved, must be zero for now

    // Operation code (2 bytes: 6-7)
    pub(crate) opcode: [u8; 2],

    // Request/payload metadata (8 bytes: 8-15)
    request_id: [u8; 4],              // u32 client nonce for correlation
    pub(crate) payload_size: [u8; 4], // u32 payload length
}

impl FrameHeader {
    /// Size of the serialized header (16 bytes).
    pub const SIZE: usize = 16;

    /// Magic number: "ROOM" in ASCII (0x524F4F4D).
    pub const MAGIC: u32 = 0x524F_4F4D;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 KiB).
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Create a new header with the specified opcode.
    ///
    /// `request_id` and `payload_size` start at zero; the payload size is set
    /// automatically by [`crate::Frame::new`].
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            request_id: [0u8; 4],
            payload_size: [0u8; 4],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// Validation order is cheapest-first: buffer length, magic, version,
    /// then the payload size bound. Garbage data fails before anything is
    /// allocated.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if the buffer holds fewer than 16
    ///   bytes
    /// - [`ProtocolError::InvalidMagic`] if the magic number is wrong
    /// - [`ProtocolError::UnsupportedVersion`] if the version byte is
    ///   unrecognized
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload size
    ///   exceeds [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number (0x524F4F4D = "ROOM").
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte (currently 0x01).
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Reserved flags byte.
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Client-assigned nonce for request/response correlation.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    /// Payload size in bytes (max 64 KiB).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Set the client request nonce for response correlation.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_be_bytes();
    }

    /// Set the payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("flags", &self.flags())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("request_id", &self.request_id())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
