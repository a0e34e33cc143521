//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet consisting of:
//! - 16-byte raw binary header (Big Endian) for O(1) routing
//! - Variable-length raw bytes (already CBOR-encoded)
//!
//! This is a pure data holder (header + bytes). For high-level logic,
//! see `Payload::into_frame()` and `Payload::from_frame()`.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame (transport layer).
///
/// Layout on the wire:
/// `[FrameHeader: 16 bytes, raw binary] + [payload: variable bytes]`
///
/// Holds raw bytes, NOT the Payload enum. The server can fan frames out to
/// room members without re-encoding the payload per recipient.
///
/// # Invariants
///
/// - Size Consistency: `payload.len()` MUST match `header.payload_size()`.
///   This invariant is enforced by [`Frame::new`] and verified by
///   [`Frame::decode`].
///
/// - Size Limit: `payload.len()` MUST NOT exceed
///   [`FrameHeader::MAX_PAYLOAD_SIZE`] (64 KiB). Violations are rejected
///   during encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (16 bytes)
    pub header: FrameHeader,

    /// Raw payload bytes (already CBOR-encoded)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic `payload_size` calculation.
    ///
    /// The header's `payload_size` field is automatically set to match the
    /// actual payload length, so a frame with mismatched header and payload
    /// sizes cannot be constructed.
    ///
    /// This constructor does NOT validate the payload against
    /// [`FrameHeader::MAX_PAYLOAD_SIZE`]; oversized frames are rejected later
    /// by [`Frame::encode`], which keeps construction unrestricted for tests.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // INVARIANT: Bytes is bounded by isize::MAX and the protocol limit is
        // 64 KiB, so the length always fits in u32.
        #[allow(clippy::expect_used)]
        let payload_len = u32::try_from(payload.len())
            .expect("invariant: payload length fits in u32 (bounded by isize::MAX)");

        header.payload_size = payload_len.to_be_bytes();

        debug_assert_eq!(header.payload_size(), payload_len);

        Self { header, payload }
    }

    /// Encode the frame into a buffer.
    ///
    /// Writes: `[header (16 bytes)] + [payload (variable)]`
    ///
    /// This is the enforcement point for the 64 KiB payload limit: oversized
    /// frames are rejected here rather than silently truncated.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format.
    ///
    /// Returns a Frame with raw bytes (does NOT deserialize the payload).
    /// Use `Payload::from_frame()` if you need the high-level enum.
    ///
    /// All validation happens before allocating memory for the payload, and
    /// only exactly `payload_size` bytes are read from the buffer; trailing
    /// data is ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError`] if header parsing fails (invalid magic, version,
    ///   or size limits)
    /// - [`ProtocolError::FrameTruncated`] if the buffer holds fewer payload
    ///   bytes than the header claims
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE.checked_add(payload_size).ok_or({
            ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            }
        })?;

        debug_assert!(total_size >= FrameHeader::SIZE);

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        // INVARIANT: bytes.len() >= total_size was checked above, so the
        // slice bounds cannot panic.
        #[allow(clippy::expect_used)]
        let payload = Bytes::copy_from_slice(
            bytes.get(FrameHeader::SIZE..total_size).expect("invariant: bounds checked above"),
        );

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header: *header, payload })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::Opcode;

    impl Arbitrary for Frame {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (any::<FrameHeader>(), prop::collection::vec(any::<u8>(), 0..1024))
                .prop_map(|(header, payload_bytes)| Self::new(header, payload_bytes))
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn frame_round_trip(frame in any::<Frame>()) {
            let mut wire = Vec::new();
            frame.encode(&mut wire).expect("should encode");

            let parsed = Frame::decode(&wire).expect("should decode");
            prop_assert_eq!(frame.header, parsed.header);
            prop_assert_eq!(frame.payload, parsed.payload);
        }
    }

    #[test]
    fn frame_with_payload() {
        let header = FrameHeader::new(Opcode::Ping);

        // Create frame (payload_size set automatically)
        let payload_bytes = vec![1, 2, 3, 4];
        let frame = Frame::new(header, payload_bytes.clone());

        #[allow(clippy::cast_possible_truncation)] // Test with small payload
        let expected_size = payload_bytes.len() as u32;
        assert_eq!(frame.header.payload_size(), expected_size);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(frame.payload, parsed.payload);
    }

    #[test]
    fn reject_truncated_frame() {
        // Create header claiming 100 bytes of payload
        let mut header = FrameHeader::new(Opcode::SendMessage);
        header.set_payload_size(100);

        let header_bytes = header.to_bytes();

        // Only provide header, no payload
        let result = Frame::decode(&header_bytes);
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { .. })));
    }

    #[test]
    fn reject_oversized_encode() {
        let header = FrameHeader::new(Opcode::SendMessage);
        let payload = vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1];
        let frame = Frame::new(header, payload);

        let mut wire = Vec::new();
        let result = frame.encode(&mut wire);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let frame = Frame::new(FrameHeader::new(Opcode::Ping), vec![9, 9]);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");
        wire.extend_from_slice(&[0xAA; 8]); // garbage after the frame

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(parsed.payload.len(), 2);
    }
}
