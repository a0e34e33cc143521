//! Property-based tests for Frame encoding/decoding.
//!
//! These tests verify that frame serialization is correct for ALL valid
//! inputs, not just specific examples. Uses proptest to generate arbitrary
//! frames and verify round-trip properties.

use bytes::Bytes;
use proptest::prelude::*;
use roomcast_proto::{Frame, FrameHeader, Opcode};

/// Strategy for generating arbitrary opcodes
fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Hello),
        Just(Opcode::HelloReply),
        Just(Opcode::Goodbye),
        Just(Opcode::Ping),
        Just(Opcode::Pong),
        Just(Opcode::SignUp),
        Just(Opcode::SignUpReply),
        Just(Opcode::SignIn),
        Just(Opcode::SignInReply),
        Just(Opcode::Login),
        Just(Opcode::JoinRoom),
        Just(Opcode::SendMessage),
        Just(Opcode::ReceiveMessage),
        Just(Opcode::RoomList),
        Just(Opcode::UserList),
        Just(Opcode::Error),
    ]
}

/// Strategy for generating arbitrary frame headers
fn arbitrary_header() -> impl Strategy<Value = FrameHeader> {
    (arbitrary_opcode(), any::<u32>()).prop_map(|(opcode, request_id)| {
        let mut header = FrameHeader::new(opcode);
        header.set_request_id(request_id);
        header
    })
}

/// Strategy for generating arbitrary frames with payloads
fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (
        arbitrary_header(),
        prop::collection::vec(any::<u8>(), 0..1024), // payload up to 1KB
    )
        .prop_map(|(header, payload)| Frame::new(header, Bytes::from(payload)))
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Round-trip must be identity
        prop_assert_eq!(decoded.header, frame.header, "Header mismatch after round-trip");
        prop_assert_eq!(
            decoded.payload.len(),
            frame.payload.len(),
            "Payload length mismatch"
        );
        prop_assert_eq!(decoded.payload, frame.payload, "Payload content mismatch");
    });
}

#[test]
fn prop_frame_header_roundtrip() {
    proptest!(|(header in arbitrary_header())| {
        let bytes = header.to_bytes();

        let decoded = FrameHeader::from_bytes(&bytes).expect("from_bytes should succeed");

        // PROPERTY: Header round-trip must be identity
        prop_assert_eq!(decoded.opcode(), header.opcode(), "Opcode mismatch");
        prop_assert_eq!(decoded.request_id(), header.request_id(), "Request ID mismatch");
        prop_assert_eq!(
            decoded.payload_size(),
            header.payload_size(),
            "Payload size mismatch"
        );
    });
}

#[test]
fn prop_frame_empty_payload() {
    proptest!(|(header in arbitrary_header())| {
        let frame = Frame::new(header, Bytes::new());

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Empty payload preserved
        prop_assert_eq!(decoded.payload.len(), 0, "Empty payload should remain empty");
        prop_assert_eq!(decoded.header.payload_size(), 0, "Header should show 0 payload");
    });
}

#[test]
fn prop_frame_opcode_preservation() {
    proptest!(|(opcode in arbitrary_opcode())| {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::new());

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        // PROPERTY: Opcode must be preserved exactly
        prop_assert_eq!(
            decoded.header.opcode_enum(),
            Some(opcode),
            "Opcode not preserved: expected {:?}, got {:?}",
            opcode,
            decoded.header.opcode_enum()
        );
    });
}

#[test]
fn prop_frame_encoded_size_correct() {
    proptest!(|(frame in arbitrary_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        // PROPERTY: Encoded size must equal header size + payload size
        #[allow(clippy::arithmetic_side_effects)] // Test code: values bounded by property test
        let expected_size = FrameHeader::SIZE + frame.payload.len();
        prop_assert_eq!(
            buf.len(),
            expected_size,
            "Encoded size mismatch: expected {}, got {}",
            expected_size,
            buf.len()
        );
    });
}
