//! Fuzz target for Payload::from_frame
//!
//! This fuzzer tests payload deserialization (CBOR decoding) with:
//! - Malformed CBOR data
//! - Type confusion attacks (wrong payload type for opcode)
//! - Oversized strings or collections
//! - Nested structures exceeding depth limits
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use roomcast_proto::{Frame, FrameHeader, Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    // We need a valid frame header to test payload decoding
    // Try all opcodes to test different payload types
    let opcodes = [
        Opcode::Hello,
        Opcode::HelloReply,
        Opcode::Goodbye,
        Opcode::Ping,
        Opcode::Pong,
        Opcode::SignUp,
        Opcode::SignUpReply,
        Opcode::SignIn,
        Opcode::SignInReply,
        Opcode::Login,
        Opcode::JoinRoom,
        Opcode::SendMessage,
        Opcode::ReceiveMessage,
        Opcode::RoomList,
        Opcode::UserList,
        Opcode::Error,
    ];

    for opcode in opcodes {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));

        // Attempt to deserialize the payload
        // This should never panic, only return Err for invalid CBOR
        let _ = Payload::from_frame(&frame);
    }
});
