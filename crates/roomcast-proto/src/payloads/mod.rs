//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for performance, but payloads use CBOR for
//! type safety and forward compatibility. The `Payload` enum covers all
//! message types: session management (Hello, Ping, etc.), the account
//! service, presence operations, chat messages, and directory pushes.
//!
//! CBOR is self-describing (field names embedded), compact, and needs no
//! code generation. The fanout path never re-encodes payloads per recipient;
//! only the endpoints deserialize.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values.

pub mod account;
pub mod chat;
pub mod presence;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
///
/// The payload type is determined by the `Opcode` in the frame header, so we
/// serialize only the inner struct content (no variant tag in CBOR). This
/// also prevents a peer from sending mismatched opcode/payload pairs: the
/// opcode alone selects the deserializer.
///
/// All methods use exhaustive `match` statements; adding a variant causes
/// compile errors in `encode()`, `decode()`, and `opcode()` until it is
/// handled everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session management
    /// Initial handshake
    Hello(session::Hello),
    /// Server response to Hello
    HelloReply(session::HelloReply),
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Ping for keepalive
    Ping,
    /// Pong response
    Pong,

    // Account service
    /// Account creation request
    SignUp(account::SignUp),
    /// Account creation confirmation
    SignUpReply(account::SignUpReply),
    /// Credential check request
    SignIn(account::SignIn),
    /// Credential check success, carries the opaque token
    SignInReply(account::SignInReply),

    // Presence
    /// Attach a display name, auto-joins the default room
    Login(presence::Login),
    /// Join (lazily creating) a named room
    JoinRoom(presence::JoinRoom),

    // Chat
    /// Client-to-room message
    SendMessage(chat::SendMessage),
    /// Server-stamped message delivered to room members
    ReceiveMessage(chat::ReceiveMessage),

    // Directory pushes
    /// Room directory snapshot for all connections
    RoomList(presence::RoomList),
    /// Member list for one room
    UserList(presence::UserList),

    /// Error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Frame was rejected by the server.
    pub const FRAME_REJECTED: u16 = 0x0001;
    /// Invalid payload format.
    pub const INVALID_PAYLOAD: u16 = 0x0002;
    /// Sign-up failed: email already registered.
    pub const DUPLICATE_EMAIL: u16 = 0x0003;
    /// Sign-in failed: unknown email or wrong password.
    pub const INVALID_CREDENTIALS: u16 = 0x0004;

    /// Create a frame rejection error.
    pub fn frame_rejected(reason: impl Into<String>) -> Self {
        Self { code: Self::FRAME_REJECTED, message: reason.into() }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create a duplicate email error.
    pub fn duplicate_email(email: impl Into<String>) -> Self {
        Self {
            code: Self::DUPLICATE_EMAIL,
            message: format!("email already registered: {}", email.into()),
        }
    }

    /// Create an invalid credentials error.
    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self { code: Self::INVALID_CREDENTIALS, message: "invalid email or password".to_string() }
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::SignUp(_) => Opcode::SignUp,
            Self::SignUpReply(_) => Opcode::SignUpReply,
            Self::SignIn(_) => Opcode::SignIn,
            Self::SignInReply(_) => Opcode::SignInReply,
            Self::Login(_) => Opcode::Login,
            Self::JoinRoom(_) => Opcode::JoinRoom,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::ReceiveMessage(_) => Opcode::ReceiveMessage,
            Self::RoomList(_) => Opcode::RoomList,
            Self::UserList(_) => Opcode::UserList,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode payload to a buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag. The frame
    /// header's opcode already identifies the payload type. Size validation
    /// against [`FrameHeader::MAX_PAYLOAD_SIZE`] happens later in
    /// [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Ping | Self::Pong => Ok(()), // Zero-byte payloads
            Self::SignUp(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SignUpReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SignIn(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SignInReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Login(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::JoinRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::ReceiveMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RoomList(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UserList(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload from bytes based on the opcode.
    ///
    /// The size check happens BEFORE CBOR parsing begins, so the parser never
    /// sees inputs past the protocol limit. Unknown opcodes are rejected
    /// rather than silently ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if bytes exceed
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    /// - [`ProtocolError::CborDecode`] if CBOR deserialization fails or the
    ///   opcode is unsupported
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        fn read<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(read(bytes)?),
            Opcode::HelloReply => Self::HelloReply(read(bytes)?),
            Opcode::Goodbye => Self::Goodbye(read(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::SignUp => Self::SignUp(read(bytes)?),
            Opcode::SignUpReply => Self::SignUpReply(read(bytes)?),
            Opcode::SignIn => Self::SignIn(read(bytes)?),
            Opcode::SignInReply => Self::SignInReply(read(bytes)?),
            Opcode::Login => Self::Login(read(bytes)?),
            Opcode::JoinRoom => Self::JoinRoom(read(bytes)?),
            Opcode::SendMessage => Self::SendMessage(read(bytes)?),
            Opcode::ReceiveMessage => Self::ReceiveMessage(read(bytes)?),
            Opcode::RoomList => Self::RoomList(read(bytes)?),
            Opcode::UserList => Self::UserList(read(bytes)?),
            Opcode::Error => Self::Error(read(bytes)?),
        };

        Ok(payload)
    }

    /// Convert the payload into a transport frame.
    ///
    /// Encodes the payload to CBOR bytes, sets the correct opcode in the
    /// header, and creates a Frame with automatic `payload_size` calculation.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse a payload from a raw transport frame.
    ///
    /// Extracts the opcode from the frame header and decodes the payload
    /// bytes based on it.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborDecode`] if the opcode is invalid or CBOR
    ///   deserialization fails
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the
    ///   maximum size
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame.header.opcode_enum().ok_or_else(|| {
            ProtocolError::CborDecode(format!("invalid opcode: {:#06x}", frame.header.opcode()))
        })?;
        Self::decode(opcode, &frame.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_ping_round_trip() {
        let payload = Payload::Ping;

        let frame =
            payload.clone().into_frame(FrameHeader::new(Opcode::Ping)).expect("should create");
        assert_eq!(frame.payload.len(), 0);

        let decoded = Payload::from_frame(&frame).expect("should parse");
        assert_eq!(payload, decoded);
    }

    #[test]
    fn payload_error_round_trip() {
        let payload =
            Payload::Error(ErrorPayload { code: 0x00FF, message: "Test error".to_string() });

        let frame =
            payload.clone().into_frame(FrameHeader::new(Opcode::Error)).expect("should create");
        let decoded = Payload::from_frame(&frame).expect("should parse");
        assert_eq!(payload, decoded);
    }

    #[test]
    fn into_frame_sets_opcode() {
        let payload = Payload::Login(presence::Login { name: "Alice".to_string() });

        // Header starts with a mismatched opcode; into_frame corrects it
        let frame = payload.into_frame(FrameHeader::new(Opcode::Ping)).expect("should create");
        assert_eq!(frame.header.opcode_enum(), Some(Opcode::Login));
    }

    #[test]
    fn malformed_cbor_rejected() {
        let garbage = Frame::new(FrameHeader::new(Opcode::Login), vec![0xFF, 0x00, 0x13]);
        let result = Payload::from_frame(&garbage);
        assert!(matches!(result, Err(ProtocolError::CborDecode(_))));
    }

    #[test]
    fn type_confusion_rejected() {
        // A JoinRoom body presented under the SignIn opcode must not decode
        // into a SignIn.
        let join = Payload::JoinRoom(presence::JoinRoom { room: "sports".to_string() });
        let mut buf = Vec::new();
        join.encode(&mut buf).expect("should encode");

        let result = Payload::decode(Opcode::SignIn, &buf);
        assert!(matches!(result, Err(ProtocolError::CborDecode(_))));
    }
}
