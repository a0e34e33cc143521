//! Frame operation codes.
//!
//! The opcode in the frame header selects the payload type; CBOR bodies carry
//! no variant tag. Codes are grouped by concern: session layer (0x000x),
//! account service (0x001x), presence (0x002x), chat (0x003x), directory
//! pushes (0x004x), and the error frame (0x00FF).

/// Operation code identifying a frame's payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    // Session layer
    /// Initial client handshake
    Hello = 0x0001,
    /// Server response to Hello, carries the session id
    HelloReply = 0x0002,
    /// Graceful disconnect
    Goodbye = 0x0003,
    /// Keepalive probe (zero-byte payload)
    Ping = 0x0004,
    /// Keepalive response (zero-byte payload)
    Pong = 0x0005,

    // Account service
    /// Create an account
    SignUp = 0x0010,
    /// Server response to a successful SignUp
    SignUpReply = 0x0011,
    /// Authenticate against a stored account
    SignIn = 0x0012,
    /// Server response to a successful SignIn, carries the session token
    SignInReply = 0x0013,

    // Presence
    /// Attach a display name and auto-join the default room
    Login = 0x0020,
    /// Join (and lazily create) a named room
    JoinRoom = 0x0021,

    // Chat
    /// Client-to-room chat message
    SendMessage = 0x0030,
    /// Server-stamped chat message fanned out to room members
    ReceiveMessage = 0x0031,

    // Directory pushes
    /// Full room directory snapshot, sent to every connection
    RoomList = 0x0040,
    /// Member list for a single room, sent to that room's members
    UserList = 0x0041,

    /// Error response
    Error = 0x00FF,
}

impl Opcode {
    /// Numeric wire value of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value into an opcode. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x0004 => Some(Self::Ping),
            0x0005 => Some(Self::Pong),
            0x0010 => Some(Self::SignUp),
            0x0011 => Some(Self::SignUpReply),
            0x0012 => Some(Self::SignIn),
            0x0013 => Some(Self::SignInReply),
            0x0020 => Some(Self::Login),
            0x0021 => Some(Self::JoinRoom),
            0x0030 => Some(Self::SendMessage),
            0x0031 => Some(Self::ReceiveMessage),
            0x0040 => Some(Self::RoomList),
            0x0041 => Some(Self::UserList),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Opcode; 16] = [
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

    #[test]
    fn opcode_round_trip() {
        for opcode in ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(Opcode::from_u16(0x0000), None);
        assert_eq!(Opcode::from_u16(0x7777), None);
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }
}
