//! Session management payload types.
//!
//! These payloads drive the connection lifecycle: the Hello/HelloReply
//! handshake and graceful shutdown. Ping and Pong carry no payload at all.

use serde::{Deserialize, Serialize};

/// Initial handshake sent by the client after the transport connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks. Must be 1.
    pub version: u8,

    /// Optional capability strings for forward compatibility.
    pub capabilities: Vec<String>,
}

/// Server response to Hello.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Server-assigned session identifier, unique for the process lifetime.
    pub session_id: u64,

    /// Capability strings the server supports.
    pub capabilities: Vec<String>,
}

/// Graceful disconnect notice. Acked with a Goodbye in return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason for the disconnect.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let original = Hello { version: 1, capabilities: vec!["chat".to_string()] };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: Hello = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn hello_reply_serde() {
        let reply = HelloReply { session_id: 0xABCD, capabilities: vec![] };

        let cbor = ciborium::ser::into_writer(&reply, Vec::new());
        assert!(cbor.is_ok());
    }
}
