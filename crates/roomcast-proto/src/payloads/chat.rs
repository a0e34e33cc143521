//! Chat message payload types.

use serde::{Deserialize, Serialize};

/// Client-to-room chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Message text.
    pub message: String,

    /// Target room. Omitted means the default room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Server-stamped chat message fanned out to the target room's members.
///
/// The server resolves `sender` from the sending connection's display name
/// and assigns `timestamp`; neither is taken from the inbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessage {
    /// Display name of the sending connection.
    pub sender: String,

    /// Message text, unchanged from the inbound payload.
    pub message: String,

    /// Room the message was delivered to.
    pub room: String,

    /// Server-assigned RFC 3339 timestamp (UTC, millisecond precision).
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_round_trip() {
        let original = SendMessage { message: "hello world".to_string(), room: None };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: SendMessage = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
        assert!(decoded.room.is_none());
    }

    #[test]
    fn receive_message_round_trip() {
        let original = ReceiveMessage {
            sender: "Alice".to_string(),
            message: "hello".to_string(),
            room: "sports".to_string(),
            timestamp: "2025-06-01T12:00:00.000Z".to_string(),
        };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: ReceiveMessage = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }
}
