//! Presence and directory payload types.
//!
//! Inbound: `Login` (names a connection, auto-joins the default room) and
//! `JoinRoom` (switches rooms, lazily creating the target). Outbound:
//! `RoomList` pushed to every connection after any directory change and
//! `UserList` pushed to one room's members after any membership change.

use serde::{Deserialize, Serialize};

/// Attach a display name to the connection.
///
/// The server auto-joins the connection to the default room on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    /// Display name; must be non-empty.
    pub name: String,
}

/// Join a named room, leaving the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Target room identifier; an unseen id creates a new room.
    pub room: String,
}

/// One room's entry in the directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Room identifier.
    pub id: String,

    /// Human-readable display name.
    pub name: String,

    /// Number of connections currently in the room.
    pub user_count: u32,
}

/// Room directory snapshot, ordered by room creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomList {
    /// All known rooms, including empty ones.
    pub rooms: Vec<RoomInfo>,
}

/// One member's entry in a room member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// The member's display name.
    pub name: String,
}

/// Member list for a single room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    /// Room the list describes.
    pub room: String,

    /// Current members of the room.
    pub users: Vec<UserInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_list_round_trip() {
        let original = RoomList {
            rooms: vec![
                RoomInfo { id: "general".to_string(), name: "General".to_string(), user_count: 3 },
                RoomInfo { id: "sports".to_string(), name: "sports".to_string(), user_count: 0 },
            ],
        };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: RoomList = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn user_list_round_trip() {
        let original = UserList {
            room: "general".to_string(),
            users: vec![
                UserInfo { name: "Alice".to_string() },
                UserInfo { name: "Bob".to_string() },
            ],
        };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: UserList = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }
}
