//! Room directory: the global map of known rooms and their member sets.
//!
//! Rooms are created lazily on first join and never deleted; an empty room
//! stays listed. Creation order is tracked so directory snapshots are
//! deterministic. Only the presence coordinator mutates this structure.

use std::collections::{HashMap, HashSet};

/// One room: display name plus the set of member session IDs.
#[derive(Debug, Clone, Default)]
pub struct Room {
    /// Human-readable display name. Defaults to the room identifier.
    name: String,
    /// Member session IDs. A connection cannot appear twice.
    members: HashSet<u64>,
}

/// One entry of a directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEntry<'a> {
    /// Room identifier.
    pub id: &'a str,
    /// Human-readable display name.
    pub name: &'a str,
    /// Number of current members.
    pub member_count: usize,
}

/// Directory of all known rooms.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    /// Room ID → room state
    rooms: HashMap<String, Room>,
    /// Room IDs in creation order, for deterministic snapshots
    creation_order: Vec<String>,
}

impl RoomDirectory {
    /// Create a new empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a room exists, creating it with display name = identifier.
    ///
    /// Never fails; an existing room is left untouched.
    pub fn ensure_room(&mut self, room_id: &str) {
        self.ensure_room_named(room_id, room_id);
    }

    /// Ensure a room exists, creating it with an explicit display name.
    ///
    /// Used to seed the default room with a friendly name. An existing
    /// room's display name is left untouched.
    pub fn ensure_room_named(&mut self, room_id: &str, display_name: &str) {
        if !self.rooms.contains_key(room_id) {
            self.rooms.insert(
                room_id.to_string(),
                Room { name: display_name.to_string(), members: HashSet::new() },
            );
            self.creation_order.push(room_id.to_string());
        }
    }

    /// Add a member to a room. Idempotent; a no-op if already a member or if
    /// the room does not exist.
    pub fn add_member(&mut self, room_id: &str, session_id: u64) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.members.insert(session_id);
        }
    }

    /// Remove a member from a room. Idempotent; a no-op if not a member.
    /// Does not delete the room even if the member set becomes empty.
    pub fn remove_member(&mut self, room_id: &str, session_id: u64) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.members.remove(&session_id);
        }
    }

    /// Whether a room exists.
    #[must_use]
    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Member session IDs of a room. Empty for unknown rooms.
    pub fn members_of(&self, room_id: &str) -> impl Iterator<Item = u64> + '_ {
        self.rooms.get(room_id).into_iter().flat_map(|room| room.members.iter().copied())
    }

    /// Whether a session is a member of a room.
    #[must_use]
    pub fn is_member(&self, room_id: &str, session_id: u64) -> bool {
        self.rooms.get(room_id).is_some_and(|room| room.members.contains(&session_id))
    }

    /// Number of members in a room. Zero for unknown rooms.
    #[must_use]
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.members.len())
    }

    /// Snapshot of all rooms in creation order.
    ///
    /// Lazy: entries are produced as the iterator advances, so callers must
    /// treat the sequence as a point-in-time view and not hold it across
    /// mutations.
    pub fn list_rooms(&self) -> impl Iterator<Item = RoomEntry<'_>> + '_ {
        self.creation_order.iter().filter_map(|id| {
            self.rooms.get(id).map(|room| RoomEntry {
                id,
                name: &room.name,
                member_count: room.members.len(),
            })
        })
    }

    /// Total number of known rooms, empty ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// True if no rooms exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
