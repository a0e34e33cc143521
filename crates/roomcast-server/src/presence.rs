//! Presence coordinator.
//!
//! Exclusive owner of the connection registry and the room directory. Every
//! mutation of either structure goes through one of the operations here, and
//! each operation takes `&mut self`, so "remove from the old room" and "add
//! to the new room" can never interleave with another connection's join or
//! leave. That single ownership rule is what keeps the member sets and the
//! per-connection current-room fields from drifting apart.
//!
//! Presence state per connection: `Anonymous → Named → InRoom(room)`.
//! Operations return the set of notifications the caller must fan out as
//! plain data ([`PresenceUpdate`]); the coordinator performs no I/O.

use thiserror::Error;

use crate::{
    directory::{RoomDirectory, RoomEntry},
    registry::{ConnectionRegistry, RegistryError},
};

/// Identifier of the reserved default room every login lands in.
pub const DEFAULT_ROOM_ID: &str = "general";

/// Display name the default room is seeded with.
pub const DEFAULT_ROOM_NAME: &str = "General";

/// Notification computed by a presence mutation.
///
/// The driver turns these into outbound frames: `RoomMembers` becomes a
/// member-list push to that room, `Directory` becomes a room-list push to
/// every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceUpdate {
    /// The member set of one room changed; its members need a fresh list.
    RoomMembers {
        /// Room whose membership changed
        room: String,
    },
    /// The room directory changed (counts or a new room); everyone needs a
    /// fresh snapshot.
    Directory,
}

/// Errors from presence operations.
///
/// These are logic errors: the driver logs them and aborts the single
/// operation, leaving the connection and every other session untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    /// Registry-level failure (unknown or duplicate connection).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Login on a connection that already has a display name.
    #[error("connection {0} is already logged in")]
    AlreadyNamed(u64),

    /// Room operation on a connection that has not logged in.
    #[error("connection {0} has no display name")]
    NotNamed(u64),
}

/// The presence coordination core.
///
/// Invariant: for every room R, R's member set equals exactly the set of
/// registered connections whose current-room field is R. Every public
/// operation re-establishes this before returning.
#[derive(Debug)]
pub struct PresenceCoordinator {
    /// Per-connection session state. Mutated only here.
    registry: ConnectionRegistry,
    /// Room display names and member sets. Mutated only here.
    directory: RoomDirectory,
}

impl Default for PresenceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceCoordinator {
    /// Create a coordinator with the default room pre-seeded.
    #[must_use]
    pub fn new() -> Self {
        let mut directory = RoomDirectory::new();
        directory.ensure_room_named(DEFAULT_ROOM_ID, DEFAULT_ROOM_NAME);

        Self { registry: ConnectionRegistry::new(), directory }
    }

    /// Register a freshly accepted connection (no name, no room).
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateConnection`] if the transport reused a
    ///   session ID
    pub fn register(&mut self, session_id: u64) -> Result<(), RegistryError> {
        self.registry.register(session_id)
    }

    /// Name a connection and auto-join it to the default room.
    ///
    /// Returns the notifications to fan out: the directory snapshot to all
    /// connections and the default room's member list to its members.
    ///
    /// # Errors
    ///
    /// - [`PresenceError::Registry`] if the connection is not registered
    /// - [`PresenceError::AlreadyNamed`] if the connection already logged in
    pub fn login(
        &mut self,
        session_id: u64,
        name: &str,
    ) -> Result<Vec<PresenceUpdate>, PresenceError> {
        let session = self.registry.get(session_id)?;
        if session.name.is_some() {
            return Err(PresenceError::AlreadyNamed(session_id));
        }

        self.registry.set_name(session_id, name)?;

        // Fresh connection: pure add, no room to vacate
        self.directory.add_member(DEFAULT_ROOM_ID, session_id);
        self.registry.set_room(session_id, Some(DEFAULT_ROOM_ID.to_string()))?;

        Ok(vec![PresenceUpdate::Directory, PresenceUpdate::RoomMembers {
            room: DEFAULT_ROOM_ID.to_string(),
        }])
    }

    /// Move a connection into a room, leaving its current one.
    ///
    /// The previous room is read from the connection's current-room field at
    /// call time. Leave-then-enter runs to completion inside this call, so
    /// the connection is never a member of two rooms. Re-joining the current
    /// room is an idempotent add and still produces notifications.
    ///
    /// # Errors
    ///
    /// - [`PresenceError::Registry`] if the connection is not registered
    /// - [`PresenceError::NotNamed`] if the connection has not logged in
    pub fn join_room(
        &mut self,
        session_id: u64,
        room_id: &str,
    ) -> Result<Vec<PresenceUpdate>, PresenceError> {
        let session = self.registry.get(session_id)?;
        if session.name.is_none() {
            return Err(PresenceError::NotNamed(session_id));
        }

        let mut updates = Vec::new();

        // Leave the previous room first, unless re-joining the same one
        if let Some(previous) = session.room.clone() {
            if previous != room_id {
                self.directory.remove_member(&previous, session_id);
                updates.push(PresenceUpdate::RoomMembers { room: previous });
            }
        }

        self.directory.ensure_room(room_id);
        self.directory.add_member(room_id, session_id);
        self.registry.set_room(session_id, Some(room_id.to_string()))?;

        updates.push(PresenceUpdate::RoomMembers { room: room_id.to_string() });
        updates.push(PresenceUpdate::Directory);

        Ok(updates)
    }

    /// Remove a connection from its room (if any) and unregister it.
    ///
    /// Idempotent: a duplicate disconnect finds nothing to remove and
    /// returns no notifications. A connection that never logged in vacates
    /// no room, so its disconnect is silent.
    pub fn disconnect(&mut self, session_id: u64) -> Vec<PresenceUpdate> {
        let Some(session) = self.registry.unregister(session_id) else {
            return Vec::new();
        };

        match session.room {
            Some(room) => {
                self.directory.remove_member(&room, session_id);
                vec![PresenceUpdate::RoomMembers { room }, PresenceUpdate::Directory]
            },
            None => Vec::new(),
        }
    }

    /// Member session IDs of a room at this instant. Empty if unknown.
    pub fn members_of(&self, room_id: &str) -> impl Iterator<Item = u64> + '_ {
        self.directory.members_of(room_id)
    }

    /// Display names of a room's members, sorted for deterministic output.
    #[must_use]
    pub fn member_names(&self, room_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .directory
            .members_of(room_id)
            .filter_map(|id| self.registry.get(id).ok())
            .filter_map(|session| session.name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Directory snapshot in room creation order.
    pub fn room_listing(&self) -> impl Iterator<Item = RoomEntry<'_>> + '_ {
        self.directory.list_rooms()
    }

    /// All registered session IDs (for whole-server fanout).
    pub fn session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.registry.session_ids()
    }

    /// Display name of a connection. `None` if unregistered or anonymous.
    #[must_use]
    pub fn display_name(&self, session_id: u64) -> Option<&str> {
        self.registry.get(session_id).ok().and_then(|session| session.name.as_deref())
    }

    /// Current room of a connection. `None` if unregistered or roomless.
    #[must_use]
    pub fn current_room(&self, session_id: u64) -> Option<&str> {
        self.registry.get(session_id).ok().and_then(|session| session.room.as_deref())
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// Cross-structure invariant: every room's member set must equal the set
    /// of connections whose current room is that room.
    fn assert_invariant(coordinator: &PresenceCoordinator) {
        let rooms: Vec<String> =
            coordinator.room_listing().map(|entry| entry.id.to_string()).collect();

        for room in rooms {
            let members: HashSet<u64> = coordinator.members_of(&room).collect();
            let by_session: HashSet<u64> = coordinator
                .session_ids()
                .filter(|&id| coordinator.current_room(id) == Some(room.as_str()))
                .collect();
            assert_eq!(members, by_session, "member set drifted for room {room}");
        }
    }

    fn member_count(coordinator: &PresenceCoordinator, room: &str) -> usize {
        coordinator
            .room_listing()
            .find(|entry| entry.id == room)
            .map_or(0, |entry| entry.member_count)
    }

    #[test]
    fn login_auto_joins_default_room() {
        // Scenario: A logs in as "Alice" and lands in general with count 1
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();

        let updates = coordinator.login(1, "Alice").unwrap();

        assert_eq!(updates, vec![PresenceUpdate::Directory, PresenceUpdate::RoomMembers {
            room: DEFAULT_ROOM_ID.to_string()
        }]);
        assert_eq!(coordinator.current_room(1), Some(DEFAULT_ROOM_ID));
        assert_eq!(member_count(&coordinator, DEFAULT_ROOM_ID), 1);
        assert_eq!(coordinator.member_names(DEFAULT_ROOM_ID), vec!["Alice".to_string()]);
        assert_invariant(&coordinator);
    }

    #[test]
    fn login_requires_registration() {
        let mut coordinator = PresenceCoordinator::new();

        let result = coordinator.login(99, "Ghost");
        assert!(matches!(
            result,
            Err(PresenceError::Registry(RegistryError::UnknownConnection(99)))
        ));
    }

    #[test]
    fn second_login_is_rejected() {
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();
        coordinator.login(1, "Alice").unwrap();

        let result = coordinator.login(1, "Mallory");
        assert_eq!(result, Err(PresenceError::AlreadyNamed(1)));

        // Name and membership unchanged
        assert_eq!(coordinator.display_name(1), Some("Alice"));
        assert_eq!(member_count(&coordinator, DEFAULT_ROOM_ID), 1);
    }

    #[test]
    fn join_switches_rooms_and_notifies_both() {
        // Scenario: A joins "sports"; general drops to 0, sports rises to 1,
        // and both rooms get member-list updates
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();
        coordinator.login(1, "Alice").unwrap();

        let updates = coordinator.join_room(1, "sports").unwrap();

        assert_eq!(updates, vec![
            PresenceUpdate::RoomMembers { room: DEFAULT_ROOM_ID.to_string() },
            PresenceUpdate::RoomMembers { room: "sports".to_string() },
            PresenceUpdate::Directory,
        ]);
        assert_eq!(member_count(&coordinator, DEFAULT_ROOM_ID), 0);
        assert_eq!(member_count(&coordinator, "sports"), 1);
        assert_eq!(coordinator.current_room(1), Some("sports"));
        assert_invariant(&coordinator);
    }

    #[test]
    fn join_unseen_room_creates_it() {
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();
        coordinator.login(1, "Alice").unwrap();

        coordinator.join_room(1, "brand-new").unwrap();

        let entry_names: Vec<(String, String)> = coordinator
            .room_listing()
            .map(|entry| (entry.id.to_string(), entry.name.to_string()))
            .collect();

        // Creation order: seeded default first, lazily created room after,
        // with display name defaulting to the identifier
        assert_eq!(entry_names, vec![
            (DEFAULT_ROOM_ID.to_string(), DEFAULT_ROOM_NAME.to_string()),
            ("brand-new".to_string(), "brand-new".to_string()),
        ]);
    }

    #[test]
    fn rejoining_current_room_is_idempotent() {
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();
        coordinator.login(1, "Alice").unwrap();
        coordinator.join_room(1, "sports").unwrap();

        let updates = coordinator.join_room(1, "sports").unwrap();

        // No leave notification for the room being re-joined
        assert_eq!(updates, vec![
            PresenceUpdate::RoomMembers { room: "sports".to_string() },
            PresenceUpdate::Directory,
        ]);
        assert_eq!(member_count(&coordinator, "sports"), 1);
        assert_invariant(&coordinator);
    }

    #[test]
    fn join_before_login_is_rejected() {
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();

        let result = coordinator.join_room(1, "sports");
        assert_eq!(result, Err(PresenceError::NotNamed(1)));
        assert!(!coordinator.members_of("sports").any(|_| true));
    }

    #[test]
    fn disconnect_vacates_room() {
        // Scenario: A disconnects while in "sports"; count drops to 0 with
        // no explicit leave
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();
        coordinator.login(1, "Alice").unwrap();
        coordinator.join_room(1, "sports").unwrap();

        let updates = coordinator.disconnect(1);

        assert_eq!(updates, vec![
            PresenceUpdate::RoomMembers { room: "sports".to_string() },
            PresenceUpdate::Directory,
        ]);
        assert_eq!(member_count(&coordinator, "sports"), 0);
        assert_eq!(coordinator.connection_count(), 0);
        assert_invariant(&coordinator);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();
        coordinator.login(1, "Alice").unwrap();

        let first = coordinator.disconnect(1);
        assert!(!first.is_empty());

        let second = coordinator.disconnect(1);
        assert!(second.is_empty());
        assert_eq!(coordinator.connection_count(), 0);
        assert_eq!(member_count(&coordinator, DEFAULT_ROOM_ID), 0);
    }

    #[test]
    fn disconnect_of_anonymous_connection_is_silent() {
        let mut coordinator = PresenceCoordinator::new();
        coordinator.register(1).unwrap();

        let updates = coordinator.disconnect(1);
        assert!(updates.is_empty());
    }

    #[test]
    fn no_cross_talk_between_rooms() {
        // Scenario: B joins "sports"; A's broadcast set for sports contains
        // B but not C, who is sitting in general
        let mut coordinator = PresenceCoordinator::new();
        for id in [1, 2, 3] {
            coordinator.register(id).unwrap();
        }
        coordinator.login(1, "Alice").unwrap();
        coordinator.login(2, "Bob").unwrap();
        coordinator.login(3, "Carol").unwrap();

        coordinator.join_room(1, "sports").unwrap();
        coordinator.join_room(2, "sports").unwrap();

        let sports: HashSet<u64> = coordinator.members_of("sports").collect();
        assert_eq!(sports, HashSet::from([1, 2]));
        assert!(!sports.contains(&3));

        let general: HashSet<u64> = coordinator.members_of(DEFAULT_ROOM_ID).collect();
        assert_eq!(general, HashSet::from([3]));
        assert_invariant(&coordinator);
    }

    #[test]
    fn directory_counts_match_member_sets() {
        let mut coordinator = PresenceCoordinator::new();
        for id in [1, 2, 3, 4] {
            coordinator.register(id).unwrap();
            coordinator.login(id, format!("user-{id}").as_str()).unwrap();
        }
        coordinator.join_room(1, "a").unwrap();
        coordinator.join_room(2, "a").unwrap();
        coordinator.join_room(3, "b").unwrap();
        coordinator.disconnect(2);

        for entry in coordinator.room_listing() {
            assert_eq!(entry.member_count, coordinator.members_of(entry.id).count());
        }
        assert_invariant(&coordinator);
    }

    #[test]
    fn invariant_holds_across_operation_sequences() {
        let mut coordinator = PresenceCoordinator::new();

        for id in 1..=8u64 {
            coordinator.register(id).unwrap();
            coordinator.login(id, format!("user-{id}").as_str()).unwrap();
            assert_invariant(&coordinator);
        }

        let rooms = ["alpha", "beta", "gamma"];
        for (index, id) in (1..=8u64).enumerate() {
            coordinator.join_room(id, rooms[index % rooms.len()]).unwrap();
            assert_invariant(&coordinator);
        }

        // Switch some around, disconnect others, re-check every step
        coordinator.join_room(1, "beta").unwrap();
        assert_invariant(&coordinator);
        coordinator.disconnect(2);
        assert_invariant(&coordinator);
        coordinator.disconnect(2); // duplicate
        assert_invariant(&coordinator);
        coordinator.join_room(3, "alpha").unwrap();
        assert_invariant(&coordinator);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Register(u64),
            Login(u64),
            Join(u64, usize),
            Disconnect(u64),
        }

        const ROOMS: [&str; 4] = ["general", "alpha", "beta", "gamma"];

        fn arbitrary_op() -> impl Strategy<Value = Op> {
            let id = 1u64..6;
            prop_oneof![
                id.clone().prop_map(Op::Register),
                id.clone().prop_map(Op::Login),
                (id.clone(), 0usize..ROOMS.len()).prop_map(|(id, room)| Op::Join(id, room)),
                id.prop_map(Op::Disconnect),
            ]
        }

        proptest! {
            // The cross-structure invariant must survive arbitrary operation
            // sequences, including ones that violate preconditions.
            #[test]
            fn member_sets_never_drift(ops in prop::collection::vec(arbitrary_op(), 0..64)) {
                let mut coordinator = PresenceCoordinator::new();

                for op in ops {
                    match op {
                        Op::Register(id) => {
                            let _ = coordinator.register(id);
                        },
                        Op::Login(id) => {
                            let _ = coordinator.login(id, format!("user-{id}").as_str());
                        },
                        Op::Join(id, room) => {
                            let _ = coordinator.join_room(id, ROOMS[room]);
                        },
                        Op::Disconnect(id) => {
                            coordinator.disconnect(id);
                        },
                    }

                    assert_invariant(&coordinator);

                    // Directory counts always match live member sets
                    for entry in coordinator.room_listing() {
                        prop_assert_eq!(
                            entry.member_count,
                            coordinator.members_of(entry.id).count()
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn member_names_are_sorted() {
        let mut coordinator = PresenceCoordinator::new();
        for (id, name) in [(1, "zoe"), (2, "adam"), (3, "mia")] {
            coordinator.register(id).unwrap();
            coordinator.login(id, name).unwrap();
        }

        assert_eq!(coordinator.member_names(DEFAULT_ROOM_ID), vec![
            "adam".to_string(),
            "mia".to_string(),
            "zoe".to_string()
        ]);
    }
}
