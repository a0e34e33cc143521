//! Connection registry for per-connection session state.
//!
//! The registry maps a session ID to the connection's presence attributes:
//! its display name (set once by a Login event) and its current room. The
//! current room lives here as an explicit field so the previous room is
//! always derived from session state at call time, never from transport
//! subscription state.
//!
//! Only the presence coordinator mutates this structure.

use std::collections::HashMap;

use thiserror::Error;

/// Errors from registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The transport handed out a session ID that is already registered.
    /// Fatal to that connection's session only.
    #[error("duplicate connection: {0}")]
    DuplicateConnection(u64),

    /// An operation referenced a session ID that is not registered. A logic
    /// error: the caller logs it and aborts the operation.
    #[error("unknown connection: {0}")]
    UnknownConnection(u64),
}

/// Presence state for one registered connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Display name, absent until the connection logs in.
    pub name: Option<String>,
    /// Identifier of the room the connection is currently in, if any.
    /// Exactly one room at a time once the first join happens.
    pub room: Option<String>,
}

/// Registry of live connections and their session state.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Session ID → presence state
    sessions: HashMap<u64, Session>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with no name and no room.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateConnection`] if the ID is already
    ///   registered. The transport guarantees fresh IDs, so this indicates a
    ///   bug upstream.
    pub fn register(&mut self, session_id: u64) -> Result<(), RegistryError> {
        if self.sessions.contains_key(&session_id) {
            return Err(RegistryError::DuplicateConnection(session_id));
        }

        self.sessions.insert(session_id, Session::default());
        Ok(())
    }

    /// Attach or overwrite the display name.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if the session is not
    ///   registered
    pub fn set_name(
        &mut self,
        session_id: u64,
        name: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::UnknownConnection(session_id))?;
        session.name = Some(name.into());
        Ok(())
    }

    /// Set or clear the session's current room.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if the session is not
    ///   registered
    pub fn set_room(
        &mut self,
        session_id: u64,
        room: Option<String>,
    ) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::UnknownConnection(session_id))?;
        session.room = room;
        Ok(())
    }

    /// Current session state.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if the session is not
    ///   registered
    pub fn get(&self, session_id: u64) -> Result<&Session, RegistryError> {
        self.sessions.get(&session_id).ok_or(RegistryError::UnknownConnection(session_id))
    }

    /// Remove a session, returning its final state if it existed.
    ///
    /// Idempotent: unregistering an already-unregistered ID returns `None`
    /// and changes nothing, which absorbs duplicate disconnect events.
    pub fn unregister(&mut self, session_id: u64) -> Option<Session> {
        self.sessions.remove(&session_id)
    }

    /// Check whether a session is registered.
    #[must_use]
    pub fn contains(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// All registered session IDs.
    pub fn session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.sessions.keys().copied()
    }

    /// Total number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
