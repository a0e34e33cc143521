//! Driver error types.
//!
//! Strongly-typed errors for the pure server driver. Everything here is
//! scoped to a single event: the runtime logs the failure and keeps serving
//! every other connection.

use std::fmt;

use crate::presence::PresenceError;

/// Errors that can occur while the driver processes an event.
#[derive(Debug)]
pub enum DriverError {
    /// Frame received for a session the driver does not know.
    ///
    /// Usually a race against disconnect: the connection task delivered a
    /// frame after the close event was processed. Harmless to everyone else.
    SessionNotFound(u64),

    /// Session state machine rejected a frame.
    ///
    /// A protocol violation on that connection (wrong frame for its state,
    /// bad handshake). Fatal to that connection only.
    Connection {
        /// Session that failed
        session_id: u64,
        /// Error message
        reason: String,
    },

    /// Presence operation failed.
    ///
    /// A logic error (unknown connection, double login, anonymous join).
    /// The operation was aborted and no notification was sent.
    Presence(PresenceError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::Connection { session_id, reason } => {
                write!(f, "connection error for session {session_id}: {reason}")
            },
            Self::Presence(err) => write!(f, "presence error: {err}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Presence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PresenceError> for DriverError {
    fn from(err: PresenceError) -> Self {
        Self::Presence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;

    #[test]
    fn driver_error_display() {
        let err = DriverError::SessionNotFound(42);
        assert_eq!(err.to_string(), "session not found: 42");

        let err = DriverError::Connection { session_id: 1, reason: "timeout".to_string() };
        assert_eq!(err.to_string(), "connection error for session 1: timeout");

        let err = DriverError::Presence(PresenceError::Registry(
            RegistryError::UnknownConnection(7),
        ));
        assert_eq!(err.to_string(), "presence error: unknown connection: 7");
    }
}
