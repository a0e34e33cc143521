//! Session layer state machine.
//!
//! Manages connection lifecycle, heartbeats, timeouts, and graceful shutdown.
//! Uses the action pattern: methods take time as input and return actions for
//! the driver to execute. This keeps the state machine pure (no I/O) and
//! makes testing straightforward.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  Hello   ┌──────────┐   HelloReply    ┌───────┐
//! │ Init │─────────>│ Pending  │────────────────>│ Ready │
//! └──────┘          └──────────┘                 └───────┘
//!                        │                           │
//!                        │ Timeout/Error             │ Goodbye/Timeout
//!                        ↓                           ↓
//!                   ┌────────┐                  ┌────────┐
//!                   │ Closed │<─────────────────│ Closed │
//!                   └────────┘                  └────────┘
//! ```

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use roomcast_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::session::{Goodbye, Hello, HelloReply},
};

use crate::error::ConnectionError;

/// Time allowed to complete the Hello/HelloReply handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time allowed without any activity before the connection is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the connection sends Ping frames while ready.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Actions returned by the connection state machine.
///
/// The driver (test harness or production server) executes these actions:
/// - `SendFrame`: Serialize and send the frame over the transport
/// - `Close`: Close the connection with the given reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send this frame to the peer
    SendFrame(Frame),

    /// Close the connection with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state - no handshake started
    Init,
    /// Hello sent, waiting for HelloReply (client side)
    Pending,
    /// Handshake complete, session established
    Ready,
    /// Connection closed (graceful or error)
    Closed,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for completing the handshake
    pub handshake_timeout: Duration,
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < idle_timeout / 2)
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Connection state machine.
///
/// Manages lifecycle, timeouts, and heartbeats for a single connection.
///
/// This is a pure state machine - no I/O, no Environment storage. Time is
/// passed as a parameter to methods that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Current state
    state: ConnectionState,
    /// Configuration
    config: ConnectionConfig,
    /// Last activity timestamp
    last_activity: I,
    /// Last heartbeat sent timestamp
    last_heartbeat: Option<I>,
    /// Session ID (assigned by the server)
    session_id: Option<u64>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Init`] state.
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Init,
            config,
            last_activity: now,
            last_heartbeat: None,
            session_id: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Session ID assigned by the server. `None` before the handshake.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Assign the session ID (server use only, before handling Hello).
    ///
    /// The server generates a random session ID and sets it before handling
    /// an incoming Hello frame. The state machine uses this ID when
    /// constructing the HelloReply.
    pub fn set_session_id(&mut self, session_id: u64) {
        self.session_id = Some(session_id);
    }

    /// Initiate the handshake (client use).
    ///
    /// Transitions to Pending state and returns a SendFrame(Hello) action.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidState`] if not in Init state
    pub fn send_hello(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Init {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "send_hello".to_string(),
            });
        }

        self.state = ConnectionState::Pending;
        self.last_activity = now;

        let hello = Payload::Hello(Hello { version: 1, capabilities: vec![] });
        let frame = hello.into_frame(FrameHeader::new(Opcode::Hello))?;

        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Mark the connection as closed.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Mark the connection as active (call when receiving frames).
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Elapsed time since last activity, if the timeout is exceeded. `None`
    /// otherwise.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let elapsed = now - self.last_activity;

        let timeout = match self.state {
            ConnectionState::Pending => self.config.handshake_timeout,
            ConnectionState::Ready => self.config.idle_timeout,
            _ => return None,
        };

        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// Process periodic maintenance (timeouts and heartbeats).
    ///
    /// Call this periodically to trigger timeout detection and heartbeat
    /// sending.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(elapsed) = self.check_timeout(now) {
            let reason = match self.state {
                ConnectionState::Pending => format!("handshake timeout after {elapsed:?}"),
                ConnectionState::Ready => format!("idle timeout after {elapsed:?}"),
                _ => "timeout".to_string(),
            };

            self.close();
            actions.push(ConnectionAction::Close { reason });
            return actions;
        }

        if self.state == ConnectionState::Ready {
            let should_send = match self.last_heartbeat {
                None => true, // Never sent a heartbeat
                Some(last) => {
                    let elapsed = now - last;
                    elapsed >= self.config.heartbeat_interval
                },
            };

            if should_send {
                let ping_frame = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());

                actions.push(ConnectionAction::SendFrame(ping_frame));
                self.last_heartbeat = Some(now);
                self.last_activity = now;
            }
        }

        actions
    }

    /// Process an incoming session-layer frame and update state.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::UnexpectedFrame`] if the opcode is invalid for
    ///   the current state
    /// - [`ConnectionError::InvalidPayload`] if CBOR deserialization yields a
    ///   mismatched payload type
    /// - [`ConnectionError::UnsupportedVersion`] if the Hello version ≠ 1
    /// - [`ConnectionError::Protocol`] if the server session_id is not set
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.last_activity = now;

        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(ConnectionError::UnexpectedFrame {
                state: self.state,
                opcode: frame.header.opcode(),
            });
        };

        match (self.state, opcode) {
            // Server: receive Hello in Init state
            (ConnectionState::Init, Opcode::Hello) => {
                let payload = Payload::from_frame(frame)?;

                match payload {
                    Payload::Hello(hello) => {
                        if hello.version != 1 {
                            return Err(ConnectionError::UnsupportedVersion(hello.version));
                        }

                        let Some(session_id) = self.session_id else {
                            return Err(ConnectionError::Protocol(
                                "server must set session_id before handling Hello".to_string(),
                            ));
                        };

                        debug_assert_ne!(session_id, 0);

                        self.state = ConnectionState::Ready;

                        let reply =
                            Payload::HelloReply(HelloReply { session_id, capabilities: vec![] });
                        let frame = reply.into_frame(FrameHeader::new(Opcode::HelloReply))?;

                        Ok(vec![ConnectionAction::SendFrame(frame)])
                    },
                    _ => Err(ConnectionError::InvalidPayload {
                        expected: "Hello",
                        opcode: Opcode::Hello.to_u16(),
                    }),
                }
            },

            // Client: receive HelloReply in Pending state
            (ConnectionState::Pending, Opcode::HelloReply) => {
                let payload = Payload::from_frame(frame)?;

                match payload {
                    Payload::HelloReply(reply) => {
                        self.state = ConnectionState::Ready;
                        self.session_id = Some(reply.session_id);

                        Ok(vec![]) // No response needed
                    },
                    _ => Err(ConnectionError::InvalidPayload {
                        expected: "HelloReply",
                        opcode: Opcode::HelloReply.to_u16(),
                    }),
                }
            },

            // Both: Ping when Ready
            (ConnectionState::Ready, Opcode::Ping) => {
                let pong_frame = Frame::new(FrameHeader::new(Opcode::Pong), Vec::new());
                Ok(vec![ConnectionAction::SendFrame(pong_frame)])
            },

            // Both: Pong when Ready
            (ConnectionState::Ready, Opcode::Pong) => {
                // Activity already updated
                Ok(vec![])
            },

            // Both: Goodbye (any state except Closed)
            (state, Opcode::Goodbye) if state != ConnectionState::Closed => {
                let payload = Payload::from_frame(frame)?;

                let reason = match payload {
                    Payload::Goodbye(goodbye) => goodbye.reason,
                    _ => {
                        return Err(ConnectionError::InvalidPayload {
                            expected: "Goodbye",
                            opcode: Opcode::Goodbye.to_u16(),
                        });
                    },
                };

                self.state = ConnectionState::Closed;

                let reply = Payload::Goodbye(Goodbye { reason: "ack".to_string() });
                let frame = reply.into_frame(FrameHeader::new(Opcode::Goodbye))?;

                Ok(vec![ConnectionAction::SendFrame(frame), ConnectionAction::Close {
                    reason: format!("peer goodbye: {reason}"),
                }])
            },

            // Both: Error frame
            (_, Opcode::Error) => {
                self.state = ConnectionState::Closed;

                Ok(vec![ConnectionAction::Close { reason: "peer error".to_string() }])
            },

            // Default: unexpected frame for the current state
            (state, opcode) => {
                Err(ConnectionError::UnexpectedFrame { state, opcode: opcode.to_u16() })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_connection(t0: Instant) -> Connection {
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.send_hello(t0).unwrap();

        let reply = Payload::HelloReply(HelloReply { session_id: 12345, capabilities: vec![] });
        let reply_frame = reply.into_frame(FrameHeader::new(Opcode::HelloReply)).unwrap();
        conn.handle_frame(&reply_frame, t0).unwrap();

        conn
    }

    #[test]
    fn connection_lifecycle() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        // Initial state
        assert_eq!(conn.state(), ConnectionState::Init);
        assert_eq!(conn.session_id(), None);

        // Send Hello
        let actions = conn.send_hello(t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Pending);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ConnectionAction::SendFrame(_)));

        // Receive HelloReply
        let reply = Payload::HelloReply(HelloReply { session_id: 12345, capabilities: vec![] });
        let reply_frame = reply.into_frame(FrameHeader::new(Opcode::HelloReply)).unwrap();
        let actions = conn.handle_frame(&reply_frame, t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(conn.session_id(), Some(12345));
        assert!(actions.is_empty());

        // Close
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn server_handle_hello() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        // Server sets session ID
        conn.set_session_id(0x1234_5678_9ABC_DEF0);

        let hello = Payload::Hello(Hello { version: 1, capabilities: vec![] });
        let hello_frame = hello.into_frame(FrameHeader::new(Opcode::Hello)).unwrap();

        // Handle Hello - should return HelloReply action
        let actions = conn.handle_frame(&hello_frame, t0).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(conn.session_id(), Some(0x1234_5678_9ABC_DEF0));

        match &actions[0] {
            ConnectionAction::SendFrame(frame) => {
                assert_eq!(frame.header.opcode_enum(), Some(Opcode::HelloReply));

                let payload = Payload::from_frame(frame).unwrap();
                match payload {
                    Payload::HelloReply(reply) => {
                        assert_eq!(reply.session_id, 0x1234_5678_9ABC_DEF0);
                    },
                    _ => panic!("Expected HelloReply payload"),
                }
            },
            ConnectionAction::Close { .. } => panic!("Expected SendFrame action"),
        }
    }

    #[test]
    fn server_hello_without_session_id() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        // Don't set session ID - should fail

        let hello = Payload::Hello(Hello { version: 1, capabilities: vec![] });
        let hello_frame = hello.into_frame(FrameHeader::new(Opcode::Hello)).unwrap();

        let result = conn.handle_frame(&hello_frame, t0);
        assert!(matches!(result, Err(ConnectionError::Protocol(_))));
    }

    #[test]
    fn server_hello_unsupported_version() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.set_session_id(12345);

        let hello = Payload::Hello(Hello { version: 99, capabilities: vec![] });
        let hello_frame = hello.into_frame(FrameHeader::new(Opcode::Hello)).unwrap();

        let result = conn.handle_frame(&hello_frame, t0);
        assert!(matches!(result, Err(ConnectionError::UnsupportedVersion(99))));
    }

    #[test]
    fn handle_ping_responds_with_pong() {
        let t0 = Instant::now();
        let mut conn = ready_connection(t0);

        let ping_frame = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());

        let actions = conn.handle_frame(&ping_frame, t0).unwrap();
        assert_eq!(actions.len(), 1);

        match &actions[0] {
            ConnectionAction::SendFrame(frame) => {
                assert_eq!(frame.header.opcode_enum(), Some(Opcode::Pong));
                assert_eq!(frame.payload.len(), 0);
            },
            ConnectionAction::Close { .. } => panic!("Expected SendFrame action with Pong"),
        }
    }

    #[test]
    fn handle_pong_updates_activity() {
        let t0 = Instant::now();
        let mut conn = ready_connection(t0);

        let pong_frame = Frame::new(FrameHeader::new(Opcode::Pong), Vec::new());

        let t1 = t0 + Duration::from_secs(30);
        let actions = conn.handle_frame(&pong_frame, t1).unwrap();
        assert!(actions.is_empty());

        // Activity was updated at t1: 40s later is only 40s from last
        // activity, under the 60s idle timeout
        let t2 = t1 + Duration::from_secs(40);
        assert!(conn.check_timeout(t2).is_none());
    }

    #[test]
    fn handle_ping_before_ready() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        let ping_frame = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());

        // Should fail - handshake not complete
        let result = conn.handle_frame(&ping_frame, t0);
        assert!(matches!(result, Err(ConnectionError::UnexpectedFrame { .. })));
    }

    #[test]
    fn tick_sends_heartbeat_when_ready() {
        let t0 = Instant::now();
        let mut conn = ready_connection(t0);

        // First tick sends the initial heartbeat
        let actions = conn.tick(t0);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            ConnectionAction::SendFrame(frame) => {
                assert_eq!(frame.header.opcode_enum(), Some(Opcode::Ping));
            },
            ConnectionAction::Close { .. } => panic!("Expected heartbeat Ping"),
        }

        // Immediately after, no heartbeat is due
        let actions = conn.tick(t0 + Duration::from_secs(1));
        assert!(actions.is_empty());

        // After the interval, the next heartbeat fires
        let actions = conn.tick(t0 + DEFAULT_HEARTBEAT_INTERVAL + Duration::from_secs(1));
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn tick_closes_idle_connection() {
        let t0 = Instant::now();
        let mut conn = ready_connection(t0);

        let late = t0 + DEFAULT_IDLE_TIMEOUT + Duration::from_secs(1);
        let actions = conn.tick(late);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ConnectionAction::Close { .. }));
    }

    #[test]
    fn tick_closes_stalled_handshake() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.send_hello(t0).unwrap();

        let late = t0 + DEFAULT_HANDSHAKE_TIMEOUT + Duration::from_secs(1);
        let actions = conn.tick(late);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(actions[0], ConnectionAction::Close { .. }));
    }

    #[test]
    fn handle_goodbye_ready() {
        let t0 = Instant::now();
        let mut conn = ready_connection(t0);

        let goodbye = Payload::Goodbye(Goodbye { reason: "client shutdown".to_string() });
        let goodbye_frame = goodbye.into_frame(FrameHeader::new(Opcode::Goodbye)).unwrap();

        let actions = conn.handle_frame(&goodbye_frame, t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(actions.len(), 2);

        // Should send Goodbye ack and Close
        assert!(matches!(actions[0], ConnectionAction::SendFrame(_)));
        assert!(matches!(actions[1], ConnectionAction::Close { .. }));
    }

    #[test]
    fn handle_goodbye_pending() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.send_hello(t0).unwrap();

        let goodbye = Payload::Goodbye(Goodbye { reason: "timeout".to_string() });
        let goodbye_frame = goodbye.into_frame(FrameHeader::new(Opcode::Goodbye)).unwrap();

        let actions = conn.handle_frame(&goodbye_frame, t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn handle_error_frame() {
        let t0 = Instant::now();
        let mut conn = ready_connection(t0);

        let error_frame = Frame::new(FrameHeader::new(Opcode::Error), Vec::new());

        let actions = conn.handle_frame(&error_frame, t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ConnectionAction::Close { .. }));
    }
}
