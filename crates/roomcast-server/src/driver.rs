//! Server driver.
//!
//! Ties together the per-connection session state machines, the presence
//! coordinator (registry + directory mutations and notification sets), and
//! the account registry. Pure logic: events in, actions out, no I/O. The
//! production runtime in `lib.rs` feeds it transport events and executes the
//! returned actions; tests feed it events directly and assert on actions.

use std::collections::HashMap;

use roomcast_core::{
    connection::{Connection, ConnectionAction, ConnectionConfig},
    env::Environment,
};
use roomcast_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
    payloads::{
        account::{SignInReply, SignUpReply},
        chat::ReceiveMessage,
        presence::{RoomInfo, RoomList, UserInfo, UserList},
    },
};

use crate::{
    accounts::AccountRegistry,
    presence::{DEFAULT_ROOM_ID, PresenceCoordinator, PresenceUpdate},
    server_error::DriverError,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connection configuration (timeouts, heartbeat interval)
    pub connection: ConnectionConfig,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { connection: ConnectionConfig::default(), max_connections: 10_000 }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the transport runtime: connection lifecycle, decoded
/// inbound frames, and the periodic maintenance tick.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Connection that sent the frame
        session_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick for timeout checking
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code. Broadcast actions resolve
/// their recipient sets at execution time, under the same lock that
/// serialized the mutation that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a frame to a specific session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Broadcast a frame to every current member of a room
    BroadcastToRoom {
        /// Target room ID
        room: String,
        /// Frame to broadcast
        frame: Frame,
    },

    /// Broadcast a frame to every registered connection
    BroadcastToAll {
        /// Frame to broadcast
        frame: Frame,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Format Unix milliseconds as an RFC 3339 timestamp (UTC, millisecond
/// precision), the format stamped onto outbound chat messages.
fn rfc3339_timestamp(unix_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(i64::try_from(unix_ms).unwrap_or(i64::MAX))
        .map(|datetime| datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| "1970-01-01T00:00:00.000Z".to_string())
}

/// Action-based server driver.
///
/// Orchestrates connection lifecycle, presence operations, chat fanout, and
/// the account service.
pub struct ServerDriver<E>
where
    E: Environment,
{
    /// Connection state machines (session_id → Connection)
    connections: HashMap<u64, Connection<E::Instant>>,
    /// Presence core: registry + directory behind one owner
    presence: PresenceCoordinator,
    /// Account credential store
    accounts: AccountRegistry,
    /// Environment (time, RNG, wall clock)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment,
{
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self {
            connections: HashMap::new(),
            presence: PresenceCoordinator::new(),
            accounts: AccountRegistry::new(),
            env,
            config,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    ///
    /// # Errors
    ///
    /// - [`DriverError`] for failures scoped to one connection; the runtime
    ///   logs these and keeps serving everyone else
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame_received(session_id, &frame)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason))
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        session_id: u64,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();

        if self.connections.len() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        // A reused session ID is fatal to this connection only; the
        // registered one keeps its session.
        if let Err(e) = self.presence.register(session_id) {
            return Ok(vec![
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("rejecting connection: {e}"),
                },
                ServerAction::CloseConnection {
                    session_id,
                    reason: "duplicate session id".to_string(),
                },
            ]);
        }

        let mut conn = Connection::new(now, self.config.connection.clone());
        conn.set_session_id(session_id);
        self.connections.insert(session_id, conn);

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {session_id} accepted"),
        }])
    }

    /// Handle a frame received from a connection.
    fn handle_frame_received(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();

        if !self.connections.contains_key(&session_id) {
            return Err(DriverError::SessionNotFound(session_id));
        }

        let Some(opcode) = frame.header.opcode_enum() else {
            return Ok(vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!(
                    "unknown opcode {:#06x} from session {session_id}, frame dropped",
                    frame.header.opcode()
                ),
            }]);
        };

        match opcode {
            // Session-layer frames go through the state machine
            Opcode::Hello | Opcode::Ping | Opcode::Pong | Opcode::Goodbye | Opcode::Error => {
                let conn = self
                    .connections
                    .get_mut(&session_id)
                    .ok_or(DriverError::SessionNotFound(session_id))?;

                let conn_actions = conn.handle_frame(frame, now).map_err(|e| {
                    DriverError::Connection { session_id, reason: e.to_string() }
                })?;

                Ok(conn_actions
                    .into_iter()
                    .map(|action| match action {
                        ConnectionAction::SendFrame(f) => {
                            ServerAction::SendToSession { session_id, frame: f }
                        },
                        ConnectionAction::Close { reason } => {
                            ServerAction::CloseConnection { session_id, reason }
                        },
                    })
                    .collect())
            },

            _ => {
                if let Some(conn) = self.connections.get_mut(&session_id) {
                    conn.update_activity(now);
                }

                Ok(match opcode {
                    Opcode::SignUp => self.handle_sign_up(session_id, frame),
                    Opcode::SignIn => self.handle_sign_in(session_id, frame),
                    Opcode::Login => self.handle_login(session_id, frame),
                    Opcode::JoinRoom => self.handle_join_room(session_id, frame),
                    Opcode::SendMessage => self.handle_send_message(session_id, frame),
                    // Server-to-client opcodes arriving inbound
                    _ => vec![ServerAction::Log {
                        level: LogLevel::Warn,
                        message: format!(
                            "unexpected opcode {opcode:?} from session {session_id}, frame dropped"
                        ),
                    }],
                })
            },
        }
    }

    /// Handle an account creation request.
    fn handle_sign_up(&mut self, session_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let request = match Payload::from_frame(frame) {
            Ok(Payload::SignUp(request)) => request,
            _ => return Self::dropped_payload(session_id, "SignUp"),
        };

        match self.accounts.sign_up(request.name.clone(), request.email.clone(), request.password)
        {
            Ok(()) => self.reply(session_id, frame, Payload::SignUpReply(SignUpReply {
                name: request.name,
            })),
            Err(e) => {
                let mut actions = self.reply(
                    session_id,
                    frame,
                    Payload::Error(ErrorPayload::duplicate_email(request.email)),
                );
                actions.push(ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("sign-up rejected for session {session_id}: {e}"),
                });
                actions
            },
        }
    }

    /// Handle a credential check request.
    fn handle_sign_in(&mut self, session_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let request = match Payload::from_frame(frame) {
            Ok(Payload::SignIn(request)) => request,
            _ => return Self::dropped_payload(session_id, "SignIn"),
        };

        match self.accounts.authenticate(&request.email, &request.password) {
            Ok(name) => {
                let name = name.to_string();
                // Opaque token; the presence core attaches no meaning to it
                let token = format!("{:032x}", self.env.random_u128());
                self.reply(session_id, frame, Payload::SignInReply(SignInReply { token, name }))
            },
            Err(e) => {
                let mut actions = self.reply(
                    session_id,
                    frame,
                    Payload::Error(ErrorPayload::invalid_credentials()),
                );
                actions.push(ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("sign-in rejected for session {session_id}: {e}"),
                });
                actions
            },
        }
    }

    /// Handle a presence login: name the connection, auto-join the default
    /// room, and fan out the resulting notifications.
    fn handle_login(&mut self, session_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let login = match Payload::from_frame(frame) {
            Ok(Payload::Login(login)) => login,
            _ => return Self::dropped_payload(session_id, "Login"),
        };

        if login.name.is_empty() {
            return vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("empty display name from session {session_id}, login dropped"),
            }];
        }

        match self.presence.login(session_id, &login.name) {
            Ok(updates) => self.notification_actions(updates),
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("login rejected for session {session_id}: {e}"),
            }],
        }
    }

    /// Handle a room switch.
    fn handle_join_room(&mut self, session_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let join = match Payload::from_frame(frame) {
            Ok(Payload::JoinRoom(join)) => join,
            _ => return Self::dropped_payload(session_id, "JoinRoom"),
        };

        match self.presence.join_room(session_id, &join.room) {
            Ok(updates) => self.notification_actions(updates),
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("join rejected for session {session_id}: {e}"),
            }],
        }
    }

    /// Handle a chat message: resolve the sender and target room, stamp the
    /// timestamp, and broadcast to the room's current members.
    fn handle_send_message(&mut self, session_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let message = match Payload::from_frame(frame) {
            Ok(Payload::SendMessage(message)) => message,
            _ => return Self::dropped_payload(session_id, "SendMessage"),
        };

        // The sender name comes from session state, never from the payload
        let Some(sender) = self.presence.display_name(session_id).map(str::to_string) else {
            return vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("message from anonymous session {session_id} dropped"),
            }];
        };

        let room = message.room.unwrap_or_else(|| DEFAULT_ROOM_ID.to_string());
        let stamped = Payload::ReceiveMessage(ReceiveMessage {
            sender,
            message: message.message,
            room: room.clone(),
            timestamp: rfc3339_timestamp(self.env.wall_clock_ms()),
        });

        match stamped.into_frame(FrameHeader::new(Opcode::ReceiveMessage)) {
            Ok(frame) => vec![ServerAction::BroadcastToRoom { room, frame }],
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode message broadcast: {e}"),
            }],
        }
    }

    /// Handle a connection being closed.
    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        if let Some(mut conn) = self.connections.remove(&session_id) {
            conn.close();
        }

        // Presence cleanup is idempotent: a duplicate close event finds
        // nothing to vacate and produces no notifications.
        let updates = self.presence.disconnect(session_id);
        let mut actions = self.notification_actions(updates);

        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("connection {session_id} closed: {reason}"),
        });

        actions
    }

    /// Handle the periodic tick for timeout checking and heartbeats.
    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let session_ids: Vec<u64> = self.connections.keys().copied().collect();

        for session_id in session_ids {
            if let Some(conn) = self.connections.get_mut(&session_id) {
                for action in conn.tick(now) {
                    match action {
                        ConnectionAction::SendFrame(f) => {
                            actions.push(ServerAction::SendToSession { session_id, frame: f });
                        },
                        ConnectionAction::Close { reason } => {
                            actions.push(ServerAction::CloseConnection { session_id, reason });
                        },
                    }
                }
            }
        }

        actions
    }

    /// Convert presence notifications into broadcast actions.
    ///
    /// Member lists and directory snapshots are recomputed here, after the
    /// mutation that produced the updates, never cached.
    fn notification_actions(&self, updates: Vec<PresenceUpdate>) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        for update in updates {
            match update {
                PresenceUpdate::RoomMembers { room } => {
                    let users = self
                        .presence
                        .member_names(&room)
                        .into_iter()
                        .map(|name| UserInfo { name })
                        .collect();
                    let payload = Payload::UserList(UserList { room: room.clone(), users });

                    match payload.into_frame(FrameHeader::new(Opcode::UserList)) {
                        Ok(frame) => actions.push(ServerAction::BroadcastToRoom { room, frame }),
                        Err(e) => actions.push(ServerAction::Log {
                            level: LogLevel::Error,
                            message: format!("failed to encode user list for {room}: {e}"),
                        }),
                    }
                },

                PresenceUpdate::Directory => {
                    let rooms = self
                        .presence
                        .room_listing()
                        .map(|entry| RoomInfo {
                            id: entry.id.to_string(),
                            name: entry.name.to_string(),
                            user_count: u32::try_from(entry.member_count).unwrap_or(u32::MAX),
                        })
                        .collect();
                    let payload = Payload::RoomList(RoomList { rooms });

                    match payload.into_frame(FrameHeader::new(Opcode::RoomList)) {
                        Ok(frame) => actions.push(ServerAction::BroadcastToAll { frame }),
                        Err(e) => actions.push(ServerAction::Log {
                            level: LogLevel::Error,
                            message: format!("failed to encode room list: {e}"),
                        }),
                    }
                },
            }
        }

        actions
    }

    /// Build a direct reply, echoing the request nonce from the inbound
    /// frame so clients can correlate responses.
    fn reply(&self, session_id: u64, request: &Frame, payload: Payload) -> Vec<ServerAction> {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_request_id(request.header.request_id());

        match payload.into_frame(header) {
            Ok(frame) => vec![ServerAction::SendToSession { session_id, frame }],
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode response for session {session_id}: {e}"),
            }],
        }
    }

    /// Actions for a malformed payload: the event is dropped with a warning
    /// and the connection stays alive.
    fn dropped_payload(session_id: u64, expected: &str) -> Vec<ServerAction> {
        vec![ServerAction::Log {
            level: LogLevel::Warn,
            message: format!("malformed {expected} payload from session {session_id}, dropped"),
        }]
    }

    /// All sessions currently in a room (for broadcast execution).
    pub fn sessions_in_room(&self, room: &str) -> impl Iterator<Item = u64> + '_ {
        self.presence.members_of(room)
    }

    /// All registered sessions (for whole-server broadcast execution).
    pub fn session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.presence.session_ids()
    }

    /// Number of live connection state machines.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Read access to the presence core.
    #[must_use]
    pub fn presence(&self) -> &PresenceCoordinator {
        &self.presence
    }
}

impl<E> std::fmt::Debug for ServerDriver<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.connections.len())
            .field("registered_sessions", &self.presence.connection_count())
            .finish()
    }
}
