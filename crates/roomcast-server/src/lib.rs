//! Roomcast production server.
//!
//! Real-time presence-and-broadcast service: clients connect over QUIC, join
//! named rooms, and receive messages sent by other members of the same room.
//!
//! # Architecture
//!
//! The logic lives in [`ServerDriver`], which is pure: transport events in,
//! actions out, no I/O. This crate's runtime glue wraps it with Quinn QUIC
//! and Tokio. All driver access goes through one async mutex, which is the
//! single critical section the presence model requires: every mutation of
//! the connection registry and room directory runs to completion before the
//! next event is processed, and broadcast recipient sets are resolved under
//! that same lock.
//!
//! # Components
//!
//! - [`ServerDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`PresenceCoordinator`]: registry + directory behind a single owner
//! - [`Server`]: production runtime that executes driver actions
//! - [`QuicTransport`]: QUIC transport via the Quinn library
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod accounts;
mod directory;
mod driver;
mod error;
mod presence;
mod registry;
mod server_error;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::BytesMut;
use roomcast_core::env::Environment;
use roomcast_proto::{Frame, FrameHeader};
use tokio::sync::RwLock;

pub use crate::accounts::{AccountError, AccountRegistry};
pub use crate::directory::{RoomDirectory, RoomEntry};
pub use crate::driver::{
    LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent,
};
pub use crate::error::ServerError;
pub use crate::presence::{
    DEFAULT_ROOM_ID, DEFAULT_ROOM_NAME, PresenceCoordinator, PresenceError, PresenceUpdate,
};
pub use crate::registry::{ConnectionRegistry, RegistryError, Session};
pub use crate::server_error::DriverError;
pub use crate::system_env::SystemEnv;
pub use crate::transport::{QuicConnection, QuicTransport};

/// How often the maintenance tick runs (heartbeats, timeout checks).
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Shared state for all connections.
///
/// Holds the connection and outbound-stream maps used to execute send and
/// broadcast actions.
struct SharedState {
    /// Map of session ID to QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuicConnection>>,
    /// Map of session ID to the persistent outbound stream. All pushes to a
    /// client go through this single stream, which preserves ordering.
    outbound_streams: RwLock<HashMap<u64, tokio::sync::Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Driver configuration (timeouts, limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
        }
    }
}

/// Production roomcast server.
///
/// Wraps [`ServerDriver`] with Quinn QUIC transport and the system
/// environment.
pub struct Server {
    /// The action-based server driver
    driver: ServerDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuicTransport,
    /// Environment
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] / [`ServerError::Transport`] if the
    ///   transport cannot be set up
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);

        let transport =
            QuicTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { driver, transport, env })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Runs until the endpoint is closed or a fatal accept error occurs.
    ///
    /// # Errors
    ///
    /// - [`ServerError`] only for fatal endpoint failures; per-connection
    ///   faults are logged and absorbed
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver = Arc::new(tokio::sync::Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        // Maintenance tick: heartbeats out, idle connections closed
        {
            let driver = Arc::clone(&driver);
            let shared = Arc::clone(&shared);
            let env = env.clone();

            tokio::spawn(async move {
                loop {
                    env.sleep(TICK_INTERVAL).await;

                    let mut driver = driver.lock().await;
                    match driver.process_event(ServerEvent::Tick) {
                        Ok(actions) => execute_actions(&driver, actions, &shared).await,
                        Err(e) => tracing::warn!("Tick processing error: {}", e),
                    }
                }
            });
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, env).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Transport`] if the socket address cannot be read
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single QUIC connection from accept to teardown.
///
/// Teardown always runs the `ConnectionClosed` event, so a connection that
/// drops without a Goodbye is still removed from its room and the remaining
/// members are notified.
async fn handle_connection(
    conn: QuicConnection,
    driver: Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    // Session IDs come from the crypto RNG and are never reused while the
    // process runs; the driver treats a collision as fatal to the new
    // connection only.
    let session_id = env.random_u64();

    tracing::debug!("New connection {} from {}", session_id, conn.remote_addr());

    let outbound_stream = conn
        .open_uni()
        .await
        .map_err(|e| ServerError::Internal(format!("failed to open outbound stream: {e}")))?;

    {
        let mut connections = shared.connections.write().await;
        connections.insert(session_id, conn.clone());
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.insert(session_id, tokio::sync::Mutex::new(outbound_stream));
    }

    {
        let mut driver = driver.lock().await;
        match driver.process_event(ServerEvent::ConnectionAccepted { session_id }) {
            Ok(actions) => execute_actions(&driver, actions, &shared).await,
            Err(e) => tracing::warn!("Accept processing error: {}", e),
        }
    }

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(session_id, send, recv, driver, &shared).await {
                        tracing::debug!("Stream error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::debug!("Connection closed: {}", e);
                break;
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&session_id);
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.remove(&session_id);
    }

    {
        let mut driver = driver.lock().await;
        match driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        }) {
            Ok(actions) => execute_actions(&driver, actions, &shared).await,
            Err(e) => tracing::warn!("Close processing error: {}", e),
        }
    }

    Ok(())
}

/// Handle a single inbound bidirectional stream.
///
/// Frames are length-prefixed by their header: read 16 header bytes, then
/// exactly the payload the header claims. Unreadable framing tears the
/// stream down; a frame that decodes but fails event processing is logged
/// and dropped, and the connection lives on.
async fn handle_stream(
    session_id: u64,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    drop(send); // replies go through the persistent outbound stream

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        match recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            Ok(()) => {},
            Err(e) => {
                tracing::debug!("Read error: {}", e);
                break;
            },
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!("Invalid frame header from {}: {}", session_id, e);
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("Payload read error: {}", e);
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Frame decode error from {}: {}", session_id, e);
                break;
            },
        };

        // One lock span per event: mutation and fanout observe the same
        // consistent snapshot, and no await happens mid-mutation.
        let mut driver = driver.lock().await;
        match driver.process_event(ServerEvent::FrameReceived { session_id, frame }) {
            Ok(actions) => execute_actions(&driver, actions, shared).await,
            Err(e) => {
                // Scoped to this event; the connection stays up
                tracing::warn!("Frame processing error: {}", e);
            },
        }
    }

    Ok(())
}

/// Execute server actions.
///
/// Delivery is best-effort fire-and-forget: a peer whose stream is gone or
/// unwritable is skipped with a warning, and delivery to the rest continues.
/// No retries, no queues.
async fn execute_actions(
    driver: &ServerDriver<SystemEnv>,
    actions: Vec<ServerAction>,
    shared: &SharedState,
) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                match encode_frame(&frame) {
                    Ok(wire) => send_to_sessions(shared, [session_id], &wire).await,
                    Err(e) => tracing::error!("Failed to encode frame: {}", e),
                }
            },

            ServerAction::BroadcastToRoom { room, frame } => {
                let recipients: Vec<u64> = driver.sessions_in_room(&room).collect();

                // Zero members: silent no-op, not an error
                match encode_frame(&frame) {
                    Ok(wire) => send_to_sessions(shared, recipients, &wire).await,
                    Err(e) => tracing::error!("Failed to encode broadcast: {}", e),
                }
            },

            ServerAction::BroadcastToAll { frame } => {
                let recipients: Vec<u64> = driver.session_ids().collect();

                match encode_frame(&frame) {
                    Ok(wire) => send_to_sessions(shared, recipients, &wire).await,
                    Err(e) => tracing::error!("Failed to encode broadcast: {}", e),
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing connection {}: {}", session_id, reason);
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

/// Encode a frame once for delivery to any number of recipients.
fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ServerError> {
    let mut wire = Vec::new();
    frame.encode(&mut wire).map_err(|e| ServerError::Protocol(e.to_string()))?;
    Ok(wire)
}

/// Push encoded bytes to each recipient's outbound stream, skipping peers
/// that are already gone.
async fn send_to_sessions(
    shared: &SharedState,
    recipients: impl IntoIterator<Item = u64>,
    wire: &[u8],
) {
    let streams = shared.outbound_streams.read().await;

    for session_id in recipients {
        let Some(stream_mutex) = streams.get(&session_id) else {
            // Already disconnecting; skip and keep going
            tracing::debug!("Skipping unreachable session {}", session_id);
            continue;
        };

        let mut stream = stream_mutex.lock().await;
        if let Err(e) = stream.write_all(wire).await {
            tracing::warn!("Write failed for session {}: {}", session_id, e);
        }
    }
}
