//! Quinn-based QUIC transport implementation.
//!
//! The persistent bidirectional channel clients connect over. QUIC gives us
//! encrypted, multiplexed streams over UDP with TLS 1.3; each client opens
//! one connection, sends frames on bidirectional streams, and receives all
//! server pushes on a single server-initiated unidirectional stream (which
//! keeps outbound ordering per connection).
//!
//! ALPN is pinned to `roomcast` so mismatched peers fail the handshake
//! instead of exchanging garbage. Production deployments load PEM
//! certificates; without them a self-signed certificate is generated and a
//! warning logged - suitable only for local development.

use std::{net::SocketAddr, sync::Arc};

use quinn::{Endpoint, RecvStream, SendStream, ServerConfig};
use roomcast_proto::ALPN_PROTOCOL;

use crate::error::ServerError;

/// QUIC transport wrapping a Quinn endpoint that accepts incoming
/// connections.
pub struct QuicTransport {
    /// Quinn endpoint
    endpoint: Endpoint,
}

impl QuicTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// If `cert_path` and `key_path` are provided, they are used for TLS.
    /// Otherwise a self-signed certificate is generated for development.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] for an unparseable address or broken TLS
    ///   material
    /// - [`ServerError::Transport`] if the endpoint cannot bind
    pub fn bind(
        address: &str,
        cert_path: Option<String>,
        key_path: Option<String>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(&cert, &key)?,
            _ => generate_self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        Ok(Self { endpoint })
    }

    /// Accept a new QUIC connection.
    ///
    /// Blocks until a connection is available.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Transport`] if the endpoint is closed or the
    ///   handshake fails
    pub async fn accept(&self) -> Result<QuicConnection, ServerError> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| ServerError::Transport("endpoint closed".to_string()))?;

        let conn = incoming
            .await
            .map_err(|e| ServerError::Transport(format!("connection failed: {e}")))?;

        Ok(QuicConnection { connection: conn })
    }

    /// Local address the transport is bound to.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Transport`] if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// A QUIC connection wrapper.
///
/// Clones are cheap and share the same underlying QUIC connection, so the
/// accept loop can hand the connection to multiple tasks.
#[derive(Clone)]
pub struct QuicConnection {
    connection: quinn::Connection,
}

impl QuicConnection {
    /// Accept a client-initiated bidirectional stream.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Transport`] when the connection is closed
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Open a unidirectional stream for server-to-client pushes.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Transport`] when the connection is closed
    pub async fn open_uni(&self) -> Result<SendStream, ServerError> {
        self.connection
            .open_uni()
            .await
            .map_err(|e| ServerError::Transport(format!("open_uni failed: {e}")))
    }

    /// Remote peer address.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection with an error code and reason.
    pub fn close(&self, error_code: quinn::VarInt, reason: &[u8]) {
        self.connection.close(error_code, reason);
    }
}

/// Build a rustls config with the roomcast ALPN from a certificate chain and
/// private key.
fn tls_config_from_parts(
    certs: Vec<rustls::pki_types::CertificateDer<'static>>,
    key: rustls::pki_types::PrivateKeyDer<'static>,
) -> Result<ServerConfig, ServerError> {
    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?,
    ));

    Ok(server_config)
}

/// Load TLS configuration from PEM certificate and key files.
fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, ServerError> {
    use std::fs;

    let cert_pem = fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;

    let key_pem = fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    tls_config_from_parts(certs, key)
}

/// Generate a self-signed certificate for development.
fn generate_self_signed_config() -> Result<ServerConfig, ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let cert_der = cert.cert.der().clone();
    let key_der = cert.key_pair.serialize_der();

    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(key_der);

    tracing::warn!("Using self-signed certificate - not for production use!");

    tls_config_from_parts(vec![cert_der], key.into())
}
