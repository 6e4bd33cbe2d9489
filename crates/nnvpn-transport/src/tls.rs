// ============================================
// File: crates/nnvpn-transport/src/tls.rs
// ============================================
//! # TLS Transport Implementation
//!
//! ## Creation Reason
//! Provides the TLS session layer carrying tunneled IP packets between
//! the two endpoints, in dialer and listener roles.
//!
//! ## Main Functionality
//! - `TlsSettings`: PEM credential paths and session timeout
//! - `TlsDialer`: client-role context and connect
//! - `TlsListener`: server-role context, bind/listen/accept
//! - `TlsSession`: one established stream with idempotent shutdown
//!
//! ## Authentication Model
//! Both endpoints load the same trust anchor (`ca`) and present their
//! own certificate: the dialer verifies the listener's chain and the
//! listener requires and verifies client certificates. Nothing beyond
//! the mutual X.509 exchange authenticates a peer.
//!
//! ## Design Choices
//! - One TLS context per role per process, shared across sessions and
//!   outliving all of them (`Arc` inside connector/acceptor)
//! - `SO_REUSEADDR` on the listening socket for quick rebinding
//! - Handshake completion is bounded by `handshake_timeout` on the
//!   listener; 0 disables the bound
//!
//! ## ⚠️ Important Note for Next Developer
//! - Credentials are read before any socket is created; an unreadable
//!   PEM must never leave a bound port behind
//! - `TlsSession::shutdown` is idempotent and safe in every state;
//!   session teardown paths rely on that
//!
//! ## Last Modified
//! v0.1.0 - Initial TLS transport implementation

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

// ============================================
// Constants
// ============================================

/// Default bound on listener-side session establishment.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 50;

// ============================================
// TlsSettings
// ============================================

/// Credential paths and session options shared by both roles.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// PEM certificate presented to the peer.
    pub cert: PathBuf,
    /// PEM private key for `cert`.
    pub key: PathBuf,
    /// PEM trust anchor(s) the peer's chain must verify against.
    pub ca: PathBuf,
    /// Listener-side handshake bound; `Duration::ZERO` disables it.
    pub handshake_timeout: Duration,
}

impl TlsSettings {
    /// Creates settings with the default handshake timeout.
    #[must_use]
    pub fn new(
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
        ca: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ca: ca.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

// ============================================
// PEM Loading
// ============================================

/// Loads a certificate chain from a PEM file.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| TransportError::bad_credentials(path.display().to_string(), e.to_string()))?;
    let mut reader = BufReader::new(file);

    let certs: std::result::Result<Vec<_>, _> = rustls_pemfile::certs(&mut reader).collect();
    let certs = certs.map_err(|e| {
        TransportError::bad_credentials(
            path.display().to_string(),
            format!("failed to parse certificate: {e}"),
        )
    })?;

    if certs.is_empty() {
        return Err(TransportError::bad_credentials(
            path.display().to_string(),
            "no certificates found in PEM file",
        ));
    }

    Ok(certs)
}

/// Loads a private key (PKCS#8, RSA or SEC1) from a PEM file.
fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| TransportError::bad_credentials(path.display().to_string(), e.to_string()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            TransportError::bad_credentials(
                path.display().to_string(),
                format!("failed to parse private key: {e}"),
            )
        })?
        .ok_or_else(|| {
            TransportError::bad_credentials(
                path.display().to_string(),
                "no private key found in PEM file",
            )
        })
}

/// Loads the trust anchors from a PEM file into a root store.
fn load_roots(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(|e| {
            TransportError::bad_credentials(
                path.display().to_string(),
                format!("rejected trust anchor: {e}"),
            )
        })?;
    }
    Ok(roots)
}

// ============================================
// TlsDialer
// ============================================

/// Client-role TLS endpoint.
///
/// The context is built once and reused for every connect; the
/// connector holds it behind an `Arc` so it outlives the sessions.
///
/// # Example
/// ```ignore
/// let settings = TlsSettings::new("cert.pem", "key.pem", "ca.pem");
/// let dialer = TlsDialer::new(&settings)?;
/// let session = dialer.connect("203.0.113.10", 8081).await?;
/// ```
pub struct TlsDialer {
    connector: TlsConnector,
}

impl TlsDialer {
    /// Builds the client-role TLS context from PEM credentials.
    ///
    /// # Errors
    /// Returns `BadCredentials` if any PEM file is unreadable,
    /// unparseable or inconsistent with the key.
    pub fn new(settings: &TlsSettings) -> Result<Self> {
        let roots = load_roots(&settings.ca)?;
        let certs = load_certs(&settings.cert)?;
        let key = load_key(&settings.key)?;

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| {
                TransportError::bad_credentials(
                    settings.cert.display().to_string(),
                    format!("certificate/key rejected: {e}"),
                )
            })?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Connects to `host:port` and completes the client handshake.
    ///
    /// Resolution may yield several candidate addresses; they are
    /// attempted in order and the first successful connection wins.
    ///
    /// # Errors
    /// - `ConnectFailed` if no candidate accepts the connection
    /// - `HandshakeFailed` if the TLS handshake does not complete
    pub async fn connect(&self, host: &str, port: u16) -> Result<TlsSession> {
        let target = format!("{host}:{port}");
        debug!("Connecting to {}", target);

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::connect_failed(&target, e.to_string()))?;

        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::io("reading peer address", e))?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::connect_failed(&target, "invalid server name"))?;

        let stream = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportError::handshake_failed(e.to_string()))?;

        info!("TLS session established with {}", peer);
        Ok(TlsSession::new(TlsStream::Client(stream), peer))
    }
}

impl std::fmt::Debug for TlsDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsDialer").finish_non_exhaustive()
    }
}

// ============================================
// TlsListener
// ============================================

/// Server-role TLS endpoint.
///
/// Binds once; every [`accept`](Self::accept) yields an independent
/// [`TlsSession`] from the shared server context.
pub struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
    local_addr: SocketAddr,
}

impl TlsListener {
    /// Loads credentials, builds the server context and binds.
    ///
    /// Credentials are validated before any socket is created, so a
    /// bad certificate never leaves a port bound.
    ///
    /// # Errors
    /// - `BadCredentials` for unreadable or unparseable PEMs
    /// - `BindFailed` if no resolved candidate can be bound
    pub async fn bind(
        settings: &TlsSettings,
        bind_host: &str,
        port: u16,
        backlog: u32,
    ) -> Result<Self> {
        let roots = load_roots(&settings.ca)?;
        let certs = load_certs(&settings.cert)?;
        let key = load_key(&settings.key)?;

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| {
                TransportError::bad_credentials(
                    settings.ca.display().to_string(),
                    format!("client verifier rejected trust anchors: {e}"),
                )
            })?;

        let config = rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| {
                TransportError::bad_credentials(
                    settings.cert.display().to_string(),
                    format!("certificate/key rejected: {e}"),
                )
            })?;

        let target = format!("{bind_host}:{port}");
        let candidates: Vec<SocketAddr> = tokio::net::lookup_host(&*target)
            .await
            .map_err(|e| TransportError::bind_failed(&target, e.to_string()))?
            .collect();

        let mut last_error = None;
        let mut bound = None;
        for addr in candidates {
            match Self::bind_socket(addr, backlog) {
                Ok(listener) => {
                    bound = Some((listener, addr));
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }

        let (listener, local_addr) = bound.ok_or_else(|| {
            last_error.unwrap_or_else(|| {
                TransportError::bind_failed(&target, "address resolution yielded no candidates")
            })
        })?;

        info!("TLS listener bound to {}", local_addr);

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(Arc::new(config)),
            handshake_timeout: settings.handshake_timeout,
            local_addr,
        })
    }

    /// Binds one candidate address with `SO_REUSEADDR`.
    fn bind_socket(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let bind_err =
            |e: std::io::Error| TransportError::bind_failed(addr.to_string(), e.to_string());

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(backlog as i32).map_err(bind_err)?;

        let std_listener: std::net::TcpListener = socket.into();
        TcpListener::from_std(std_listener).map_err(bind_err)
    }

    /// Accepts one connection and completes the server handshake.
    ///
    /// The handshake must finish within the configured timeout (when
    /// non-zero); a peer that connects and goes silent cannot park the
    /// listener.
    ///
    /// # Errors
    /// - `PeerClosed` if the peer hangs up mid-handshake
    /// - `HandshakeTimeout` if the handshake exceeds the bound
    /// - `HandshakeFailed` for any other handshake error
    pub async fn accept(&self) -> Result<TlsSession> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::io("accepting connection", e))?;

        debug!("TCP connection from {}, starting handshake", peer);

        let handshake = self.acceptor.accept(stream);
        let result = if self.handshake_timeout.is_zero() {
            handshake.await
        } else {
            timeout(self.handshake_timeout, handshake)
                .await
                .map_err(|_| TransportError::HandshakeTimeout)?
        };

        let stream = result.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::PeerClosed
            } else {
                TransportError::handshake_failed(e.to_string())
            }
        })?;

        info!("TLS session established with {}", peer);
        Ok(TlsSession::new(TlsStream::Server(stream), peer))
    }

    /// Returns the bound local address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for TlsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsListener")
            .field("local_addr", &self.local_addr)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================
// TlsSession
// ============================================

/// One established TLS session.
///
/// Owns the stream for its lifetime; [`shutdown`](Self::shutdown)
/// sends close_notify and releases it. Shutdown is idempotent and safe
/// whatever the session state.
pub struct TlsSession {
    stream: Option<TlsStream<TcpStream>>,
    peer: SocketAddr,
}

impl TlsSession {
    fn new(stream: TlsStream<TcpStream>, peer: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            peer,
        }
    }

    /// Returns the peer address recorded at establishment.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns `true` while the stream has not been shut down.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.stream.is_some()
    }

    /// Borrows the byte stream for forwarding.
    ///
    /// # Errors
    /// Returns `SessionClosed` after [`shutdown`](Self::shutdown).
    pub fn stream_mut(&mut self) -> Result<&mut TlsStream<TcpStream>> {
        self.stream.as_mut().ok_or(TransportError::SessionClosed)
    }

    /// Sends close_notify and releases the stream.
    ///
    /// Safe to call repeatedly and in any state; shutdown errors are
    /// logged, not surfaced, because the session is gone either way.
    pub async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("TLS shutdown error ({}): {}", self.peer, e);
            } else {
                debug!("TLS session with {} shut down", self.peer);
            }
        }
    }
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("peer", &self.peer)
            .field("established", &self.is_established())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Generated CA plus one endpoint credential set on disk.
    struct TestPki {
        _dir: tempfile::TempDir,
        settings: TlsSettings,
    }

    /// Mints a CA and two endpoint certificates (listener valid for
    /// 127.0.0.1), writes the PEMs and returns per-role settings.
    fn make_test_pki() -> (TestPki, TestPki) {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let make_endpoint = |sans: Vec<String>| {
            let key = KeyPair::generate().unwrap();
            let params = CertificateParams::new(sans).unwrap();
            let cert = params.signed_by(&key, &ca_cert, &ca_key).unwrap();
            (cert.pem(), key.serialize_pem())
        };

        let (server_cert, server_key) = make_endpoint(vec!["127.0.0.1".into()]);
        let (client_cert, client_key) = make_endpoint(vec!["nnvpn-client".into()]);

        let write_pki = |cert: &str, key: &str| {
            let dir = tempfile::tempdir().unwrap();
            let write = |name: &str, data: &str| {
                let path = dir.path().join(name);
                let mut f = File::create(&path).unwrap();
                f.write_all(data.as_bytes()).unwrap();
                path
            };
            let cert_path = write("cert.pem", cert);
            let key_path = write("key.pem", key);
            let ca_path = write("ca.pem", &ca_cert.pem());
            TestPki {
                settings: TlsSettings::new(cert_path, key_path, ca_path),
                _dir: dir,
            }
        };

        (
            write_pki(&server_cert, &server_key),
            write_pki(&client_cert, &client_key),
        )
    }

    #[tokio::test]
    async fn test_mutual_tls_loopback() {
        let (server_pki, client_pki) = make_test_pki();

        let listener = TlsListener::bind(&server_pki.settings, "127.0.0.1", 0, DEFAULT_BACKLOG)
            .await
            .unwrap();
        let port = listener.local_addr().port();

        let server = tokio::spawn(async move {
            let mut session = listener.accept().await.unwrap();
            let stream = session.stream_mut().unwrap();

            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            stream.write_all(b"world").await.unwrap();

            session.shutdown().await;
            // Idempotent: a second shutdown is a no-op.
            session.shutdown().await;
            assert!(!session.is_established());
        });

        let dialer = TlsDialer::new(&client_pki.settings).unwrap();
        let mut session = dialer.connect("127.0.0.1", port).await.unwrap();
        {
            let stream = session.stream_mut().unwrap();
            stream.write_all(b"hello").await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"world");
        }
        session.shutdown().await;
        assert!(matches!(
            session.stream_mut(),
            Err(TransportError::SessionClosed)
        ));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_untrusted_client_rejected() {
        let (server_pki, _trusted_client) = make_test_pki();
        // A client from a different PKI: the listener must refuse it.
        let (_rogue_server, rogue_client) = make_test_pki();

        let listener = TlsListener::bind(&server_pki.settings, "127.0.0.1", 0, DEFAULT_BACKLOG)
            .await
            .unwrap();
        let port = listener.local_addr().port();

        let server = tokio::spawn(async move { listener.accept().await });

        let dialer = TlsDialer::new(&rogue_client.settings).unwrap();
        // The rogue client also distrusts this server's CA, so at
        // least one side must fail; the listener must not hand out a
        // session either way.
        let _ = dialer.connect("127.0.0.1", port).await;

        let accept_result = server.await.unwrap();
        assert!(accept_result.is_err());
        assert!(accept_result.unwrap_err().is_session_error());
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_bind() {
        let settings = TlsSettings::new(
            "/nonexistent/cert.pem",
            "/nonexistent/key.pem",
            "/nonexistent/ca.pem",
        );

        let err = TlsListener::bind(&settings, "127.0.0.1", 0, DEFAULT_BACKLOG)
            .await
            .unwrap_err();
        assert!(err.is_credential_error());

        let err = TlsDialer::new(&settings).unwrap_err();
        assert!(err.is_credential_error());
    }

    #[tokio::test]
    async fn test_garbage_pem_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        std::fs::write(&path, b"not a pem file").unwrap();

        let settings = TlsSettings::new(&path, &path, &path);
        let err = TlsDialer::new(&settings).unwrap_err();
        assert!(err.is_credential_error());
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (server_pki, _client_pki) = make_test_pki();

        let settings = server_pki
            .settings
            .clone()
            .with_handshake_timeout(Duration::from_millis(100));
        let listener = TlsListener::bind(&settings, "127.0.0.1", 0, DEFAULT_BACKLOG)
            .await
            .unwrap();
        let addr = listener.local_addr();

        // Connect raw TCP and never speak TLS.
        let _idle = TcpStream::connect(addr).await.unwrap();

        let err = listener.accept().await.unwrap_err();
        assert!(matches!(err, TransportError::HandshakeTimeout));
    }
}
