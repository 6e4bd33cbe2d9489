// ============================================
// File: crates/nnvpn-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for the transport layer: TUN device syscalls,
//! TLS credential loading, session establishment and stream I/O.
//!
//! ## Main Functionality
//! - `TransportError`: primary error enum for transport operations
//! - `TunStage`: identifies which TUN configuration syscall failed
//! - Classification of session-scoped vs fatal errors
//!
//! ## Error Categories
//! 1. **TUN Errors**: clone-device and interface-control failures
//! 2. **Credential Errors**: unreadable or unparseable PEM material
//! 3. **Session Errors**: connect, handshake, peer-closed
//! 4. **System Errors**: wrapped I/O failures
//!
//! ## ⚠️ Important Note for Next Developer
//! - Session-scoped errors must not take the listener down; check
//!   `is_session_error()` before propagating out of an accept loop
//! - `is_retryable()` is the single source of truth for the
//!   EINTR/EAGAIN retry discipline in partial-write loops
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::fmt;
use std::io;

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TunStage
// ============================================

/// The TUN configuration step a failed syscall belongs to.
///
/// Interface bring-up is a fixed sequence of syscalls; knowing which
/// one failed is usually enough to diagnose a permissions or naming
/// problem without strace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunStage {
    /// Opening `/dev/net/tun`.
    Open,
    /// `TUNSETIFF` on the clone device.
    SetIff,
    /// `SIOCSIFADDR` on the configuration socket.
    SetAddr,
    /// `SIOCGIFFLAGS` on the configuration socket.
    GetFlags,
    /// `SIOCSIFNETMASK` on the configuration socket.
    SetNetmask,
    /// `SIOCSIFFLAGS` bringing the interface up.
    SetFlagsUp,
}

impl fmt::Display for TunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::SetIff => "setiff",
            Self::SetAddr => "setaddr",
            Self::GetFlags => "getflags",
            Self::SetNetmask => "setnetmask",
            Self::SetFlagsUp => "setflagsup",
        };
        f.write_str(name)
    }
}

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // TUN Device Errors
    // ========================================

    /// A TUN configuration syscall failed.
    #[error("TUN syscall failed at stage '{stage}': {source}")]
    TunSyscall {
        /// Which configuration step failed
        stage: TunStage,
        /// The OS error
        #[source]
        source: io::Error,
    },

    /// TUN device read failed.
    #[error("TUN read failed: {source}")]
    TunReadFailed {
        /// The OS error
        #[source]
        source: io::Error,
    },

    /// TUN device write failed.
    #[error("TUN write failed: {source}")]
    TunWriteFailed {
        /// The OS error
        #[source]
        source: io::Error,
    },

    /// A dotted-quad address string did not parse.
    #[error("Invalid IPv4 address: '{addr}'")]
    InvalidAddress {
        /// The offending address string
        addr: String,
    },

    // ========================================
    // Credential Errors
    // ========================================

    /// Certificate, key or trust anchor unreadable / unparseable.
    #[error("Bad credentials '{path}': {reason}")]
    BadCredentials {
        /// Path of the offending PEM file
        path: String,
        /// Why it was rejected
        reason: String,
    },

    // ========================================
    // Session Errors
    // ========================================

    /// No candidate address accepted the connection.
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// The target host:port
        addr: String,
        /// Why connecting failed
        reason: String,
    },

    /// Failed to bind the listening socket.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// The bind address
        addr: String,
        /// Why binding failed
        reason: String,
    },

    /// TLS handshake failed.
    #[error("TLS handshake failed: {reason}")]
    HandshakeFailed {
        /// Why the handshake failed
        reason: String,
    },

    /// TLS handshake did not complete within the configured timeout.
    #[error("TLS handshake timed out")]
    HandshakeTimeout,

    /// Peer closed the connection during or after the handshake.
    #[error("Connection closed by peer")]
    PeerClosed,

    /// Operation on a session that has already been shut down.
    #[error("TLS session is closed")]
    SessionClosed,

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `TunSyscall` error from the current OS error.
    pub fn tun_syscall(stage: TunStage) -> Self {
        Self::TunSyscall {
            stage,
            source: io::Error::last_os_error(),
        }
    }

    /// Creates a `BadCredentials` error.
    pub fn bad_credentials(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadCredentials {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `HandshakeFailed` error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the operation may be retried without
    /// advancing any offsets (the EINTR/EAGAIN discipline).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TunReadFailed { source }
            | Self::TunWriteFailed { source }
            | Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Returns `true` if this error concerns PEM credential material.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(self, Self::BadCredentials { .. })
    }

    /// Returns `true` if this is a TUN device error.
    #[must_use]
    pub const fn is_tun_error(&self) -> bool {
        matches!(
            self,
            Self::TunSyscall { .. }
                | Self::TunReadFailed { .. }
                | Self::TunWriteFailed { .. }
                | Self::InvalidAddress { .. }
        )
    }

    /// Returns `true` if this error aborts at most the current session.
    ///
    /// A listener catches these, logs them and returns to accept; only
    /// non-session errors may take the whole process down.
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed { .. }
                | Self::HandshakeTimeout
                | Self::PeerClosed
                | Self::SessionClosed
        )
    }

    /// Returns `true` if this error usually means missing CAP_NET_ADMIN.
    #[must_use]
    pub fn requires_privileges(&self) -> bool {
        matches!(
            self,
            Self::TunSyscall { source, .. } if source.kind() == io::ErrorKind::PermissionDenied
        )
    }
}

// ============================================
// Tests
// ============================================
