// ============================================
// File: crates/nnvpn-daemon/src/error.rs
// ============================================
//! # Daemon Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use nnvpn_transport::TransportError;

use crate::forwarder::ForwardError;

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Daemon error types.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Failed to initialize logging: {reason}")]
    LogInit {
        reason: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl DaemonError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn log_init(reason: impl Into<String>) -> Self {
        Self::LogInit {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::LogInit { .. }
        )
    }

    /// Maps the error to the daemon's process exit code.
    ///
    /// 1 = configuration, credentials or logging setup;
    /// 2 = missing privileges for interface configuration;
    /// 3 = data-plane or TLS failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::LogInit { .. } => 1,
            Self::Transport(e) if e.is_credential_error() => 1,
            Self::Transport(e) if e.requires_privileges() => 2,
            Self::Transport(_) | Self::Forward(_) => 3,
        }
    }

    /// Short subsystem tag for user-visible failure lines.
    #[must_use]
    pub fn subsystem(&self) -> &'static str {
        match self {
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } => "Config",
            Self::LogInit { .. } => "Log",
            Self::Transport(e) if e.is_tun_error() => "Tun",
            Self::Transport(_) => "TLS",
            Self::Forward(_) => "Forwarder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    use nnvpn_transport::TunStage;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DaemonError::config_invalid("psize", "Invalid payload size").exit_code(), 1);
        assert_eq!(
            DaemonError::from(TransportError::bad_credentials("/c.pem", "unreadable")).exit_code(),
            1
        );
        assert_eq!(
            DaemonError::from(TransportError::TunSyscall {
                stage: TunStage::SetIff,
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            })
            .exit_code(),
            2
        );
        assert_eq!(DaemonError::from(ForwardError::PeerClosed).exit_code(), 3);
        assert_eq!(DaemonError::from(TransportError::PeerClosed).exit_code(), 3);
    }

    #[test]
    fn test_subsystem_tags() {
        assert_eq!(
            DaemonError::from(TransportError::TunSyscall {
                stage: TunStage::Open,
                source: io::Error::from(io::ErrorKind::NotFound),
            })
            .subsystem(),
            "Tun"
        );
        assert_eq!(DaemonError::from(TransportError::PeerClosed).subsystem(), "TLS");
        assert_eq!(DaemonError::from(ForwardError::TunClosed).subsystem(), "Forwarder");
    }
}
