// ============================================
// File: crates/nnvpn-transport/src/lib.rs
// ============================================
//! # nnvpn Transport - TUN and TLS I/O Layer
//!
//! ## Creation Reason
//! Provides the two I/O surfaces of the nnvpn tunnel: the layer-3 TUN
//! device exchanging raw IP packets with the kernel, and the TLS
//! session carrying those packets between endpoints.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `TunDevice` trait and `TunConfig`
//! - [`tun`]: TUN backends (Linux, mock)
//! - [`tls`]: TLS dialer, listener and session
//! - [`error`]: Transport-specific error types
//!
//! ## Data Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Kernel routing                          │
//! │                       │                                  │
//! │            ┌──────────┴──────────┐                       │
//! │            │    TUN Device       │                       │
//! │            │   (IP packets)      │                       │
//! │            └──────────┬──────────┘                       │
//! │                       │ read / write                     │
//! │            ┌──────────┴──────────┐                       │
//! │            │     Forwarder       │  (nnvpn-daemon)       │
//! │            └──────────┬──────────┘                       │
//! │                       │ byte stream                      │
//! │            ┌──────────┴──────────┐                       │
//! │            │    TLS Session      │                       │
//! │            │ (raw IP, no frames) │                       │
//! │            └──────────┬──────────┘                       │
//! │                       ▼                                  │
//! │                     Peer                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Platform Support
//! | Platform | TLS | TUN |
//! |----------|-----|-----|
//! | Linux | ✅ | ✅ |
//! | other Unix | ✅ | mock only |
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN configuration requires CAP_NET_ADMIN; everything else runs
//!   unprivileged
//! - Always code against the traits so the mock backend keeps working
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod tls;
pub mod traits;
pub mod tun;

// Re-export primary types
pub use error::{Result, TransportError, TunStage};
pub use tls::{TlsDialer, TlsListener, TlsSession, TlsSettings};
pub use traits::{TunConfig, TunDevice};

#[cfg(target_os = "linux")]
pub use tun::linux::LinuxTun;

#[cfg(any(test, feature = "mock"))]
pub use tun::mock::MockTun;
