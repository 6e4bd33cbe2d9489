// ============================================
// File: crates/nnvpn-daemon/src/lib.rs
// ============================================
//! # nnvpn Daemon Library
//!
//! ## Creation Reason
//! Provides the nnvpn daemon: a minimal site-to-site VPN tunneling IP
//! packets between two TUN interfaces over one mutually-authenticated
//! TLS connection.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML configuration shared by both roles
//! - [`forwarder`]: the per-session data-plane pump
//! - [`dialer`]: client role (connect, forward, exit on fault)
//! - [`listener`]: server role (accept, forward, recycle on fault)
//! - [`error`]: daemon error types and exit-code mapping
//!
//! ## Architecture Overview
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       nnvpn daemon                         │
//! ├────────────────────────────────────────────────────────────┤
//! │   ┌──────────┐      ┌───────────────┐     ┌────────────┐  │
//! │   │  Config  │─────▶│ dialer / lis- │────▶│ Forwarder  │  │
//! │   │  loader  │      │ tener role    │     │ (per sess) │  │
//! │   └──────────┘      └───────┬───────┘     └─────┬──────┘  │
//! │                             │                   │         │
//! ├─────────────────────────────┼───────────────────┼─────────┤
//! │        nnvpn-transport      ▼                   ▼         │
//! │   ┌─────────────────────┐        ┌─────────────────────┐  │
//! │   │   TLS session       │        │     TUN device      │  │
//! │   │ (dial or accept)    │        │  (raw IP packets)   │  │
//! │   └─────────────────────┘        └─────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The daemon requires CAP_NET_ADMIN for TUN configuration
//! - Both endpoints must agree on `psize`; there is no negotiation
//!
//! ## Last Modified
//! v0.1.0 - Initial daemon library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dialer;
pub mod error;
pub mod forwarder;
pub mod listener;

// Re-export primary types
pub use config::Config;
pub use error::{DaemonError, Result};
pub use forwarder::{ForwardError, Forwarder};
pub use listener::SessionSupervisor;
