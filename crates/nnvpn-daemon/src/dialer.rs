// ============================================
// File: crates/nnvpn-daemon/src/dialer.rs
// ============================================
//! # Dialer Role
//!
//! ## Creation Reason
//! Implements the client side of the tunnel: bring the TUN up, dial
//! the listener, forward until the session faults.
//!
//! ## Fault Model
//! The dialer does not supervise. Any fault - connect, handshake or
//! forwarding - shuts the session down and propagates to `main`; an
//! external mechanism (systemd, a shell loop) restarts the process
//! and a restart is a fresh handshake.
//!
//! ## Last Modified
//! v0.1.0 - Initial dialer implementation

use crate::config::Config;
use crate::error::Result;

/// Runs the dialer role: TUN up, connect, forward until fault.
///
/// # Errors
/// Always returns an error eventually; a healthy session only ends by
/// fault.
#[cfg(target_os = "linux")]
pub async fn run(config: &Config) -> Result<()> {
    use tracing::info;

    use nnvpn_transport::{LinuxTun, TlsDialer, TunDevice};

    use crate::forwarder::Forwarder;

    let tun = LinuxTun::create(config.tun_config()?)?;
    tun.up().await?;
    info!("TUN device {} ready", tun.name());

    let dialer = TlsDialer::new(&config.tls_settings())?;
    let mut session = dialer.connect(&config.address, config.port).await?;

    let forwarder = Forwarder::new(config.psize);
    let fault = forwarder.run(&tun, session.stream_mut()?).await;

    session.shutdown().await;
    Err(fault.into())
}

/// Dialer role is only available where a TUN backend exists.
#[cfg(not(target_os = "linux"))]
pub async fn run(_config: &Config) -> Result<()> {
    Err(crate::error::DaemonError::config_invalid(
        "platform",
        "the dialer role requires a Linux TUN device",
    ))
}
