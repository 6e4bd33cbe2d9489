// ============================================
// File: crates/nnvpn-daemon/src/config.rs
// ============================================
//! # Daemon Configuration
//!
//! ## Creation Reason
//! Provides configuration loading for the nnvpn daemon from a flat
//! TOML file shared by both roles.
//!
//! ## Main Functionality
//! - `Config`: the recognized keys, with defaults
//! - TOML file loading and parsing
//! - Validation before any data-plane activity
//!
//! ## Example Configuration
//! ```toml
//! address = "203.0.113.10"      # remote host (dialer) / bind (listener)
//! port = 8081
//! psize = 1500                  # positive multiple of 1500
//! cert = "/etc/nnvpn/cert.pem"
//! key = "/etc/nnvpn/key.pem"
//! ca = "/etc/nnvpn/ca.pem"
//! device = "nnvpn0"             # empty lets the kernel pick
//! tun_ip = "10.10.0.1"
//! tun_netmask = "255.255.255.0"
//! log = "/var/log/nnvpn.log"    # optional; stderr when unset
//! timeout_secs = 3              # listener handshake bound; 0 disables
//! backlog = 50
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both endpoints MUST agree on `psize`: the TLS stream carries raw
//!   packets with no framing, so the buffer sizes are the protocol
//! - Validation runs at load time; nothing downstream re-checks
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use nnvpn_transport::{TlsSettings, TransportError, TunConfig};

use crate::error::{DaemonError, Result};

// ============================================
// Constants
// ============================================

/// Unit of forwarding buffer capacity; `psize` must be a positive
/// multiple of this.
pub const MAX_PAYLOAD: usize = 1500;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "./nnvpn.toml";

// ============================================
// Config
// ============================================

/// Daemon configuration, one flat table for both roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote host (dialer) or bind address (listener).
    pub address: String,

    /// TLS port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Forwarding buffer capacity in bytes.
    #[serde(default = "default_psize")]
    pub psize: usize,

    /// PEM certificate presented to the peer.
    pub cert: PathBuf,

    /// PEM private key.
    pub key: PathBuf,

    /// PEM trust anchor for peer verification.
    pub ca: PathBuf,

    /// Requested TUN device name; empty lets the kernel pick.
    #[serde(default)]
    pub device: String,

    /// TUN interface IPv4 address (dotted quad).
    pub tun_ip: String,

    /// TUN interface netmask (dotted quad).
    #[serde(default = "default_netmask")]
    pub tun_netmask: String,

    /// Log file path; unset logs to stderr.
    #[serde(default)]
    pub log: Option<PathBuf>,

    /// Listener handshake/session-establishment timeout in seconds;
    /// 0 disables the bound.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Listen backlog (listener only).
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

fn default_port() -> u16 {
    8081
}

fn default_psize() -> usize {
    MAX_PAYLOAD
}

fn default_netmask() -> String {
    "255.255.255.0".to_string()
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_backlog() -> u32 {
    50
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DaemonError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| DaemonError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parses configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or validated.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DaemonError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(DaemonError::config_invalid("address", "cannot be empty"));
        }

        if self.port == 0 {
            return Err(DaemonError::config_invalid("port", "cannot be 0"));
        }

        if self.psize == 0 || self.psize % MAX_PAYLOAD != 0 {
            return Err(DaemonError::config_invalid("psize", "Invalid payload size"));
        }

        if self.tun_ip.is_empty() {
            return Err(DaemonError::config_invalid("tun_ip", "cannot be empty"));
        }

        Ok(())
    }

    // ========================================
    // Derived settings
    // ========================================

    /// Builds the TLS settings shared by both roles.
    #[must_use]
    pub fn tls_settings(&self) -> TlsSettings {
        TlsSettings::new(&self.cert, &self.key, &self.ca)
            .with_handshake_timeout(Duration::from_secs(self.timeout_secs))
    }

    /// Builds the TUN configuration, parsing the dotted-quad strings.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if either dotted quad does not parse.
    pub fn tun_config(&self) -> std::result::Result<TunConfig, TransportError> {
        let address = self.tun_ip.parse().map_err(|_| TransportError::InvalidAddress {
            addr: self.tun_ip.clone(),
        })?;
        let netmask = self
            .tun_netmask
            .parse()
            .map_err(|_| TransportError::InvalidAddress {
                addr: self.tun_netmask.clone(),
            })?;

        Ok(TunConfig::new(&self.device)
            .with_address(address)
            .with_netmask(netmask))
    }
}

// ============================================
// Tests
// ============================================
