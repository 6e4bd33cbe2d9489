// ============================================
// File: crates/nnvpn-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the abstract TUN device interface so the data plane can be
//! exercised against a mock implementation without privileges.
//!
//! ## Main Functionality
//! - `TunDevice`: layer-3 virtual interface read/write contract
//! - `TunConfig`: interface name and IPv4 addressing
//!
//! ## Design Philosophy
//! - Traits enable mock implementations for testing
//! - Async-first design with `async_trait`
//! - Buffer management is the caller's responsibility
//!
//! ## ⚠️ Important Note for Next Developer
//! - Implementations must be Send + Sync; the two forwarding
//!   directions share one `&TunDevice`
//! - Data crossing this interface is raw IP packets, no link-layer
//!   header
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::error::Result;

// ============================================
// TunDevice Trait
// ============================================

/// Abstract interface for a layer-3 virtual network device.
///
/// # Lifecycle
/// A device is created *unbound* (descriptor open, interface named but
/// unaddressed), becomes *bound* after [`TunDevice::up`] assigns the
/// address/netmask and raises the interface, and is torn down on drop.
///
/// # Example
/// ```ignore
/// async fn drain<T: TunDevice>(tun: &T) -> Result<()> {
///     let mut buf = [0u8; 1500];
///     loop {
///         let len = tun.read(&mut buf).await?;
///         // buf[..len] holds one IP packet
///     }
/// }
/// ```
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Reads one IP packet from the device.
    ///
    /// # Returns
    /// Number of bytes read; 0 means the device was closed.
    ///
    /// # Errors
    /// Returns error if the read fails.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes an IP packet to the device.
    ///
    /// May write fewer bytes than requested; the caller owns the
    /// partial-write accounting.
    ///
    /// # Errors
    /// Returns error if the write fails. Errors whose
    /// [`is_retryable`](crate::TransportError::is_retryable) is `true`
    /// must be retried without advancing the write offset.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Assigns the configured address and netmask and raises the
    /// interface (`UP | RUNNING`).
    ///
    /// # Errors
    /// Returns error if any interface-control operation fails.
    async fn up(&self) -> Result<()>;

    /// Returns the effective device name as reported by the kernel.
    fn name(&self) -> &str;

    /// Returns the device's assigned IP address.
    fn ip_addr(&self) -> Ipv4Addr;

    /// Returns the network mask.
    fn netmask(&self) -> Ipv4Addr;

    /// Returns `true` once the device is bound (addressed and up).
    fn is_up(&self) -> bool;
}

// ============================================
// TunConfig
// ============================================

/// Configuration for TUN device creation.
///
/// # Example
/// ```
/// use nnvpn_transport::traits::TunConfig;
/// use std::net::Ipv4Addr;
///
/// let config = TunConfig::new("nnvpn0")
///     .with_address(Ipv4Addr::new(10, 10, 0, 1))
///     .with_netmask(Ipv4Addr::new(255, 255, 255, 0));
/// ```
#[derive(Debug, Clone)]
pub struct TunConfig {
    /// Requested device name. Empty lets the kernel pick (`tun%d`);
    /// names longer than the kernel limit are truncated.
    pub name: String,
    /// IP address to assign to the device.
    pub address: Ipv4Addr,
    /// Network mask.
    pub netmask: Ipv4Addr,
}

impl TunConfig {
    /// Creates a new TUN configuration with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Ipv4Addr::new(10, 10, 0, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
        }
    }

    /// Sets the IP address.
    #[must_use]
    pub const fn with_address(mut self, address: Ipv4Addr) -> Self {
        self.address = address;
        self
    }

    /// Sets the network mask.
    #[must_use]
    pub const fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        self.netmask = netmask;
        self
    }
}

impl Default for TunConfig {
    fn default() -> Self {
        Self::new("")
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tun_config_defaults() {
        let config = TunConfig::default();

        assert!(config.name.is_empty());
        assert_eq!(config.address, Ipv4Addr::new(10, 10, 0, 1));
        assert_eq!(config.netmask, Ipv4Addr::new(255, 255, 255, 0));
    }

    #[test]
    fn test_tun_config_builder() {
        let config = TunConfig::new("test0")
            .with_address(Ipv4Addr::new(10, 0, 0, 2))
            .with_netmask(Ipv4Addr::new(255, 255, 0, 0));

        assert_eq!(config.name, "test0");
        assert_eq!(config.address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(config.netmask, Ipv4Addr::new(255, 255, 0, 0));
    }
}
