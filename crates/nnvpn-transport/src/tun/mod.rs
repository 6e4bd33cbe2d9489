// ============================================
// File: crates/nnvpn-transport/src/tun/mod.rs
// ============================================
//! # TUN Device Module
//!
//! ## Creation Reason
//! Groups the platform TUN backends behind the
//! [`TunDevice`](crate::traits::TunDevice) trait.
//!
//! ## Main Functionality
//! - `linux`: `/dev/net/tun` with `IFF_TUN | IFF_NO_PI | IFF_VNET_HDR`
//! - `mock`: in-memory implementation for testing
//!
//! ## What is a TUN Device?
//! A TUN device is a virtual network interface operating at layer 3.
//! The kernel routes IP packets into it; a userspace process reads
//! them from a descriptor, and packets written to the descriptor enter
//! the kernel as if received on the interface.
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN configuration requires root or CAP_NET_ADMIN
//! - Device names are limited to 15 characters on Linux
//! - OS-specific steps stay inside the backend; adding a platform
//!   means adding a backend module, not touching callers
//!
//! ## Last Modified
//! v0.1.0 - Initial TUN module structure

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub use linux::LinuxTun;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTun;
