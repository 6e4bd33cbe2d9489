// ============================================
// File: crates/nnvpn-transport/src/tun/mock.rs
// ============================================
//! # Mock TUN Device Implementation
//!
//! ## Creation Reason
//! Provides a mock TUN device so the data plane can be tested without
//! real interfaces or CAP_NET_ADMIN.
//!
//! ## Main Functionality
//! - In-memory packet queues
//! - Injectable read packets, captured written packets
//! - Fault injection: scripted write errors and short writes
//! - Device-closed simulation (read returns 0)
//!
//! ## Usage in Tests
//! ```ignore
//! use nnvpn_transport::tun::MockTun;
//! use nnvpn_transport::traits::{TunConfig, TunDevice};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let tun = MockTun::new(TunConfig::new("mock0"));
//! tun.inject_packet(b"test packet".to_vec());
//!
//! let mut buf = [0u8; 1500];
//! let len = tun.read(&mut buf).await.unwrap();
//! assert_eq!(&buf[..len], b"test packet");
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Testing only - never wire this into a production path
//! - Queues are bounded to keep runaway tests from eating memory
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::{TunConfig, TunDevice};

// ============================================
// Constants
// ============================================

/// Maximum number of packets to queue.
const MAX_QUEUE_SIZE: usize = 10_000;

// ============================================
// MockTun
// ============================================

/// Mock TUN device for testing.
///
/// # Features
/// - In-memory packet queues, no privileges required
/// - Packet injection and capture
/// - Scripted write faults for retry-discipline tests
/// - Short-write mode for partial-write accounting tests
pub struct MockTun {
    /// Device configuration
    config: TunConfig,
    /// Packets waiting to be read (injected by tests)
    read_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Packets (or fragments, in short-write mode) written so far
    write_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Error kinds to fail the next write calls with, in order
    write_faults: Mutex<VecDeque<io::ErrorKind>>,
    /// Per-call write cap; 0 means unlimited
    max_write: AtomicUsize,
    /// Whether the device is up
    is_up: AtomicBool,
    /// Whether the device has been closed (reads return 0)
    closed: AtomicBool,
    /// Wakes readers on injection or close
    read_notify: Notify,
}

impl MockTun {
    /// Creates a new mock TUN device.
    #[must_use]
    pub fn new(config: TunConfig) -> Self {
        Self {
            config,
            read_queue: Mutex::new(VecDeque::with_capacity(100)),
            write_queue: Mutex::new(VecDeque::with_capacity(100)),
            write_faults: Mutex::new(VecDeque::new()),
            max_write: AtomicUsize::new(0),
            is_up: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            read_notify: Notify::new(),
        }
    }

    /// Injects a packet to be returned by a subsequent `read()`.
    ///
    /// # Panics
    /// Panics if the queue holds more than `MAX_QUEUE_SIZE` packets.
    pub fn inject_packet(&self, packet: Vec<u8>) {
        let mut queue = self.read_queue.lock();
        assert!(queue.len() < MAX_QUEUE_SIZE, "mock TUN read queue overflow");
        queue.push_back(packet);
        drop(queue);
        self.read_notify.notify_one();
    }

    /// Injects multiple packets at once, preserving order.
    pub fn inject_packets(&self, packets: Vec<Vec<u8>>) {
        let mut queue = self.read_queue.lock();
        for packet in packets {
            assert!(queue.len() < MAX_QUEUE_SIZE, "mock TUN read queue overflow");
            queue.push_back(packet);
        }
        drop(queue);
        self.read_notify.notify_waiters();
    }

    /// Marks the device closed; pending and future reads return 0.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.read_notify.notify_waiters();
    }

    /// Takes all packets written to the device, clearing the queue.
    ///
    /// In short-write mode entries are fragments in write order.
    #[must_use]
    pub fn take_written_packets(&self) -> Vec<Vec<u8>> {
        self.write_queue.lock().drain(..).collect()
    }

    /// Schedules the next write calls to fail with the given kinds.
    pub fn fail_writes_with(&self, kinds: impl IntoIterator<Item = io::ErrorKind>) {
        self.write_faults.lock().extend(kinds);
    }

    /// Caps each write to `limit` bytes (0 restores unlimited writes).
    pub fn set_max_write(&self, limit: usize) {
        self.max_write.store(limit, Ordering::Release);
    }

    /// Returns the number of packets waiting to be read.
    #[must_use]
    pub fn pending_read_count(&self) -> usize {
        self.read_queue.lock().len()
    }

    /// Returns the number of write entries captured so far.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.write_queue.lock().len()
    }
}

#[async_trait]
impl TunDevice for MockTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            {
                let mut queue = self.read_queue.lock();
                if let Some(packet) = queue.pop_front() {
                    let len = packet.len().min(buf.len());
                    buf[..len].copy_from_slice(&packet[..len]);
                    return Ok(len);
                }
            }

            if self.closed.load(Ordering::Acquire) {
                return Ok(0);
            }

            self.read_notify.notified().await;
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        if let Some(kind) = self.write_faults.lock().pop_front() {
            return Err(TransportError::TunWriteFailed {
                source: io::Error::from(kind),
            });
        }

        let cap = self.max_write.load(Ordering::Acquire);
        let len = if cap == 0 { buf.len() } else { buf.len().min(cap) };

        let mut queue = self.write_queue.lock();
        if queue.len() >= MAX_QUEUE_SIZE {
            return Err(TransportError::TunWriteFailed {
                source: io::Error::new(io::ErrorKind::Other, "write queue full"),
            });
        }
        queue.push_back(buf[..len].to_vec());
        Ok(len)
    }

    async fn up(&self) -> Result<()> {
        self.is_up.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn ip_addr(&self) -> Ipv4Addr {
        self.config.address
    }

    fn netmask(&self) -> Ipv4Addr {
        self.config.netmask
    }

    fn is_up(&self) -> bool {
        self.is_up.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MockTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTun")
            .field("name", &self.config.name)
            .field("is_up", &self.is_up())
            .field("pending_reads", &self.pending_read_count())
            .field("written", &self.written_count())
            .finish()
    }
}

impl Default for MockTun {
    fn default() -> Self {
        Self::new(TunConfig::new("mock0"))
    }
}

// ============================================
// Tests
// ============================================
