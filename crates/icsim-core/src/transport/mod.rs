//! Transport layer for CAN communication
//!
//! This module provides transport adapters for the simulated cluster:
//! - SocketCAN adapter for raw CAN / CAN-FD (Linux only)
//! - Mock adapter for testing
//!
//! # Example
//!
//! ```ignore
//! use icsim_core::transport::{open_socketcan, CanTransport};
//!
//! let transport = open_socketcan("vcan0")?;
//! if let Some(frame) = transport.recv_frame(Duration::from_millis(100))? {
//!     println!("0x{:03X} {:02X?}", frame.id, frame.data);
//! }
//! ```

pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use error::TransportError;
pub use mock::MockTransport;

use std::sync::Arc;
use std::time::Duration;

use crate::codec::{CANFD_MAX_DLEN, CAN_MAX_DLEN};

/// A raw CAN or CAN-FD data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFrame {
    /// Arbitration ID (11-bit standard or 29-bit extended)
    pub id: u32,
    pub data: Vec<u8>,
    /// CAN-FD frame (payload up to 64 bytes)
    pub fd: bool,
}

impl BusFrame {
    /// Classic CAN frame, at most 8 bytes
    pub fn new(id: u32, data: &[u8]) -> Result<Self, TransportError> {
        Self::build(id, data, false)
    }

    /// CAN-FD frame, at most 64 bytes
    pub fn new_fd(id: u32, data: &[u8]) -> Result<Self, TransportError> {
        Self::build(id, data, true)
    }

    fn build(id: u32, data: &[u8], fd: bool) -> Result<Self, TransportError> {
        let max = if fd { CANFD_MAX_DLEN } else { CAN_MAX_DLEN };
        if data.len() > max {
            return Err(TransportError::InvalidFrame(format!(
                "{} byte payload exceeds {} byte limit",
                data.len(),
                max
            )));
        }
        Ok(Self {
            id,
            data: data.to_vec(),
            fd,
        })
    }

    /// Payload limited to the frame kind's maximum length
    pub fn payload(&self) -> &[u8] {
        let max = if self.fd { CANFD_MAX_DLEN } else { CAN_MAX_DLEN };
        &self.data[..self.data.len().min(max)]
    }
}

/// Transport-agnostic CAN interface
///
/// The bus listener only needs "give me the next frame" and "transmit this
/// frame". Receive is polled with a timeout so the caller can observe a
/// shutdown request between polls.
pub trait CanTransport: Send + Sync {
    /// Wait up to `timeout` for the next frame; `Ok(None)` when nothing arrived
    fn recv_frame(&self, timeout: Duration) -> Result<Option<BusFrame>, TransportError>;

    /// Transmit a frame
    fn send_frame(&self, frame: &BusFrame) -> Result<(), TransportError>;
}

impl<T: CanTransport + ?Sized> CanTransport for Arc<T> {
    fn recv_frame(&self, timeout: Duration) -> Result<Option<BusFrame>, TransportError> {
        (**self).recv_frame(timeout)
    }

    fn send_frame(&self, frame: &BusFrame) -> Result<(), TransportError> {
        (**self).send_frame(frame)
    }
}

/// Open a raw SocketCAN transport on `interface`
pub fn open_socketcan(interface: &str) -> Result<Arc<dyn CanTransport>, TransportError> {
    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    {
        let transport = socketcan::SocketCanTransport::open(interface)?;
        Ok(Arc::new(transport))
    }
    #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
    {
        let _ = interface;
        Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        ))
    }
}

/// Parse a CAN ID from string (supports hex with 0x prefix)
pub fn parse_can_id(s: &str) -> Result<u32, std::num::ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}
