//! SocketCAN adapter using a raw CAN-FD socket (Linux only)

use std::io;
use std::time::{Duration, Instant};

use ::socketcan::{
    CanAnyFrame, CanFdFrame, CanFdSocket, CanFrame, EmbeddedFrame, ExtendedId, Frame, Id, Socket,
    StandardId,
};
use parking_lot::Mutex;

use super::{BusFrame, CanTransport, TransportError};

/// Sleep between polls of the non-blocking socket
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// `None` when `now + timeout` is not representable; such a receive never expires
fn poll_deadline(now: Instant, timeout: Duration) -> Option<Instant> {
    now.checked_add(timeout)
}

fn is_expired(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|deadline| now >= deadline)
}

/// Raw SocketCAN transport accepting both classic and FD frames
pub struct SocketCanTransport {
    interface: String,
    socket: Mutex<CanFdSocket>,
}

impl SocketCanTransport {
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        let socket = CanFdSocket::open(interface).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to open raw CAN socket on {}: {}",
                interface, e
            ))
        })?;

        // Non-blocking so receive can be polled against a deadline
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to set non-blocking: {}", e))
        })?;

        tracing::info!(interface = %interface, "Raw CAN socket opened");

        Ok(Self {
            interface: interface.to_string(),
            socket: Mutex::new(socket),
        })
    }

    fn to_bus_frame(frame: CanAnyFrame) -> Option<BusFrame> {
        match frame {
            CanAnyFrame::Normal(frame) => Some(BusFrame {
                id: frame.raw_id(),
                data: frame.data().to_vec(),
                fd: false,
            }),
            CanAnyFrame::Fd(frame) => Some(BusFrame {
                id: frame.raw_id(),
                data: frame.data().to_vec(),
                fd: true,
            }),
            // Remote and error frames carry no telemetry
            _ => None,
        }
    }

    fn can_id(raw: u32) -> Result<Id, TransportError> {
        let id = if raw <= 0x7FF {
            StandardId::new(raw as u16).map(Id::Standard)
        } else {
            ExtendedId::new(raw).map(Id::Extended)
        };
        id.ok_or_else(|| TransportError::InvalidFrame(format!("Invalid CAN ID: 0x{:X}", raw)))
    }
}

impl CanTransport for SocketCanTransport {
    fn recv_frame(&self, timeout: Duration) -> Result<Option<BusFrame>, TransportError> {
        let deadline = poll_deadline(Instant::now(), timeout);

        loop {
            let result = self.socket.lock().read_frame();
            match result {
                Ok(frame) => {
                    if let Some(frame) = Self::to_bus_frame(frame) {
                        return Ok(Some(frame));
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if is_expired(deadline, Instant::now()) {
                        return Ok(None);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(TransportError::ReceiveFailed(format!(
                        "{}: {}",
                        self.interface, e
                    )))
                }
            }
        }
    }

    fn send_frame(&self, frame: &BusFrame) -> Result<(), TransportError> {
        let id = Self::can_id(frame.id)?;
        let socket = self.socket.lock();

        let written = if frame.fd {
            let fd_frame = CanFdFrame::new(id, &frame.data)
                .ok_or_else(|| TransportError::InvalidFrame("CAN FD payload too large".into()))?;
            socket.write_frame(&fd_frame)
        } else {
            let can_frame = CanFrame::new(id, &frame.data)
                .ok_or_else(|| TransportError::InvalidFrame("CAN payload too large".into()))?;
            socket.write_frame(&can_frame)
        };

        written.map_err(|e| TransportError::SendFailed(format!("{}: {}", self.interface, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_deadline() {
        let now = Instant::now();
        let deadline = poll_deadline(now, Duration::from_millis(100));

        assert!(!is_expired(deadline, now));
        assert!(is_expired(deadline, now + Duration::from_millis(100)));
    }

    #[test]
    fn test_unrepresentable_deadline_never_expires() {
        let now = Instant::now();
        let deadline = poll_deadline(now, Duration::MAX);

        assert_eq!(deadline, None);
        assert!(!is_expired(deadline, now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_can_id_kind() {
        assert!(matches!(
            SocketCanTransport::can_id(0x7DF).unwrap(),
            Id::Standard(_)
        ));
        assert!(matches!(
            SocketCanTransport::can_id(0x18DA_F110).unwrap(),
            Id::Extended(_)
        ));
        assert!(SocketCanTransport::can_id(0x2000_0000).is_err());
    }
}
