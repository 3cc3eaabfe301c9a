//! Tester side of the SecurityAccess handshake
//!
//! Sends RequestSeed on the diagnostic request identifier, derives the key
//! from the returned seed and sends it back, the way an external diagnostic
//! tool would unlock the simulated vehicle.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::layout::{DIAG_REQUEST_ID, DIAG_RESPONSE_ID};
use crate::security::calculate_key;
use crate::transport::{BusFrame, CanTransport, TransportError};
use crate::uds::{security_sub_function, UdsRequest, UdsResponse};

/// How long to wait for each response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

const RECV_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum TesterError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),
}

/// Result of a completed handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    /// Negative response with this NRC
    Rejected(u8),
}

pub struct SecurityTester<T: CanTransport> {
    transport: T,
    request_id: u32,
    response_id: u32,
    timeout: Duration,
}

impl<T: CanTransport> SecurityTester<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            request_id: DIAG_REQUEST_ID,
            response_id: DIAG_RESPONSE_ID,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn ids(mut self, request_id: u32, response_id: u32) -> Self {
        self.request_id = request_id;
        self.response_id = response_id;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send RequestSeed (0x27 0x01) and wait for the seed
    pub fn request_seed(&self) -> Result<u8, TesterError> {
        self.send(UdsRequest::request_seed())?;
        info!("Sent seed request (0x27 0x01)");

        let seed = self.wait_for("seed", |response| match response {
            UdsResponse::Positive {
                subfunction: security_sub_function::REQUEST_SEED,
                value,
            } => Some(value),
            _ => None,
        })?;

        info!(seed = format!("0x{:02X}", seed), "Received seed");
        Ok(seed)
    }

    /// Send SendKey (0x27 0x02 key) and wait for the verdict
    pub fn send_key(&self, key: u8) -> Result<UnlockOutcome, TesterError> {
        self.send(UdsRequest::send_key(key))?;
        info!(key = format!("0x{:02X}", key), "Sent key (0x27 0x02)");

        self.wait_for("key response", |response| match response {
            UdsResponse::Positive {
                subfunction: security_sub_function::SEND_KEY,
                ..
            } => Some(UnlockOutcome::Unlocked),
            UdsResponse::Negative { nrc, .. } => Some(UnlockOutcome::Rejected(nrc)),
            _ => None,
        })
    }

    /// Full handshake: seed, derived key, verdict
    pub fn unlock(&self) -> Result<UnlockOutcome, TesterError> {
        let seed = self.request_seed()?;
        self.send_key(calculate_key(seed))
    }

    fn send(&self, request: UdsRequest) -> Result<(), TesterError> {
        let frame = BusFrame::new(self.request_id, &request.to_bytes())?;
        self.transport.send_frame(&frame)?;
        Ok(())
    }

    /// Wait for a SecurityAccess response on the response id that `accept`
    /// maps to a value; everything else on the bus is skipped
    fn wait_for<R>(
        &self,
        what: &'static str,
        accept: impl Fn(UdsResponse) -> Option<R>,
    ) -> Result<R, TesterError> {
        // An unrepresentable deadline means wait indefinitely
        let deadline = Instant::now().checked_add(self.timeout);

        loop {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => RECV_SLICE,
            };
            if remaining.is_zero() {
                return Err(TesterError::Timeout(what));
            }

            let Some(frame) = self.transport.recv_frame(remaining.min(RECV_SLICE))? else {
                continue;
            };
            debug!(id = frame.id, data = ?frame.data, "Received frame");

            if frame.id != self.response_id {
                continue;
            }
            if let Some(value) = UdsResponse::from_bytes(&frame.data).and_then(&accept) {
                return Ok(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::sync::Arc;

    fn response(data: &[u8]) -> BusFrame {
        BusFrame::new(DIAG_RESPONSE_ID, data).unwrap()
    }

    #[test]
    fn test_unlock_sends_derived_key() {
        let transport = Arc::new(MockTransport::new());
        transport.inject(BusFrame::new(0x244, &[0; 8]).unwrap());
        transport.inject(response(&[0x67, 0x01, 0x3C]));
        transport.inject(response(&[0x67, 0x02, 0x00]));

        let tester = SecurityTester::new(transport.clone());
        assert_eq!(tester.unlock().unwrap(), UnlockOutcome::Unlocked);

        let sent = transport.sent_frames();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, 0x7DF);
        assert_eq!(sent[0].data, vec![0x27, 0x01]);
        assert_eq!(sent[1].data, vec![0x27, 0x02, 0x3C ^ 0xAA]);
    }

    #[test]
    fn test_rejected_key_reports_nrc() {
        let transport = Arc::new(MockTransport::new());
        transport.inject(response(&[0x7F, 0x27, 0x35]));

        let tester = SecurityTester::new(transport);
        assert_eq!(tester.send_key(0x00).unwrap(), UnlockOutcome::Rejected(0x35));
    }

    #[test]
    fn test_unbounded_timeout_still_unlocks() {
        let transport = Arc::new(MockTransport::new());
        transport.inject(response(&[0x67, 0x01, 0x55]));
        transport.inject(response(&[0x67, 0x02, 0x00]));

        let tester = SecurityTester::new(transport).timeout(Duration::MAX);
        assert_eq!(tester.unlock().unwrap(), UnlockOutcome::Unlocked);
    }

    #[test]
    fn test_missing_seed_times_out() {
        let transport = Arc::new(MockTransport::new());
        // Right payload, wrong identifier
        transport.inject(BusFrame::new(0x7E0, &[0x67, 0x01, 0x10]).unwrap());

        let tester = SecurityTester::new(transport).timeout(Duration::from_millis(20));
        assert!(matches!(
            tester.request_seed(),
            Err(TesterError::Timeout("seed"))
        ));
    }
}
