//! Mock transport adapter for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{BusFrame, CanTransport, TransportError};

/// Longest a mock receive blocks when its queue is empty
const IDLE_POLL: Duration = Duration::from_millis(1);

/// In-memory CAN bus: scripted inbound traffic, recorded outbound frames
#[derive(Default)]
pub struct MockTransport {
    inbound: Mutex<VecDeque<Result<BusFrame, TransportError>>>,
    sent: Mutex<Vec<BusFrame>>,
    fail_sends: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the next receive
    pub fn inject(&self, frame: BusFrame) {
        self.inbound.lock().push_back(Ok(frame));
    }

    /// Queue a receive failure
    pub fn inject_error(&self, error: TransportError) {
        self.inbound.lock().push_back(Err(error));
    }

    /// Frames still waiting to be received
    pub fn pending(&self) -> usize {
        self.inbound.lock().len()
    }

    /// Every frame transmitted so far
    pub fn sent_frames(&self) -> Vec<BusFrame> {
        self.sent.lock().clone()
    }

    /// Make subsequent sends fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl CanTransport for MockTransport {
    fn recv_frame(&self, timeout: Duration) -> Result<Option<BusFrame>, TransportError> {
        if let Some(next) = self.inbound.lock().pop_front() {
            return next.map(Some);
        }
        std::thread::sleep(timeout.min(IDLE_POLL));
        Ok(None)
    }

    fn send_frame(&self, frame: &BusFrame) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock send failure".to_string()));
        }
        tracing::debug!(id = frame.id, data = ?frame.data, "Mock transport: sent frame");
        self.sent.lock().push(frame.clone());
        Ok(())
    }
}
