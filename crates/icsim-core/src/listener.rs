//! Bus listener
//!
//! Receives frames from the transport, routes each by identifier through the
//! active [`FieldLayout`], applies telemetry to the [`VehicleStore`] and
//! answers SecurityAccess requests on the diagnostic identifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::codec::{self, decode_uds_request};
use crate::layout::{Channel, FieldLayout, SpeedModel, DIAG_RESPONSE_ID};
use crate::state::VehicleStore;
use crate::transport::{BusFrame, CanTransport};

/// Default receive poll period; bounds how long shutdown can be delayed
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Back-off after a transport receive failure
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct BusListener<T: CanTransport> {
    transport: T,
    store: Arc<VehicleStore>,
    layout: FieldLayout,
    speed_model: SpeedModel,
    response_id: u32,
    poll_timeout: Duration,
}

impl<T: CanTransport> BusListener<T> {
    pub fn new(
        transport: T,
        store: Arc<VehicleStore>,
        layout: FieldLayout,
        speed_model: SpeedModel,
    ) -> Self {
        Self {
            transport,
            store,
            layout,
            speed_model,
            response_id: DIAG_RESPONSE_ID,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Identifier SecurityAccess responses are transmitted on
    pub fn response_id(mut self, id: u32) -> Self {
        self.response_id = id;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Receive and dispatch until `running` is cleared.
    ///
    /// Transport faults are logged and the loop continues; nothing here is
    /// fatal to the process.
    pub fn run(&self, running: &AtomicBool) {
        info!(
            door_id = format!("0x{:03X}", self.layout.door.id),
            signal_id = format!("0x{:03X}", self.layout.signal.id),
            speed_id = format!("0x{:03X}", self.layout.speed.id),
            diag_id = format!("0x{:03X}", self.layout.diagnostic_id),
            "Bus listener started"
        );

        while running.load(Ordering::SeqCst) {
            match self.transport.recv_frame(self.poll_timeout) {
                Ok(Some(frame)) => self.dispatch(&frame, Instant::now()),
                Ok(None) => {}
                Err(e) => {
                    error!(%e, "CAN receive error");
                    std::thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        info!("Bus listener stopped");
    }

    /// Route one frame to every channel registered for its identifier.
    ///
    /// Unknown identifiers, truncated payloads and non-SecurityAccess
    /// diagnostics are dropped without touching the vehicle state.
    pub fn dispatch(&self, frame: &BusFrame, now: Instant) {
        let payload = frame.payload();
        let mut matched = false;

        for channel in self.layout.channels_for(frame.id) {
            matched = true;
            match channel {
                Channel::Diagnostic => self.handle_diagnostic(payload, now),
                telemetry => {
                    match codec::decode_telemetry(telemetry, payload, &self.layout, self.speed_model)
                    {
                        Some(update) => {
                            debug!(?update, "Telemetry update");
                            self.store.apply_telemetry(update);
                        }
                        None => debug!(
                            id = frame.id,
                            len = payload.len(),
                            "Dropped short telemetry frame"
                        ),
                    }
                }
            }
        }

        if !matched {
            debug!(id = frame.id, "Ignored frame with unknown identifier");
        }
    }

    fn handle_diagnostic(&self, payload: &[u8], now: Instant) {
        let Some(request) = decode_uds_request(payload) else {
            debug!(data = ?payload, "Ignored non-SecurityAccess diagnostic frame");
            return;
        };

        let Some(response) = self.store.handle_uds(request, now) else {
            return;
        };

        let bytes = response.to_bytes();
        match BusFrame::new(self.response_id, &bytes) {
            Ok(frame) => {
                debug!(response = ?bytes, "Sending UDS response");
                if let Err(e) = self.transport.send_frame(&frame) {
                    error!(%e, "Failed to send UDS response");
                }
            }
            Err(e) => error!(%e, "Failed to build UDS response frame"),
        }
    }
}
