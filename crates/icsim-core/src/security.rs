//! SecurityAccess (0x27) seed/key state machine
//!
//! ```text
//!            RequestSeed (positive response, seed S)
//!   ┌──────┐ ─────────────────────────────────────▶ ┌─────────────┐
//!   │ Idle │                                        │ AwaitingKey │ ── RequestSeed: new seed
//!   └──────┘ ◀───────────────────────────────────── └─────────────┘ ── wrong key: NRC 0x35
//!             SendKey == S ^ 0xAA (unlock)
//!             SendKey after timeout (no response)
//! ```
//!
//! The seed is a plain pseudo-random byte and the key a fixed XOR. Both are
//! deliberately weak: this is a training target for bus-level attacks, not an
//! authentication mechanism.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::state::VehicleState;
use crate::uds::{security_sub_function, service_id, UdsRequest, UdsResponse};

/// Seed-to-key mask
pub const KEY_XOR_MASK: u8 = 0xAA;

/// Window between seed issue and key arrival
pub const DEFAULT_KEY_TIMEOUT: Duration = Duration::from_secs(10);

/// Key expected for a given seed
pub const fn calculate_key(seed: u8) -> u8 {
    seed ^ KEY_XOR_MASK
}

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityState {
    #[default]
    Idle,
    /// A seed has been issued and a key is expected
    AwaitingKey { seed: u8, issued_at: Instant },
}

/// SecurityAccess state machine
pub struct SecurityAccess {
    state: SecurityState,
    timeout: Duration,
    /// Drop back to Idle after a wrong key instead of keeping the seed open
    reset_on_invalid_key: bool,
    rng: StdRng,
}

impl Default for SecurityAccess {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_TIMEOUT)
    }
}

impl SecurityAccess {
    pub fn new(timeout: Duration) -> Self {
        Self::with_rng(timeout, StdRng::from_entropy())
    }

    /// Deterministic seed sequence, for reproducible sessions and tests
    pub fn with_seed(rng_seed: u64) -> Self {
        Self::with_rng(DEFAULT_KEY_TIMEOUT, StdRng::seed_from_u64(rng_seed))
    }

    fn with_rng(timeout: Duration, rng: StdRng) -> Self {
        Self {
            state: SecurityState::Idle,
            timeout,
            reset_on_invalid_key: false,
            rng,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn reset_on_invalid_key(mut self, reset: bool) -> Self {
        self.reset_on_invalid_key = reset;
        self
    }

    pub fn state(&self) -> SecurityState {
        self.state
    }

    /// Outstanding challenge, if any
    pub fn pending_seed(&self) -> Option<u8> {
        match self.state {
            SecurityState::AwaitingKey { seed, .. } => Some(seed),
            SecurityState::Idle => None,
        }
    }

    /// Process one request at `now`.
    ///
    /// `None` means no frame is transmitted: the sub-function is unsupported,
    /// no seed is outstanding, the key byte is missing, or the key arrived
    /// after the timeout.
    pub fn handle_request(
        &mut self,
        request: UdsRequest,
        now: Instant,
        vehicle: &mut VehicleState,
    ) -> Option<UdsResponse> {
        if request.service != service_id::SECURITY_ACCESS {
            return None;
        }

        match (request.subfunction, self.state) {
            (security_sub_function::REQUEST_SEED, _) => {
                let seed: u8 = self.rng.gen();
                self.state = SecurityState::AwaitingKey {
                    seed,
                    issued_at: now,
                };
                info!(seed = format!("0x{:02X}", seed), "Security access: providing seed");
                Some(UdsResponse::seed(seed))
            }
            (security_sub_function::SEND_KEY, SecurityState::AwaitingKey { seed, issued_at }) => {
                if now.saturating_duration_since(issued_at) > self.timeout {
                    self.state = SecurityState::Idle;
                    info!("Security access: seed expired, key ignored");
                    return None;
                }

                let key = request.key?;
                let expected = calculate_key(seed);

                if key == expected {
                    vehicle.set_lock(false, now);
                    self.state = SecurityState::Idle;
                    info!("Security access: key accepted, vehicle unlocked");
                    Some(UdsResponse::key_accepted())
                } else {
                    vehicle.set_lock(true, now);
                    if self.reset_on_invalid_key {
                        self.state = SecurityState::Idle;
                    }
                    warn!(
                        received = format!("0x{:02X}", key),
                        expected = format!("0x{:02X}", expected),
                        "Security access: invalid key (NRC 0x35)"
                    );
                    Some(UdsResponse::invalid_key())
                }
            }
            (subfunction, state) => {
                debug!(subfunction, ?state, "Security access: request ignored");
                None
            }
        }
    }
}
