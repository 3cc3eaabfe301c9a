//! Vehicle state store and change detection
//!
//! [`VehicleStore`] owns the single authoritative [`VehicleState`] together
//! with the [`SecurityAccess`] machine. One lock guards both, so a snapshot
//! always reflects a single instant and a key acceptance updates the lock
//! flag and the security state together.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::codec::TelemetryUpdate;
use crate::security::{SecurityAccess, SecurityState};
use crate::uds::{UdsRequest, UdsResponse};

/// Default inactivity window before the central lock re-engages
pub const DEFAULT_AUTO_RELOCK: Duration = Duration::from_secs(30);

/// Simulated vehicle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleState {
    /// Speed in display units (mph for the default decoder)
    pub speed: u32,
    /// One flag per door, `true` = locked
    pub door_locked: [bool; 4],
    /// `[left, right]`
    pub turn_signal: [bool; 2],
    /// Central lock
    pub lock_engaged: bool,
    /// Set when the central lock was last released
    pub unlock_timestamp: Option<Instant>,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            speed: 0,
            door_locked: [true; 4],
            turn_signal: [false; 2],
            lock_engaged: true,
            unlock_timestamp: None,
        }
    }
}

impl VehicleState {
    pub fn apply(&mut self, update: TelemetryUpdate) {
        match update {
            TelemetryUpdate::Doors(doors) => self.door_locked = doors,
            TelemetryUpdate::Signals(signals) => self.turn_signal = signals,
            TelemetryUpdate::Speed(speed) => self.speed = speed,
        }
    }

    /// Engage or release the central lock; releasing records `now`
    pub fn set_lock(&mut self, engaged: bool, now: Instant) {
        if !engaged {
            self.unlock_timestamp = Some(now);
        }
        self.lock_engaged = engaged;
    }
}

/// Regions that changed between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedrawFlags {
    pub speed: bool,
    pub doors: bool,
    pub turn: bool,
    pub lock: bool,
}

impl RedrawFlags {
    /// Every region dirty (initial draw)
    pub fn all() -> Self {
        Self {
            speed: true,
            doors: true,
            turn: true,
            lock: true,
        }
    }

    pub fn any(&self) -> bool {
        self.speed || self.doors || self.turn || self.lock
    }
}

/// Field-wise comparison of two snapshots
pub fn diff(prev: &VehicleState, curr: &VehicleState) -> RedrawFlags {
    RedrawFlags {
        speed: prev.speed != curr.speed,
        doors: prev.door_locked != curr.door_locked,
        turn: prev.turn_signal != curr.turn_signal,
        lock: prev.lock_engaged != curr.lock_engaged,
    }
}

struct Cabin {
    vehicle: VehicleState,
    security: SecurityAccess,
}

/// Shared vehicle state, mutated by the bus listener and read by the
/// presentation driver
pub struct VehicleStore {
    inner: Mutex<Cabin>,
    auto_relock: Duration,
}

impl VehicleStore {
    pub fn new(security: SecurityAccess) -> Self {
        Self::with_auto_relock(security, DEFAULT_AUTO_RELOCK)
    }

    pub fn with_auto_relock(security: SecurityAccess, auto_relock: Duration) -> Self {
        Self {
            inner: Mutex::new(Cabin {
                vehicle: VehicleState::default(),
                security,
            }),
            auto_relock,
        }
    }

    pub fn apply_door_update(&self, doors: [bool; 4]) {
        self.inner.lock().vehicle.door_locked = doors;
    }

    pub fn apply_signal_update(&self, signals: [bool; 2]) {
        self.inner.lock().vehicle.turn_signal = signals;
    }

    pub fn apply_speed_update(&self, speed: u32) {
        self.inner.lock().vehicle.speed = speed;
    }

    pub fn apply_lock(&self, engaged: bool, now: Instant) {
        self.inner.lock().vehicle.set_lock(engaged, now);
    }

    pub fn apply_telemetry(&self, update: TelemetryUpdate) {
        self.inner.lock().vehicle.apply(update);
    }

    /// Run a SecurityAccess request through the state machine.
    ///
    /// Returns the response to transmit, or `None` when the request is
    /// silently dropped (timeout, unsupported sub-function, no pending seed).
    pub fn handle_uds(&self, request: UdsRequest, now: Instant) -> Option<UdsResponse> {
        let mut cabin = self.inner.lock();
        let Cabin { vehicle, security } = &mut *cabin;
        security.handle_request(request, now, vehicle)
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> VehicleState {
        self.inner.lock().vehicle
    }

    /// Re-engage the central lock once it has been released for longer than
    /// the auto-relock window. Returns `true` on that transition.
    pub fn check_auto_relock(&self, now: Instant) -> bool {
        let mut cabin = self.inner.lock();
        let vehicle = &mut cabin.vehicle;

        if vehicle.lock_engaged {
            return false;
        }
        let Some(unlocked_at) = vehicle.unlock_timestamp else {
            return false;
        };

        if now.saturating_duration_since(unlocked_at) > self.auto_relock {
            vehicle.lock_engaged = true;
            info!(
                after_secs = self.auto_relock.as_secs(),
                "Auto-relock after inactivity"
            );
            true
        } else {
            false
        }
    }

    /// Current security state, for diagnostics and tests
    pub fn security_state(&self) -> SecurityState {
        self.inner.lock().security.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> VehicleStore {
        VehicleStore::new(SecurityAccess::with_seed(7))
    }

    #[test]
    fn test_default_state() {
        let state = VehicleState::default();
        assert_eq!(state.speed, 0);
        assert_eq!(state.door_locked, [true; 4]);
        assert_eq!(state.turn_signal, [false; 2]);
        assert!(state.lock_engaged);
        assert_eq!(state.unlock_timestamp, None);
    }

    #[test]
    fn test_diff_identical_is_clean() {
        let state = VehicleState::default();
        assert_eq!(diff(&state, &state), RedrawFlags::default());

        let mut busy = state;
        busy.speed = 88;
        busy.turn_signal = [true, true];
        assert!(!diff(&busy, &busy).any());
    }

    #[test]
    fn test_diff_per_region() {
        let prev = VehicleState::default();

        let mut curr = prev;
        curr.door_locked[3] = false;
        assert_eq!(
            diff(&prev, &curr),
            RedrawFlags {
                doors: true,
                ..Default::default()
            }
        );

        let mut curr = prev;
        curr.speed = 1;
        curr.lock_engaged = false;
        assert_eq!(
            diff(&prev, &curr),
            RedrawFlags {
                speed: true,
                lock: true,
                ..Default::default()
            }
        );

        let mut curr = prev;
        curr.turn_signal[0] = true;
        assert!(diff(&prev, &curr).turn);
    }

    #[test]
    fn test_apply_updates() {
        let store = store();
        store.apply_door_update([false, true, false, true]);
        store.apply_signal_update([true, false]);
        store.apply_speed_update(55);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.door_locked, [false, true, false, true]);
        assert_eq!(snapshot.turn_signal, [true, false]);
        assert_eq!(snapshot.speed, 55);
    }

    #[test]
    fn test_apply_lock_records_unlock_time() {
        let store = store();
        let t = Instant::now();

        store.apply_lock(false, t);
        let snapshot = store.snapshot();
        assert!(!snapshot.lock_engaged);
        assert_eq!(snapshot.unlock_timestamp, Some(t));

        store.apply_lock(true, t + Duration::from_secs(1));
        assert!(store.snapshot().lock_engaged);
    }

    #[test]
    fn test_auto_relock_window() {
        let store = store();
        let t = Instant::now();
        store.apply_lock(false, t);

        assert!(!store.check_auto_relock(t + Duration::from_millis(29_999)));
        assert!(!store.snapshot().lock_engaged);

        assert!(!store.check_auto_relock(t + Duration::from_secs(30)));
        assert!(!store.snapshot().lock_engaged);

        assert!(store.check_auto_relock(t + Duration::from_millis(30_001)));
        assert!(store.snapshot().lock_engaged);

        // Already locked: no second transition
        assert!(!store.check_auto_relock(t + Duration::from_secs(60)));
    }

    #[test]
    fn test_auto_relock_ignores_locked_vehicle() {
        let store = store();
        assert!(!store.check_auto_relock(Instant::now() + Duration::from_secs(120)));
        assert!(store.snapshot().lock_engaged);
    }

    #[test]
    fn test_snapshot_is_consistent_under_concurrent_writes() {
        use std::sync::Arc;

        let store = Arc::new(store());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..10_000u32 {
                    let locked = i % 2 == 0;
                    store.apply_telemetry(TelemetryUpdate::Doors([locked; 4]));
                }
            })
        };

        for _ in 0..10_000 {
            let doors = store.snapshot().door_locked;
            assert!(doors.iter().all(|d| *d == doors[0]), "torn read: {doors:?}");
        }
        writer.join().unwrap();
    }
}
