//! Presentation driver
//!
//! Runs the fixed-rate cycle: snapshot, diff against the last drawn state,
//! hand changed regions to the [`Dashboard`], then check auto-relock. The
//! core never draws anything itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::state::{diff, RedrawFlags, VehicleState, VehicleStore};

/// Default dashboard refresh rate
pub const DEFAULT_FPS: u32 = 60;

/// Highest refresh rate accepted from configuration
pub const MAX_FPS: u32 = 1000;

/// Tick period for `fps`, clamped to `1..=MAX_FPS`
pub fn frame_period(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.clamp(1, MAX_FPS)
}

/// Consumer of reconciled state
pub trait Dashboard: Send {
    /// Redraw the regions marked in `flags` from `snapshot`
    fn render(&mut self, snapshot: &VehicleState, flags: RedrawFlags);
}

/// Headless dashboard that reports changed regions through tracing
#[derive(Debug, Default)]
pub struct LogDashboard;

impl Dashboard for LogDashboard {
    fn render(&mut self, snapshot: &VehicleState, flags: RedrawFlags) {
        if flags.speed {
            info!(speed = snapshot.speed, "Speedometer");
        }
        if flags.doors {
            let doors: Vec<&str> = snapshot
                .door_locked
                .iter()
                .map(|locked| if *locked { "locked" } else { "unlocked" })
                .collect();
            info!(
                front_left = doors[0],
                front_right = doors[1],
                rear_left = doors[2],
                rear_right = doors[3],
                "Doors"
            );
        }
        if flags.turn {
            info!(
                left = snapshot.turn_signal[0],
                right = snapshot.turn_signal[1],
                "Turn signals"
            );
        }
        if flags.lock {
            info!(engaged = snapshot.lock_engaged, "Central lock");
        }
    }
}

pub struct PresentationDriver<D: Dashboard> {
    store: Arc<VehicleStore>,
    dashboard: D,
    /// Last state handed to the dashboard; `None` before the first draw
    drawn: Option<VehicleState>,
}

impl<D: Dashboard> PresentationDriver<D> {
    pub fn new(store: Arc<VehicleStore>, dashboard: D) -> Self {
        Self {
            store,
            dashboard,
            drawn: None,
        }
    }

    pub fn dashboard(&self) -> &D {
        &self.dashboard
    }

    /// One presentation cycle at `now`; returns what was redrawn
    pub fn tick(&mut self, now: Instant) -> RedrawFlags {
        let snapshot = self.store.snapshot();

        let flags = match &self.drawn {
            Some(previous) => diff(previous, &snapshot),
            None => RedrawFlags::all(),
        };

        if flags.any() {
            self.dashboard.render(&snapshot, flags);
            self.drawn = Some(snapshot);
        }

        // The relock lands in the store; the next tick redraws the lock icon
        self.store.check_auto_relock(now);

        flags
    }

    /// Tick at `fps` until `running` is cleared
    pub async fn run(mut self, running: Arc<AtomicBool>, fps: u32) {
        let mut interval = tokio::time::interval(frame_period(fps));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(fps, "Presentation driver started");

        while running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.tick(Instant::now());
        }

        info!("Presentation driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityAccess;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingDashboard {
        frames: Vec<(VehicleState, RedrawFlags)>,
    }

    impl Dashboard for RecordingDashboard {
        fn render(&mut self, snapshot: &VehicleState, flags: RedrawFlags) {
            self.frames.push((*snapshot, flags));
        }
    }

    fn driver() -> (PresentationDriver<RecordingDashboard>, Arc<VehicleStore>) {
        let store = Arc::new(VehicleStore::new(SecurityAccess::with_seed(1)));
        (
            PresentationDriver::new(store.clone(), RecordingDashboard::default()),
            store,
        )
    }

    #[test]
    fn test_frame_period_is_never_zero() {
        assert_eq!(frame_period(60), Duration::from_secs(1) / 60);
        assert_eq!(frame_period(0), Duration::from_secs(1));
        assert_eq!(frame_period(2_000_000_000), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_run_with_excessive_fps_stops_cleanly() {
        let (driver, _) = driver();
        let running = Arc::new(AtomicBool::new(false));

        driver.run(running, 2_000_000_000).await;
    }

    #[test]
    fn test_first_tick_draws_everything() {
        let (mut driver, _) = driver();
        assert_eq!(driver.tick(Instant::now()), RedrawFlags::all());
        assert_eq!(driver.dashboard().frames.len(), 1);
    }

    #[test]
    fn test_idle_ticks_do_not_redraw() {
        let (mut driver, _) = driver();
        let t = Instant::now();
        driver.tick(t);

        assert!(!driver.tick(t).any());
        assert!(!driver.tick(t).any());
        assert_eq!(driver.dashboard().frames.len(), 1);
    }

    #[test]
    fn test_changed_region_is_redrawn() {
        let (mut driver, store) = driver();
        let t = Instant::now();
        driver.tick(t);

        store.apply_speed_update(40);
        let flags = driver.tick(t);

        assert_eq!(
            flags,
            RedrawFlags {
                speed: true,
                ..Default::default()
            }
        );
        let (snapshot, _) = driver.dashboard().frames.last().copied().unwrap();
        assert_eq!(snapshot.speed, 40);
    }

    #[test]
    fn test_auto_relock_is_drawn_on_next_tick() {
        let (mut driver, store) = driver();
        let t = Instant::now();
        driver.tick(t);

        store.apply_lock(false, t);
        assert!(driver.tick(t).lock);

        // Relocks during this tick, after the snapshot was drawn
        driver.tick(t + Duration::from_millis(30_001));
        assert!(store.snapshot().lock_engaged);

        let flags = driver.tick(t + Duration::from_millis(30_002));
        assert!(flags.lock);
        let (snapshot, _) = driver.dashboard().frames.last().copied().unwrap();
        assert!(snapshot.lock_engaged);
    }
}
