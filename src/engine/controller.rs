//! Session Controller
//!
//! The control surface for compensation: weapon assignment, start/stop, and
//! event subscriptions. The controller owns the session thread; shutdown is
//! cooperative (flag + bounded join) and never hangs the caller — if the
//! thread misses the deadline the controller logs a warning and marks
//! itself stopped anyway.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::engine::error::{EngineError, Result};
use crate::engine::events::{PositionEvent, StatusEvent};
use crate::engine::session::{EngineShared, SessionRunner};
use crate::input::{CursorSink, TriggerSource};
use crate::pattern::ProfileStore;
use crate::timing::TimingOracle;

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Interval between trigger polls in the session loop, milliseconds
    pub poll_interval_ms: f64,

    /// How long `stop()` waits for the session thread before forcing the
    /// stopped state
    pub stop_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1.0,
            stop_timeout: Duration::from_secs(1),
        }
    }
}

/// Who is asking for the session to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Operator-initiated; rejected while automatic detection is active
    Manual,
    /// Initiated by the weapon detection state machine
    Auto,
}

struct Worker {
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
}

/// Owns the compensation session thread and the shared weapon assignment
pub struct RecoilController {
    shared: Arc<EngineShared>,
    profiles: Arc<ProfileStore>,
    trigger: Arc<dyn TriggerSource>,
    cursor: Arc<dyn CursorSink>,
    oracle: Arc<TimingOracle>,
    options: ControllerOptions,
    worker: Mutex<Option<Worker>>,
}

impl RecoilController {
    /// Build a controller over the given collaborators
    pub fn new(
        profiles: Arc<ProfileStore>,
        trigger: Arc<dyn TriggerSource>,
        cursor: Arc<dyn CursorSink>,
        oracle: Arc<TimingOracle>,
        options: ControllerOptions,
    ) -> Self {
        debug!("recoil controller initialized");
        Self {
            shared: Arc::new(EngineShared::new()),
            profiles,
            trigger,
            cursor,
            oracle,
            options,
            worker: Mutex::new(None),
        }
    }

    /// Subscribe to status transitions
    pub fn subscribe_status(&self) -> Receiver<StatusEvent> {
        self.shared.events.subscribe_status()
    }

    /// Subscribe to per-tick position updates
    pub fn subscribe_position(&self) -> Receiver<PositionEvent> {
        self.shared.events.subscribe_position()
    }

    /// Current status snapshot
    pub fn status(&self) -> StatusEvent {
        self.shared.status()
    }

    /// Currently assigned weapon (pattern id)
    pub fn current_weapon(&self) -> Option<String> {
        self.shared.weapon.lock().clone()
    }

    /// Whether a session is running
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Whether a manual start would currently be accepted
    pub fn manual_activation_allowed(&self) -> bool {
        !self.shared.detection_active.load(Ordering::SeqCst)
    }

    /// Assign or clear the current weapon.
    ///
    /// A change while a session is running signals the session thread, which
    /// abandons the in-flight sequence and re-arms with the new pattern.
    /// Clearing never stops a running session by itself; conditional stops
    /// are the weapon detector's call (it knows who started the session).
    pub fn set_weapon(&self, weapon: Option<&str>) -> Result<()> {
        match weapon {
            None => {
                let changed = self.shared.weapon.lock().take().is_some();
                if changed {
                    info!("current weapon: none");
                    self.signal_weapon_change();
                    self.shared.emit_status();
                }
                Ok(())
            }
            Some(name) => {
                if !self.profiles.contains(name) {
                    warn!(weapon = %name, "weapon not found");
                    return Err(EngineError::UnknownWeapon(name.to_string()));
                }

                let changed = {
                    let mut cell = self.shared.weapon.lock();
                    let changed = cell.as_deref() != Some(name);
                    if changed {
                        *cell = Some(name.to_string());
                    }
                    changed
                };

                if changed {
                    info!(weapon = %name, "current weapon set");
                    self.signal_weapon_change();
                    self.shared.emit_status();
                } else {
                    debug!(weapon = %name, "weapon reconfirmed");
                }
                Ok(())
            }
        }
    }

    /// Start the compensation session.
    ///
    /// Rejected (not queued) while already active; manual starts are
    /// rejected while automatic detection owns the session.
    pub fn start(&self, mode: StartMode) -> Result<()> {
        if mode == StartMode::Manual && self.shared.detection_active.load(Ordering::SeqCst) {
            info!("manual compensation start blocked: automatic weapon detection active");
            return Err(EngineError::ManualActivationBlocked);
        }

        if self.is_active() {
            warn!("compensation already active");
            return Err(EngineError::AlreadyActive);
        }

        if self.current_weapon().is_none() {
            warn!("no weapon assigned");
            return Err(EngineError::NoWeaponAssigned);
        }

        // Reap a previously finished worker before spawning a new one.
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.handle.join();
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.weapon_changed.store(false, Ordering::SeqCst);
        self.shared.active.store(true, Ordering::SeqCst);

        let (done_tx, done_rx) = bounded(1);
        let runner = SessionRunner {
            shared: Arc::clone(&self.shared),
            profiles: Arc::clone(&self.profiles),
            trigger: Arc::clone(&self.trigger),
            cursor: Arc::clone(&self.cursor),
            oracle: Arc::clone(&self.oracle),
            poll_interval_ms: self.options.poll_interval_ms,
            done_tx,
        };

        match thread::Builder::new()
            .name("compensation-session".to_string())
            .spawn(move || runner.run())
        {
            Ok(handle) => {
                *self.worker.lock() = Some(Worker { handle, done_rx });
                if self.shared.detection_active.load(Ordering::SeqCst) {
                    debug!("compensation started (auto-detection)");
                } else {
                    info!("compensation started");
                }
                self.shared.emit_status();
                Ok(())
            }
            Err(e) => {
                self.shared.active.store(false, Ordering::SeqCst);
                error!(error = %e, "compensation start failed");
                Err(EngineError::SpawnFailed(e))
            }
        }
    }

    /// Stop the session. A no-op success when already idle.
    ///
    /// Waits for the session thread with a bounded timeout; on expiry the
    /// controller logs a warning and forces the stopped state rather than
    /// hanging the caller.
    pub fn stop(&self) -> Result<()> {
        let worker = self.worker.lock().take();
        if !self.is_active() && worker.is_none() {
            return Ok(());
        }

        self.shared.stop.store(true, Ordering::SeqCst);

        if let Some(worker) = worker {
            match worker.done_rx.recv_timeout(self.options.stop_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = worker.handle.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Availability over strict consistency: detach the
                    // thread and report stopped.
                    warn!(
                        timeout_ms = self.options.stop_timeout.as_millis() as u64,
                        "session thread did not stop in time; forcing stopped state"
                    );
                }
            }
        }

        self.shared.active.store(false, Ordering::SeqCst);
        if self.shared.detection_active.load(Ordering::SeqCst) {
            debug!("compensation stopped (auto-detection)");
        } else {
            info!("compensation stopped");
        }
        self.shared.emit_status();
        Ok(())
    }

    /// Flag that automatic detection currently owns session control
    pub(crate) fn set_detection_active(&self, active: bool) {
        self.shared
            .detection_active
            .store(active, Ordering::SeqCst);
    }

    /// Re-broadcast the current status to subscribers
    pub(crate) fn emit_status(&self) {
        self.shared.emit_status();
    }

    fn signal_weapon_change(&self) {
        if self.is_active() {
            self.shared.weapon_changed.store(true, Ordering::SeqCst);
            debug!("weapon change signalled to session thread");
        }
    }
}

impl Drop for RecoilController {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{NullCursor, SwitchTrigger};
    use crate::pattern::{RecoilPoint, WeaponProfileSpec};
    use crate::timing::{Strategy, TimingOracle};

    fn controller() -> (Arc<SwitchTrigger>, RecoilController) {
        let spec = WeaponProfileSpec {
            name: "ak47".to_string(),
            display_name: "AK-47".to_string(),
            raw_pattern: vec![
                RecoilPoint::new(0.0, 4.0, 2.0),
                RecoilPoint::new(2.0, 8.0, 2.0),
            ],
            length: 30,
            multiple: 2,
            sleep_divider: 2.0,
            sleep_suber: 0.0,
            jitter_timing_ms: 0.0,
            jitter_movement_pct: 0.0,
        };
        let profiles = Arc::new(ProfileStore::from_specs(vec![spec]).unwrap());
        let trigger = Arc::new(SwitchTrigger::new());

        let controller = RecoilController::new(
            profiles,
            Arc::clone(&trigger) as Arc<dyn TriggerSource>,
            Arc::new(NullCursor::new()),
            Arc::new(TimingOracle::with_strategy(Strategy::HighPrecision)),
            ControllerOptions::default(),
        );
        (trigger, controller)
    }

    #[test]
    fn start_requires_weapon() {
        let (_trigger, controller) = controller();
        assert!(matches!(
            controller.start(StartMode::Manual),
            Err(EngineError::NoWeaponAssigned)
        ));
    }

    #[test]
    fn set_weapon_rejects_unknown_names() {
        let (_trigger, controller) = controller();
        assert!(matches!(
            controller.set_weapon(Some("nova")),
            Err(EngineError::UnknownWeapon(_))
        ));
        assert_eq!(controller.current_weapon(), None);
    }

    #[test]
    fn double_start_is_rejected_not_queued() {
        let (_trigger, controller) = controller();
        controller.set_weapon(Some("ak47")).unwrap();

        controller.start(StartMode::Manual).unwrap();
        assert!(matches!(
            controller.start(StartMode::Manual),
            Err(EngineError::AlreadyActive)
        ));

        controller.stop().unwrap();
        assert!(!controller.is_active());
    }

    #[test]
    fn stop_when_idle_is_a_no_op_success() {
        let (_trigger, controller) = controller();
        assert!(controller.stop().is_ok());
    }

    #[test]
    fn manual_start_blocked_while_detection_active() {
        let (_trigger, controller) = controller();
        controller.set_weapon(Some("ak47")).unwrap();
        controller.set_detection_active(true);

        assert!(!controller.manual_activation_allowed());
        assert!(matches!(
            controller.start(StartMode::Manual),
            Err(EngineError::ManualActivationBlocked)
        ));

        // Auto starts still go through.
        controller.start(StartMode::Auto).unwrap();
        controller.stop().unwrap();
    }

    #[test]
    fn status_events_fire_on_transitions() {
        let (_trigger, controller) = controller();
        let rx = controller.subscribe_status();

        controller.set_weapon(Some("ak47")).unwrap();
        let ev = rx.recv().unwrap();
        assert_eq!(ev.current_weapon.as_deref(), Some("ak47"));
        assert!(!ev.active);

        controller.start(StartMode::Manual).unwrap();
        assert!(rx.recv().unwrap().active);

        controller.stop().unwrap();
        assert!(!rx.recv().unwrap().active);
    }

    /// Trigger whose poll wedges the session thread once entered
    struct WedgedTrigger {
        entered: std::sync::atomic::AtomicBool,
    }

    impl TriggerSource for WedgedTrigger {
        fn is_held(&self) -> bool {
            self.entered
                .store(true, std::sync::atomic::Ordering::SeqCst);
            thread::sleep(Duration::from_secs(30));
            false
        }
    }

    #[test]
    fn stop_timeout_forces_stopped_state_instead_of_hanging() {
        let spec = WeaponProfileSpec {
            name: "ak47".to_string(),
            display_name: "AK-47".to_string(),
            raw_pattern: vec![RecoilPoint::new(0.0, 4.0, 2.0)],
            length: 30,
            multiple: 2,
            sleep_divider: 2.0,
            sleep_suber: 0.0,
            jitter_timing_ms: 0.0,
            jitter_movement_pct: 0.0,
        };
        let trigger = Arc::new(WedgedTrigger {
            entered: std::sync::atomic::AtomicBool::new(false),
        });

        let controller = RecoilController::new(
            Arc::new(ProfileStore::from_specs(vec![spec]).unwrap()),
            Arc::clone(&trigger) as Arc<dyn TriggerSource>,
            Arc::new(NullCursor::new()),
            Arc::new(TimingOracle::with_strategy(Strategy::HighPrecision)),
            ControllerOptions {
                poll_interval_ms: 1.0,
                stop_timeout: Duration::from_millis(50),
            },
        );

        controller.set_weapon(Some("ak47")).unwrap();
        controller.start(StartMode::Manual).unwrap();

        // Wait until the session thread is actually wedged inside the poll,
        // so the stop flag cannot be observed before the deadline.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !trigger.entered.load(std::sync::atomic::Ordering::SeqCst) {
            assert!(std::time::Instant::now() < deadline, "session never polled");
            thread::sleep(Duration::from_millis(1));
        }

        let begin = std::time::Instant::now();
        controller.stop().unwrap();

        assert!(begin.elapsed() < Duration::from_secs(2));
        assert!(!controller.is_active());
    }

    #[test]
    fn weapon_reconfirmation_does_not_emit_status() {
        let (_trigger, controller) = controller();
        let rx = controller.subscribe_status();

        controller.set_weapon(Some("ak47")).unwrap();
        controller.set_weapon(Some("ak47")).unwrap();

        assert_eq!(rx.try_iter().count(), 1);
    }
}
