//! Compensation Session Loop
//!
//! One dedicated thread runs this loop for the lifetime of a started
//! controller: it polls the trigger while a weapon is assigned, plays the
//! calculated pattern when the trigger is held, and checks the cooperative
//! cancellation flags at every tick so interruption latency stays bounded
//! by one tick interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, error, warn};

use crate::engine::events::{EventBus, PositionEvent, StatusEvent};
use crate::input::{CursorSink, TriggerSource};
use crate::pattern::{ProfileStore, RecoilPoint, WeaponProfile};
use crate::timing::TimingOracle;

/// State shared between the controller, the session thread, and the
/// weapon detector.
///
/// The weapon cell is the single mutable "current weapon" assignment; its
/// lock is only ever held for the clone/store itself, never across oracle
/// sleeps.
#[derive(Debug)]
pub(crate) struct EngineShared {
    pub(crate) weapon: Mutex<Option<String>>,
    pub(crate) active: AtomicBool,
    pub(crate) stop: AtomicBool,
    pub(crate) weapon_changed: AtomicBool,
    pub(crate) detection_active: AtomicBool,
    pub(crate) events: EventBus,
}

impl EngineShared {
    pub(crate) fn new() -> Self {
        Self {
            weapon: Mutex::new(None),
            active: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            weapon_changed: AtomicBool::new(false),
            detection_active: AtomicBool::new(false),
            events: EventBus::new(),
        }
    }

    pub(crate) fn status(&self) -> StatusEvent {
        StatusEvent {
            active: self.active.load(Ordering::SeqCst),
            current_weapon: self.weapon.lock().clone(),
            manual_activation_allowed: !self.detection_active.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn emit_status(&self) {
        self.events.emit_status(self.status());
    }
}

/// Outcome of one played sequence
enum PlayOutcome {
    /// All points exhausted with the trigger still held
    Completed,
    /// Trigger released or stop requested mid-sequence
    Interrupted,
    /// Weapon reassigned mid-sequence; re-arm with the new pattern
    WeaponChanged,
}

/// Everything the session thread owns
pub(crate) struct SessionRunner {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) profiles: Arc<ProfileStore>,
    pub(crate) trigger: Arc<dyn TriggerSource>,
    pub(crate) cursor: Arc<dyn CursorSink>,
    pub(crate) oracle: Arc<TimingOracle>,
    pub(crate) poll_interval_ms: f64,
    pub(crate) done_tx: Sender<()>,
}

impl SessionRunner {
    /// Session thread entry point
    pub(crate) fn run(self) {
        debug!("compensation loop started");
        let mut faulted = false;

        while !self.shared.stop.load(Ordering::SeqCst) {
            // Consume any pending change signal before sampling the cell, so
            // a reassignment landing after the read still aborts the play.
            self.shared.weapon_changed.store(false, Ordering::SeqCst);

            let weapon = self.shared.weapon.lock().clone();
            let Some(name) = weapon else {
                // No weapon assigned: idle at the poll interval. Keeps a
                // manually-started session alive across detection toggles.
                self.oracle.sleep_relative(self.poll_interval_ms);
                continue;
            };

            let Some(profile) = self.profiles.get(&name) else {
                error!(weapon = %name, "no profile available for compensation");
                faulted = true;
                break;
            };

            let pattern = profile.calculated_pattern();
            if pattern.is_empty() {
                error!(weapon = %name, "empty calculated pattern");
                faulted = true;
                break;
            }

            if self.trigger.is_held() {
                debug!(weapon = %name, "starting compensation sequence");
                let outcome = self.play(&profile, &pattern);
                self.shared.events.emit_position(PositionEvent::origin());

                match outcome {
                    PlayOutcome::WeaponChanged => continue,
                    PlayOutcome::Interrupted => {}
                    PlayOutcome::Completed => {
                        // One hold plays the pattern once; wait for release.
                        while self.trigger.is_held()
                            && !self.shared.stop.load(Ordering::SeqCst)
                            && !self.shared.weapon_changed.load(Ordering::SeqCst)
                        {
                            self.oracle.sleep_relative(self.poll_interval_ms);
                        }
                    }
                }
            }

            self.oracle.sleep_relative(self.poll_interval_ms);
        }

        self.shared.active.store(false, Ordering::SeqCst);
        if faulted {
            // Controller-driven stops emit their own status; an internal
            // fault is only visible from here.
            self.shared.emit_status();
        }
        debug!("compensation loop terminated");
        let _ = self.done_tx.send(());
    }

    /// Play one full sequence. Cancellation flags and the trigger are
    /// re-checked at every tick, never only between points.
    fn play(&self, profile: &WeaponProfile, pattern: &[RecoilPoint]) -> PlayOutcome {
        let begin = self.oracle.now_ms();
        let divider = profile.sleep_divider();
        let suber = profile.sleep_suber();

        let mut rng = rand::thread_rng();
        let move_scale = session_move_scale(profile.jitter_movement_pct(), &mut rng);
        let timing_noise = tick_timing_noise(profile.jitter_timing_ms());

        let mut frac_x = 0.0_f64;
        let mut frac_y = 0.0_f64;
        let mut offset_x = 0.0_f64;
        let mut offset_y = 0.0_f64;
        let mut scheduled = 0.0_f64;

        for (i, point) in pattern.iter().enumerate() {
            if self.shared.weapon_changed.load(Ordering::SeqCst) {
                debug!(index = i, "weapon changed during sequence");
                return PlayOutcome::WeaponChanged;
            }
            if !self.trigger.is_held() || self.shared.stop.load(Ordering::SeqCst) {
                debug!(index = i, "sequence interrupted");
                return PlayOutcome::Interrupted;
            }

            let delay = point.delay_ms / divider - suber;

            if i == 0 {
                // Point 0 only establishes the timing origin; no movement.
                scheduled = delay;
                self.oracle.sleep_until(scheduled, begin);
                continue;
            }

            // Accumulate fractional movement and emit the integer part,
            // carrying the remainder so rounding loss never accumulates.
            frac_x += point.dx * move_scale;
            frac_y += point.dy * move_scale;

            let dx = frac_x.trunc() as i32;
            let dy = frac_y.trunc() as i32;
            frac_x -= f64::from(dx);
            frac_y -= f64::from(dy);

            if dx != 0 || dy != 0 {
                match self.cursor.move_relative(dx, dy) {
                    Ok(()) => {
                        offset_x += f64::from(dx);
                        offset_y += f64::from(dy);
                    }
                    Err(e) => warn!(error = %e, "cursor movement failed, skipping tick"),
                }
            }
            self.shared
                .events
                .emit_position(PositionEvent { offset_x, offset_y });

            if i < pattern.len() - 1 {
                let mut step = delay;
                if let Some(noise) = &timing_noise {
                    step += noise.sample(&mut rng);
                }
                scheduled += step;
                self.oracle.sleep_until(scheduled, begin);
            }
        }

        debug!("compensation sequence completed");
        PlayOutcome::Completed
    }
}

/// Per-session humanization scale, drawn once so the pattern keeps its
/// shape while varying in magnitude. `N(1, pct/100/2)`, clamped so the
/// pattern direction never inverts.
fn session_move_scale(jitter_movement_pct: f64, rng: &mut impl Rng) -> f64 {
    if jitter_movement_pct <= 0.0 {
        return 1.0;
    }

    match Normal::new(1.0, jitter_movement_pct / 100.0 / 2.0) {
        Ok(dist) => dist.sample(rng).clamp(0.0, 2.0),
        Err(_) => 1.0,
    }
}

/// Per-tick timing perturbation, `N(0, jitter_ms/3)` so 99.7% of draws stay
/// within the configured bound
fn tick_timing_noise(jitter_timing_ms: f64) -> Option<Normal<f64>> {
    if jitter_timing_ms <= 0.0 {
        return None;
    }
    Normal::new(0.0, jitter_timing_ms / 3.0).ok()
}
