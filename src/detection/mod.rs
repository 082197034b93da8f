//! Weapon Detection State Machine
//!
//! Consumes player snapshots and drives the session controller: assigns the
//! pattern matching the actively-held eligible weapon, starts compensation
//! when it should run, and stops it again — but only when this machine
//! started it. A session the operator started manually is never stopped
//! here.
//!
//! Snapshots may arrive from a different thread than the one draining them;
//! the processing step runs under a single mutex so one snapshot is always
//! processed fully before the next is accepted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod snapshot;

pub use snapshot::{PlayerSnapshot, WeaponCategory, WeaponRef, WeaponSnapshot, WeaponTable};

use crate::engine::events::Broadcast;
use crate::engine::{RecoilController, StartMode};

/// Detection tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Assign patterns automatically on weapon change
    #[serde(default = "default_true")]
    pub auto_switch: bool,

    /// Start/stop the session automatically
    #[serde(default = "default_true")]
    pub auto_control: bool,

    /// Low-ammo boundary for [`AmmoEvent::Low`]
    #[serde(default = "default_low_ammo_threshold")]
    pub low_ammo_threshold: u32,
}

fn default_true() -> bool {
    true
}
fn default_low_ammo_threshold() -> u32 {
    5
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            auto_switch: true,
            auto_control: true,
            low_ammo_threshold: default_low_ammo_threshold(),
        }
    }
}

/// Ammunition boundary crossings, for external low-ammo signalling.
///
/// Fired only on the crossing itself, never repeatedly while a magazine
/// sits empty or low.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmmoEvent {
    /// Ammo crossed into the low band (`0 < ammo <= threshold`)
    Low {
        /// Weapon id from the snapshot
        weapon: String,
        /// Rounds remaining
        remaining: u32,
    },
    /// Ammo crossed into empty
    Empty {
        /// Weapon id from the snapshot
        weapon: String,
    },
}

/// Ammo boundary result of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmmoTransition {
    None,
    Low(u32),
    Empty,
}

/// Tracked detection state. Single writer: the processing step.
#[derive(Debug, Default)]
pub struct DetectionState {
    current_weapon: Option<String>,
    previous_weapon: Option<String>,
    auto_started: bool,
    last_ammo: Option<u32>,
    weapon_changes: u64,
    snapshots_processed: u64,
}

impl DetectionState {
    /// Update the tracked weapon; true if it changed
    fn update_weapon(&mut self, weapon: Option<String>) -> bool {
        if weapon == self.current_weapon {
            return false;
        }
        self.previous_weapon = self.current_weapon.take();
        self.current_weapon = weapon;
        self.weapon_changes += 1;
        true
    }

    /// Observe an ammo count, reporting only boundary crossings
    fn observe_ammo(&mut self, ammo: u32, low_threshold: u32) -> AmmoTransition {
        let previous = self.last_ammo.replace(ammo);
        let Some(previous) = previous else {
            return AmmoTransition::None;
        };

        if ammo == 0 && previous != 0 {
            return AmmoTransition::Empty;
        }
        if ammo > 0 && ammo <= low_threshold && previous > low_threshold {
            return AmmoTransition::Low(ammo);
        }

        AmmoTransition::None
    }

    fn reset(&mut self) {
        self.current_weapon = None;
        self.previous_weapon = None;
        self.auto_started = false;
        self.last_ammo = None;
    }

    /// Tracked weapon (pattern id)
    pub fn current_weapon(&self) -> Option<&str> {
        self.current_weapon.as_deref()
    }

    /// Number of tracked weapon changes since enable
    pub fn weapon_changes(&self) -> u64 {
        self.weapon_changes
    }

    /// Number of snapshots processed since construction
    pub fn snapshots_processed(&self) -> u64 {
        self.snapshots_processed
    }
}

/// Snapshot-driven automatic session control
pub struct WeaponDetector {
    controller: Arc<RecoilController>,
    table: Arc<WeaponTable>,
    config: DetectionConfig,
    enabled: AtomicBool,
    state: Mutex<DetectionState>,
    ammo_events: Broadcast<AmmoEvent>,
}

impl WeaponDetector {
    /// Build a detector over a controller and a resolved weapon table
    pub fn new(
        controller: Arc<RecoilController>,
        table: Arc<WeaponTable>,
        config: DetectionConfig,
    ) -> Self {
        debug!(weapons = table.len(), "weapon detector initialized");
        Self {
            controller,
            table,
            config,
            enabled: AtomicBool::new(false),
            state: Mutex::new(DetectionState::default()),
            ammo_events: Broadcast::new(),
        }
    }

    /// Whether detection is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Subscribe to ammo boundary events
    pub fn subscribe_ammo(&self) -> Receiver<AmmoEvent> {
        self.ammo_events.subscribe()
    }

    /// Enable automatic detection.
    ///
    /// Clears any manually assigned weapon so state stays clean until the
    /// collaborator provides weapon data; a running session is left running
    /// (it idles until a pattern is assigned).
    pub fn enable(&self) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock();
        state.reset();
        self.controller.set_detection_active(true);

        if self.controller.current_weapon().is_some() {
            debug!("clearing manually assigned weapon");
            let _ = self.controller.set_weapon(None);
        } else {
            self.controller.emit_status();
        }

        tracing::info!("weapon detection enabled");
    }

    /// Disable automatic detection.
    ///
    /// Stops the session only if this detector auto-started it.
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock();
        if state.auto_started && self.controller.is_active() {
            if self.controller.stop().is_ok() {
                state.auto_started = false;
            }
        }
        state.reset();

        self.controller.set_detection_active(false);
        self.controller.emit_status();

        tracing::info!("weapon detection disabled");
    }

    /// Toggle enabled state
    pub fn toggle(&self) {
        if self.is_enabled() {
            self.disable();
        } else {
            self.enable();
        }
    }

    /// Process one player snapshot.
    ///
    /// Non-reentrant: the whole step runs under the state mutex, so a
    /// snapshot is always handled fully before the next one is accepted.
    /// Never blocks on the session thread.
    pub fn process(&self, snapshot: &PlayerSnapshot) {
        if !self.is_enabled() {
            return;
        }

        let mut state = self.state.lock();
        state.snapshots_processed += 1;

        let target = self.target_pattern(snapshot);

        self.apply_weapon_change(&mut state, target.clone());
        self.apply_session_control(&mut state, target.is_some());
        self.monitor_ammo(&mut state, snapshot);
    }

    /// Pattern id of the weapon compensation should track, if any
    fn target_pattern(&self, snapshot: &PlayerSnapshot) -> Option<String> {
        if !snapshot.is_alive {
            return None;
        }

        let weapon = snapshot.active_weapon.as_ref()?;
        if !weapon.is_active || weapon.ammo_clip == 0 {
            return None;
        }

        let resolved = self.table.resolve(&weapon.id)?;
        if resolved.category != WeaponCategory::Primary {
            return None;
        }

        Some(resolved.pattern.clone())
    }

    fn apply_weapon_change(&self, state: &mut DetectionState, target: Option<String>) {
        if !state.update_weapon(target.clone()) || !self.config.auto_switch {
            return;
        }

        match target {
            Some(pattern) => {
                if self.controller.set_weapon(Some(&pattern)).is_ok() {
                    debug!(weapon = %pattern, "auto-switched weapon");
                } else {
                    warn!(weapon = %pattern, "auto-switch failed");
                }
            }
            None => {
                // Only a session this machine started may be stopped here.
                if state.auto_started && self.controller.is_active() {
                    if self.controller.stop().is_ok() {
                        state.auto_started = false;
                    }
                }
                let _ = self.controller.set_weapon(None);
                debug!("no eligible weapon detected");
            }
        }
    }

    fn apply_session_control(&self, state: &mut DetectionState, should_compensate: bool) {
        if !self.config.auto_control {
            return;
        }

        let running = self.controller.is_active();

        if should_compensate && !running && state.current_weapon.is_some() {
            match self.controller.start(StartMode::Auto) {
                Ok(()) => {
                    state.auto_started = true;
                    debug!("session auto-started");
                }
                Err(e) => warn!(error = %e, "session auto-start failed"),
            }
        } else if !should_compensate && running && state.auto_started {
            if self.controller.stop().is_ok() {
                state.auto_started = false;
                debug!("session auto-stopped");
            }
        }
    }

    fn monitor_ammo(&self, state: &mut DetectionState, snapshot: &PlayerSnapshot) {
        let Some(weapon) = snapshot.active_weapon.as_ref() else {
            return;
        };

        let eligible = self
            .table
            .resolve(&weapon.id)
            .is_some_and(|r| r.category == WeaponCategory::Primary)
            && weapon.is_active;

        match state.observe_ammo(weapon.ammo_clip, self.config.low_ammo_threshold) {
            AmmoTransition::Empty => {
                debug!(weapon = %weapon.id, "magazine empty");
                self.ammo_events.broadcast(AmmoEvent::Empty {
                    weapon: weapon.id.clone(),
                });
            }
            AmmoTransition::Low(remaining) if eligible => {
                debug!(weapon = %weapon.id, remaining, "low ammo");
                self.ammo_events.broadcast(AmmoEvent::Low {
                    weapon: weapon.id.clone(),
                    remaining,
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ControllerOptions, RecoilController};
    use crate::input::{NullCursor, SwitchTrigger, TriggerSource};
    use crate::pattern::{ProfileStore, RecoilPoint, WeaponProfileSpec};
    use crate::timing::TimingOracle;

    fn spec(name: &str) -> WeaponProfileSpec {
        WeaponProfileSpec {
            name: name.to_string(),
            display_name: name.to_uppercase(),
            raw_pattern: vec![RecoilPoint::new(0.0, 4.0, 2.0), RecoilPoint::new(2.0, 8.0, 2.0)],
            length: 30,
            multiple: 2,
            sleep_divider: 2.0,
            sleep_suber: 0.0,
            jitter_timing_ms: 0.0,
            jitter_movement_pct: 0.0,
        }
    }

    fn table() -> WeaponTable {
        let mut table = WeaponTable::new();
        table.register("weapon_ak47", "ak47", WeaponCategory::Primary);
        table.register("weapon_m4a4", "m4a4", WeaponCategory::Primary);
        table.register("weapon_deagle", "deagle", WeaponCategory::Secondary);
        table
    }

    fn detector() -> (Arc<RecoilController>, WeaponDetector) {
        let profiles =
            Arc::new(ProfileStore::from_specs(vec![spec("ak47"), spec("m4a4")]).unwrap());
        let controller = Arc::new(RecoilController::new(
            profiles,
            Arc::new(SwitchTrigger::new()) as Arc<dyn TriggerSource>,
            Arc::new(NullCursor::new()),
            Arc::new(TimingOracle::new()),
            ControllerOptions::default(),
        ));
        let detector = WeaponDetector::new(
            Arc::clone(&controller),
            Arc::new(table()),
            DetectionConfig::default(),
        );
        (controller, detector)
    }

    fn holding(weapon: &str, ammo: u32) -> PlayerSnapshot {
        PlayerSnapshot {
            is_alive: true,
            active_weapon: Some(WeaponSnapshot {
                id: weapon.to_string(),
                is_active: true,
                ammo_clip: ammo,
            }),
        }
    }

    #[test]
    fn eligible_weapon_auto_starts_session() {
        let (controller, detector) = detector();
        detector.enable();

        detector.process(&holding("weapon_ak47", 30));

        assert!(controller.is_active());
        assert_eq!(controller.current_weapon().as_deref(), Some("ak47"));

        detector.disable();
        assert!(!controller.is_active());
    }

    #[test]
    fn sidearm_is_not_compensable() {
        let (controller, detector) = detector();
        detector.enable();

        detector.process(&holding("weapon_deagle", 7));

        assert!(!controller.is_active());
        assert_eq!(controller.current_weapon(), None);
    }

    #[test]
    fn dead_player_stops_auto_started_session() {
        let (controller, detector) = detector();
        detector.enable();

        detector.process(&holding("weapon_ak47", 30));
        assert!(controller.is_active());

        detector.process(&PlayerSnapshot {
            is_alive: false,
            active_weapon: None,
        });

        assert!(!controller.is_active());
        assert_eq!(controller.current_weapon(), None);
    }

    #[test]
    fn weapon_swap_reassigns_pattern() {
        let (controller, detector) = detector();
        detector.enable();

        detector.process(&holding("weapon_ak47", 30));
        detector.process(&holding("weapon_m4a4", 30));

        assert_eq!(controller.current_weapon().as_deref(), Some("m4a4"));
        assert!(controller.is_active());

        detector.disable();
    }

    #[test]
    fn manually_started_session_survives_detection_cycle() {
        let (controller, detector) = detector();
        controller.set_weapon(Some("ak47")).unwrap();
        controller.start(StartMode::Manual).unwrap();

        detector.enable();
        detector.disable();

        assert!(controller.is_active());
        controller.stop().unwrap();
    }

    #[test]
    fn detector_never_stops_manual_session_on_ineligible_snapshot() {
        let (controller, detector) = detector();
        controller.set_weapon(Some("ak47")).unwrap();
        controller.start(StartMode::Manual).unwrap();

        detector.enable();
        detector.process(&holding("weapon_deagle", 7));

        assert!(controller.is_active());
        controller.stop().unwrap();
    }

    #[test]
    fn snapshots_ignored_while_disabled() {
        let (controller, detector) = detector();
        detector.process(&holding("weapon_ak47", 30));
        assert!(!controller.is_active());
    }

    #[test]
    fn low_ammo_fires_once_per_crossing() {
        let (_controller, detector) = detector();
        detector.enable();
        let ammo = detector.subscribe_ammo();

        detector.process(&holding("weapon_ak47", 30));
        // Oscillate around the threshold (5): each downward crossing fires
        // exactly once, sitting below it fires nothing.
        detector.process(&holding("weapon_ak47", 5));
        detector.process(&holding("weapon_ak47", 4));
        detector.process(&holding("weapon_ak47", 6));
        detector.process(&holding("weapon_ak47", 5));

        let events: Vec<AmmoEvent> = ammo.try_iter().collect();
        assert_eq!(
            events,
            vec![
                AmmoEvent::Low {
                    weapon: "weapon_ak47".to_string(),
                    remaining: 5
                },
                AmmoEvent::Low {
                    weapon: "weapon_ak47".to_string(),
                    remaining: 5
                },
            ]
        );

        detector.disable();
    }

    #[test]
    fn empty_magazine_fires_once_until_reload() {
        let (_controller, detector) = detector();
        detector.enable();
        let ammo = detector.subscribe_ammo();

        detector.process(&holding("weapon_ak47", 2));
        detector.process(&holding("weapon_ak47", 0));
        detector.process(&holding("weapon_ak47", 0));
        detector.process(&holding("weapon_ak47", 0));
        detector.process(&holding("weapon_ak47", 30));
        detector.process(&holding("weapon_ak47", 0));

        let empties = ammo
            .try_iter()
            .filter(|e| matches!(e, AmmoEvent::Empty { .. }))
            .count();
        assert_eq!(empties, 2);

        detector.disable();
    }

    #[test]
    fn enable_clears_manually_assigned_weapon() {
        let (controller, detector) = detector();
        controller.set_weapon(Some("ak47")).unwrap();

        detector.enable();

        assert_eq!(controller.current_weapon(), None);
        assert!(!controller.manual_activation_allowed());

        detector.disable();
        assert!(controller.manual_activation_allowed());
    }
}
