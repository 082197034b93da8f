//! # recoil-engine
//!
//! Recoil compensation engine: turns a recorded displacement pattern into a
//! smooth, rounding-exact stream of relative cursor movements while a trigger
//! is held, and decides from live player snapshots when compensation should
//! run and which pattern applies.
//!
//! # Architecture
//!
//! ```text
//! recoil-engine
//!   ├─> Pattern Subdivider (pure, rounding-exact micro-movements)
//!   ├─> Timing Oracle (calibrated hybrid sleep, sub-millisecond)
//!   ├─> Compensation Session (dedicated thread, cooperative cancellation)
//!   └─> Weapon Detector (snapshot-driven start/stop/pattern selection)
//! ```
//!
//! # Data Flow
//!
//! **Configuration path:** TOML profiles → validated `WeaponProfile` →
//! cached calculated pattern (recomputed on tunable change, swapped whole).
//!
//! **Runtime path:** snapshots → `WeaponDetector` → `RecoilController`
//! (start/stop/set-weapon) → session thread → `CursorSink` deltas, with
//! status and position events fanned out to subscribers.
//!
//! The engine never touches the OS itself: trigger state comes in through
//! [`input::TriggerSource`] and movement goes out through
//! [`input::CursorSink`], both supplied by the embedding application.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Engine and profile configuration
pub mod config;

/// Weapon detection state machine and player snapshot types
pub mod detection;

/// Compensation session, controller, and event bus
pub mod engine;

/// Trigger and cursor abstractions plus synthetic implementations
pub mod input;

/// Recoil patterns: points, subdivision, weapon profiles
pub mod pattern;

/// High-precision timing oracle
pub mod timing;
