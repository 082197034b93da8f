//! Input Abstractions
//!
//! The engine is agnostic to where the trigger signal comes from and where
//! cursor movement goes. Embedding applications supply both through these
//! traits; the [`synthetic`] module provides deterministic implementations
//! for the simulator binary and tests.

use thiserror::Error;

pub mod synthetic;

pub use synthetic::{FailingCursor, HoldForTrigger, NullCursor, RecordingCursor, SwitchTrigger};

/// Cursor-movement failure.
///
/// The session logs these and skips the tick's movement; they never abort a
/// running session.
#[derive(Error, Debug)]
#[error("cursor movement rejected: {0}")]
pub struct CursorError(pub String);

/// The operator-held input gating whether compensation applies.
///
/// Polled, not pushed: the session thread samples it at every tick, so
/// implementations must be cheap and non-blocking.
pub trait TriggerSource: Send + Sync {
    /// Whether the designated input is currently held
    fn is_held(&self) -> bool;
}

/// Relative cursor-movement primitive.
pub trait CursorSink: Send + Sync {
    /// Apply an integer relative movement
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), CursorError>;
}
