//! Synthetic trigger and cursor implementations
//!
//! Deterministic stand-ins for the OS input collaborators, used by the
//! `simulate` subcommand and the test suite.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::input::{CursorError, CursorSink, TriggerSource};

/// Trigger flipped on and off programmatically
#[derive(Debug, Default)]
pub struct SwitchTrigger {
    held: AtomicBool,
}

impl SwitchTrigger {
    /// Released trigger
    pub fn new() -> Self {
        Self::default()
    }

    /// Press the trigger
    pub fn press(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Release the trigger
    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

impl TriggerSource for SwitchTrigger {
    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// Trigger held for a fixed duration starting from the first poll
#[derive(Debug)]
pub struct HoldForTrigger {
    hold: Duration,
    first_poll: Mutex<Option<Instant>>,
}

impl HoldForTrigger {
    /// Trigger that stays held for `hold` after it is first observed
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            first_poll: Mutex::new(None),
        }
    }
}

impl TriggerSource for HoldForTrigger {
    fn is_held(&self) -> bool {
        let mut first = self.first_poll.lock();
        let start = *first.get_or_insert_with(Instant::now);
        start.elapsed() < self.hold
    }
}

/// Cursor sink recording every emitted delta
#[derive(Debug, Default)]
pub struct RecordingCursor {
    deltas: Mutex<Vec<(i32, i32)>>,
}

impl RecordingCursor {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All deltas emitted so far, in order
    pub fn deltas(&self) -> Vec<(i32, i32)> {
        self.deltas.lock().clone()
    }

    /// Number of emitted deltas
    pub fn count(&self) -> usize {
        self.deltas.lock().len()
    }

    /// Component-wise sum of all emitted deltas
    pub fn totals(&self) -> (i64, i64) {
        self.deltas
            .lock()
            .iter()
            .fold((0, 0), |(x, y), &(dx, dy)| (x + dx as i64, y + dy as i64))
    }
}

impl CursorSink for RecordingCursor {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), CursorError> {
        self.deltas.lock().push((dx, dy));
        Ok(())
    }
}

/// Cursor sink rejecting every Nth movement, recording the rest.
///
/// Models a transient injection failure: the sink works, fails once, and
/// works again.
#[derive(Debug)]
pub struct FailingCursor {
    inner: RecordingCursor,
    calls: AtomicUsize,
    fail_every: usize,
}

impl FailingCursor {
    /// Sink that fails every `fail_every`-th call (1-based)
    pub fn new(fail_every: usize) -> Self {
        Self {
            inner: RecordingCursor::new(),
            calls: AtomicUsize::new(0),
            fail_every: fail_every.max(1),
        }
    }

    /// Deltas that were accepted, in order
    pub fn deltas(&self) -> Vec<(i32, i32)> {
        self.inner.deltas()
    }

    /// Number of accepted deltas
    pub fn accepted(&self) -> usize {
        self.inner.count()
    }

    /// Number of rejected calls
    pub fn rejected(&self) -> usize {
        self.calls.load(Ordering::SeqCst) / self.fail_every
    }
}

impl CursorSink for FailingCursor {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), CursorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call % self.fail_every == 0 {
            return Err(CursorError(format!("injected failure on call {call}")));
        }
        self.inner.move_relative(dx, dy)
    }
}

/// Cursor sink that discards all movement
#[derive(Debug, Default)]
pub struct NullCursor;

impl NullCursor {
    /// New discarding sink
    pub fn new() -> Self {
        Self
    }
}

impl CursorSink for NullCursor {
    fn move_relative(&self, _dx: i32, _dy: i32) -> Result<(), CursorError> {
        Ok(())
    }
}
