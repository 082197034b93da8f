//! High-Precision Timing Oracle
//!
//! OS sleep primitives carry 1-15 ms of scheduler granularity; recoil
//! scheduling needs roughly 0.1 ms. The oracle hybridizes OS sleep for the
//! bulk of a wait with a busy-wait for the tail, and always schedules
//! against an absolute target recomputed from the monotonic clock so error
//! never accumulates across a pattern's points.
//!
//! # Sleep strategy
//!
//! | Duration      | Approach                                   |
//! |---------------|--------------------------------------------|
//! | >= 10 ms      | OS sleep (duration − 3 ms), then busy-wait |
//! | 2 .. 10 ms    | OS sleep ~1 ms, then busy-wait             |
//! | < 2 ms        | busy-wait, yielding while > 0.2 ms slack   |
//!
//! Construction calibrates the cost of reading the clock and subtracts a
//! bounded correction (<= 0.1 ms) from very short sleeps. The [`Strategy::Standard`]
//! fallback degrades to plain `thread::sleep` without changing the contract.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Margin left for the busy-wait tail of long sleeps, milliseconds
const OS_SLEEP_MARGIN_MS: f64 = 3.0;

/// Slack below which the busy-wait stops yielding, milliseconds
const YIELD_SLACK_MS: f64 = 0.2;

/// Upper bound on the calibration correction, milliseconds
const MAX_CORRECTION_MS: f64 = 0.1;

/// Paired clock reads taken during calibration
const CALIBRATION_SAMPLES: u32 = 100;

/// Timing strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Hybrid OS sleep + busy-wait with calibration
    #[default]
    HighPrecision,
    /// Plain `thread::sleep`; accuracy degrades, the contract does not
    Standard,
}

/// Monotonic sub-millisecond clock with calibrated hybrid sleeping.
///
/// All timestamps are milliseconds since the oracle's construction.
#[derive(Debug)]
pub struct TimingOracle {
    epoch: Instant,
    strategy: Strategy,
    correction_ms: f64,
}

impl TimingOracle {
    /// High-precision oracle, calibrating clock-read overhead
    pub fn new() -> Self {
        Self::with_strategy(Strategy::HighPrecision)
    }

    /// Oracle with an explicit strategy
    pub fn with_strategy(strategy: Strategy) -> Self {
        let epoch = Instant::now();
        let correction_ms = match strategy {
            Strategy::HighPrecision => {
                let overhead = calibrate_read_overhead_ms(epoch);
                let correction = overhead.min(MAX_CORRECTION_MS);
                info!(
                    overhead_ns = (overhead * 1_000_000.0) as u64,
                    correction_ms = correction,
                    "timing oracle calibrated"
                );
                correction
            }
            Strategy::Standard => {
                debug!("timing oracle running with standard strategy");
                0.0
            }
        };

        Self {
            epoch,
            strategy,
            correction_ms,
        }
    }

    /// Active strategy
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Milliseconds elapsed since construction, monotonic
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Sleep for a relative duration
    pub fn sleep_relative(&self, duration_ms: f64) {
        if duration_ms <= 0.0 {
            return;
        }

        match self.strategy {
            Strategy::Standard => thread::sleep(Duration::from_secs_f64(duration_ms / 1000.0)),
            Strategy::HighPrecision => {
                let start = self.now_ms();
                let mut target = start + duration_ms;
                if duration_ms < 2.0 {
                    target -= self.correction_ms;
                }
                self.precision_sleep(duration_ms, target);
            }
        }
    }

    /// Sleep until `origin_ms + target_ms` on this oracle's clock.
    ///
    /// The remaining time is recomputed from the clock on every iteration
    /// rather than summed from prior sleeps, so scheduling error stays
    /// bounded across an arbitrarily long sequence of calls.
    pub fn sleep_until(&self, target_ms: f64, origin_ms: f64) {
        let absolute = origin_ms + target_ms;

        if self.strategy == Strategy::Standard {
            let remaining = absolute - self.now_ms();
            if remaining > 0.0 {
                thread::sleep(Duration::from_secs_f64(remaining / 1000.0));
            }
            return;
        }

        loop {
            let remaining = absolute - self.now_ms();
            if remaining <= 0.0 {
                break;
            }
            adaptive_step(remaining);
        }
    }

    fn precision_sleep(&self, duration_ms: f64, target_ms: f64) {
        if duration_ms >= 10.0 {
            thread::sleep(Duration::from_secs_f64(
                (duration_ms - OS_SLEEP_MARGIN_MS) / 1000.0,
            ));
            while self.now_ms() < target_ms {}
        } else if duration_ms >= 2.0 {
            thread::sleep(Duration::from_millis(1));
            while self.now_ms() < target_ms {}
        } else {
            while self.now_ms() < target_ms {
                if self.now_ms() + YIELD_SLACK_MS < target_ms {
                    thread::yield_now();
                }
            }
        }
    }
}

impl Default for TimingOracle {
    fn default() -> Self {
        Self::new()
    }
}

/// One bounded step toward an absolute deadline, sized by the remaining time
fn adaptive_step(remaining_ms: f64) {
    if remaining_ms > 20.0 {
        thread::sleep(Duration::from_secs_f64((remaining_ms - 15.0) / 1000.0));
    } else if remaining_ms > 5.0 {
        thread::sleep(Duration::from_secs_f64(
            (remaining_ms - OS_SLEEP_MARGIN_MS) / 1000.0,
        ));
    } else if remaining_ms > 2.0 {
        thread::sleep(Duration::from_micros(500));
    } else if remaining_ms > YIELD_SLACK_MS {
        thread::yield_now();
    }
    // Below the yield slack: tight spin back in the caller's loop.
}

/// Average cost of one clock read, in milliseconds
fn calibrate_read_overhead_ms(epoch: Instant) -> f64 {
    let read_ms = || epoch.elapsed().as_secs_f64() * 1000.0;

    let mut total = 0.0;
    for _ in 0..CALIBRATION_SAMPLES {
        let start = read_ms();
        let end = read_ms();
        total += end - start;
    }

    total / f64::from(CALIBRATION_SAMPLES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let oracle = TimingOracle::new();
        let mut last = oracle.now_ms();
        for _ in 0..1000 {
            let now = oracle.now_ms();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn calibration_correction_is_bounded() {
        let oracle = TimingOracle::new();
        assert!(oracle.correction_ms >= 0.0);
        assert!(oracle.correction_ms <= MAX_CORRECTION_MS);
    }

    #[test]
    fn sleep_relative_reaches_requested_duration() {
        let oracle = TimingOracle::new();

        for &duration in &[0.5, 1.5, 3.0, 12.0] {
            let start = oracle.now_ms();
            oracle.sleep_relative(duration);
            let elapsed = oracle.now_ms() - start;
            // Never wake meaningfully early; the calibration correction is
            // the only permitted shortfall.
            assert!(
                elapsed >= duration - MAX_CORRECTION_MS,
                "slept {elapsed:.3} ms for a {duration} ms request"
            );
        }
    }

    #[test]
    fn sleep_relative_ignores_non_positive_durations() {
        let oracle = TimingOracle::new();
        let start = oracle.now_ms();
        oracle.sleep_relative(0.0);
        oracle.sleep_relative(-5.0);
        assert!(oracle.now_ms() - start < 1.0);
    }

    #[test]
    fn sleep_until_never_returns_before_target() {
        let oracle = TimingOracle::new();
        let origin = oracle.now_ms();

        for i in 1..=10 {
            let target = i as f64 * 2.0;
            oracle.sleep_until(target, origin);
            assert!(oracle.now_ms() - origin >= target);
        }
    }

    #[test]
    fn absolute_scheduling_does_not_accumulate_drift() {
        let oracle = TimingOracle::new();
        let origin = oracle.now_ms();
        let step = 3.0;
        let calls = 30;

        let mut total_overshoot = 0.0;
        for i in 1..=calls {
            let target = i as f64 * step;
            oracle.sleep_until(target, origin);
            total_overshoot += oracle.now_ms() - origin - target;
        }

        // 30 absolute sleeps stay within the per-call busy-wait resolution;
        // a naive summed-relative scheme would drift far beyond this.
        assert!(
            total_overshoot < 5.0,
            "cumulative overshoot {total_overshoot:.3} ms across {calls} calls"
        );
    }

    #[test]
    fn standard_strategy_still_sleeps() {
        let oracle = TimingOracle::with_strategy(Strategy::Standard);
        assert_eq!(oracle.strategy(), Strategy::Standard);

        let start = oracle.now_ms();
        oracle.sleep_relative(5.0);
        assert!(oracle.now_ms() - start >= 4.0);

        let origin = oracle.now_ms();
        oracle.sleep_until(5.0, origin);
        assert!(oracle.now_ms() - origin >= 4.0);
    }

    #[test]
    fn elapsed_target_returns_immediately() {
        let oracle = TimingOracle::new();
        let origin = oracle.now_ms();
        oracle.sleep_relative(2.0);

        let before = oracle.now_ms();
        oracle.sleep_until(1.0, origin);
        assert!(oracle.now_ms() - before < 1.0);
    }
}
