//! Configuration type definitions

use serde::{Deserialize, Serialize};

use crate::timing::Strategy;

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between trigger polls in the session loop, milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: f64,

    /// How long `stop()` waits for the session thread, milliseconds
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Timing strategy ("high_precision" or "standard")
    #[serde(default)]
    pub timing: Strategy,
}

fn default_poll_interval_ms() -> f64 {
    1.0
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            timing: Strategy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter ("trace".."error")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional directory for a rolling log file (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

/// One weapon entry as persisted in the configuration file.
///
/// `pattern` rows are `[dx, dy, delay_ms]` triples; `aliases` lists the
/// collaborator-side weapon ids that resolve to this profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponEntry {
    /// Internal weapon name (pattern id)
    pub name: String,

    /// Human-readable name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Raw recorded pattern, `[dx, dy, delay_ms]` per row
    pub pattern: Vec<[f64; 3]>,

    /// Maximum raw points to use
    #[serde(default = "default_length")]
    pub length: usize,

    /// Subdivision factor
    #[serde(default = "default_multiple")]
    pub multiple: u32,

    /// Timing divider applied to each point's delay
    #[serde(default = "default_sleep_divider")]
    pub sleep_divider: f64,

    /// Additive timing correction (may be negative)
    #[serde(default)]
    pub sleep_suber: f64,

    /// Per-tick Gaussian timing perturbation bound, milliseconds
    #[serde(default)]
    pub jitter_timing_ms: f64,

    /// Per-session Gaussian movement scale bound, percent
    #[serde(default)]
    pub jitter_movement_pct: f64,

    /// Weapon category for detection eligibility
    #[serde(default = "default_category")]
    pub category: crate::detection::WeaponCategory,

    /// Collaborator-side weapon ids mapping to this profile
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_length() -> usize {
    30
}

fn default_multiple() -> u32 {
    6
}

fn default_sleep_divider() -> f64 {
    6.0
}

fn default_category() -> crate::detection::WeaponCategory {
    crate::detection::WeaponCategory::Primary
}
