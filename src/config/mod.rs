//! Configuration Loading and Validation
//!
//! TOML-backed configuration: engine tuning, detection behavior, logging,
//! and the weapon roster with raw recoil patterns. Everything is validated
//! at load time so the session thread never sees a malformed profile.

mod types;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detection::{DetectionConfig, WeaponTable};
use crate::pattern::{ProfileStore, RecoilPoint, WeaponProfileSpec};

pub use types::{EngineConfig, LoggingConfig, WeaponEntry};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Engine tuning
    #[serde(default)]
    pub engine: EngineConfig,

    /// Weapon detection behavior
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Weapon roster
    #[serde(default)]
    pub weapons: Vec<WeaponEntry>,
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        config.validate()?;
        info!(
            path = %path.display(),
            weapons = config.weapons.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Cross-field validation beyond what serde enforces
    pub fn validate(&self) -> Result<()> {
        if !(self.engine.poll_interval_ms > 0.0) {
            bail!(
                "engine.poll_interval_ms must be > 0 (got {})",
                self.engine.poll_interval_ms
            );
        }
        if self.engine.stop_timeout_ms == 0 {
            bail!("engine.stop_timeout_ms must be > 0");
        }

        let mut seen = HashSet::new();
        for entry in &self.weapons {
            if entry.name.is_empty() {
                bail!("weapon entry with empty name");
            }
            if !seen.insert(entry.name.as_str()) {
                bail!("duplicate weapon entry: '{}'", entry.name);
            }
        }

        Ok(())
    }

    /// Build the profile store and the weapon id table from the roster.
    ///
    /// Every alias on an entry resolves to that entry's pattern and
    /// category; the internal name itself is registered too so status
    /// surfaces and manual assignment share one namespace.
    pub fn build_profiles(&self) -> Result<(Arc<ProfileStore>, Arc<WeaponTable>)> {
        let specs: Vec<WeaponProfileSpec> = self.weapons.iter().map(entry_to_spec).collect();
        let store =
            ProfileStore::from_specs(specs).context("invalid weapon profile in configuration")?;

        let mut table = WeaponTable::new();
        for entry in &self.weapons {
            table.register(entry.name.clone(), entry.name.clone(), entry.category);
            for alias in &entry.aliases {
                table.register(alias.clone(), entry.name.clone(), entry.category);
            }
        }

        debug!(
            profiles = store.len(),
            ids = table.len(),
            "weapon profiles built"
        );
        Ok((Arc::new(store), Arc::new(table)))
    }
}

fn entry_to_spec(entry: &WeaponEntry) -> WeaponProfileSpec {
    WeaponProfileSpec {
        name: entry.name.clone(),
        display_name: entry
            .display_name
            .clone()
            .unwrap_or_else(|| entry.name.clone()),
        raw_pattern: entry
            .pattern
            .iter()
            .map(|&[dx, dy, delay_ms]| RecoilPoint::new(dx, dy, delay_ms))
            .collect(),
        length: entry.length,
        multiple: entry.multiple,
        sleep_divider: entry.sleep_divider,
        sleep_suber: entry.sleep_suber,
        jitter_timing_ms: entry.jitter_timing_ms,
        jitter_movement_pct: entry.jitter_movement_pct,
    }
}
