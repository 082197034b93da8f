//! Weapon Profiles
//!
//! A profile couples a raw recorded pattern with its subdivision and timing
//! tunables, and caches the subdivided result. The cache is recomputed
//! whenever the raw pattern or subdivision tunables change and is swapped
//! whole: readers always observe either the previous complete pattern or
//! the new one, never a partially rebuilt one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::pattern::{displacement_sums, subdivide, RecoilPoint};

/// Profile validation errors, rejected at load time
#[derive(Error, Debug)]
pub enum ProfileError {
    /// Pattern length cap below 1
    #[error("weapon '{0}': length {1} is invalid (must be >= 1)")]
    InvalidLength(String, usize),

    /// Subdivision factor below 1
    #[error("weapon '{0}': subdivision factor {1} is invalid (must be >= 1)")]
    InvalidMultiple(String, u32),

    /// Non-positive sleep divider
    #[error("weapon '{0}': sleep divider {1} is invalid (must be > 0)")]
    InvalidSleepDivider(String, f64),

    /// Negative timing jitter
    #[error("weapon '{0}': timing jitter {1} ms is invalid (must be >= 0)")]
    InvalidTimingJitter(String, f64),

    /// Movement jitter outside 0..=100
    #[error("weapon '{0}': movement jitter {1}% is invalid (must be within 0..=100)")]
    InvalidMovementJitter(String, f64),

    /// Profile carries no recorded points
    #[error("weapon '{0}': recoil pattern is empty")]
    EmptyPattern(String),
}

/// Everything needed to build a [`WeaponProfile`].
///
/// The configuration collaborator owns and persists these fields; the
/// engine only derives the cached calculated pattern from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponProfileSpec {
    /// Internal weapon name (pattern id)
    pub name: String,

    /// Human-readable name for status surfaces
    pub display_name: String,

    /// Raw recorded pattern
    pub raw_pattern: Vec<RecoilPoint>,

    /// Maximum raw points to use
    pub length: usize,

    /// Subdivision factor
    pub multiple: u32,

    /// Timing divider applied to each point's delay
    pub sleep_divider: f64,

    /// Additive timing correction (may be negative)
    pub sleep_suber: f64,

    /// Per-tick Gaussian timing perturbation bound, milliseconds
    pub jitter_timing_ms: f64,

    /// Per-session Gaussian movement scale bound, percent
    pub jitter_movement_pct: f64,
}

impl WeaponProfileSpec {
    fn validate(&self) -> Result<(), ProfileError> {
        let name = || self.name.clone();

        if self.length < 1 {
            return Err(ProfileError::InvalidLength(name(), self.length));
        }
        if self.multiple < 1 {
            return Err(ProfileError::InvalidMultiple(name(), self.multiple));
        }
        if !(self.sleep_divider > 0.0) {
            return Err(ProfileError::InvalidSleepDivider(name(), self.sleep_divider));
        }
        if !(self.jitter_timing_ms >= 0.0) {
            return Err(ProfileError::InvalidTimingJitter(name(), self.jitter_timing_ms));
        }
        if !(0.0..=100.0).contains(&self.jitter_movement_pct) {
            return Err(ProfileError::InvalidMovementJitter(
                name(),
                self.jitter_movement_pct,
            ));
        }
        if self.raw_pattern.is_empty() {
            return Err(ProfileError::EmptyPattern(name()));
        }

        Ok(())
    }
}

/// A validated weapon profile with its cached calculated pattern.
///
/// Profiles are immutable once built; tunable changes go through
/// [`WeaponProfile::with_subdivision`] / [`WeaponProfile::with_raw_pattern`],
/// which rebuild the cache and yield a new profile to swap into the store.
#[derive(Debug, Clone)]
pub struct WeaponProfile {
    spec: WeaponProfileSpec,
    calculated: Arc<Vec<RecoilPoint>>,
}

impl WeaponProfile {
    /// Validate a spec and build the profile, computing the cached pattern
    pub fn new(spec: WeaponProfileSpec) -> Result<Self, ProfileError> {
        spec.validate()?;

        let calculated = Arc::new(subdivide(&spec.raw_pattern, spec.multiple, spec.length));

        let profile = Self { spec, calculated };
        profile.log_precision();
        debug!(
            weapon = %profile.spec.name,
            points = profile.calculated.len(),
            "weapon profile initialized"
        );

        Ok(profile)
    }

    /// Rebuild with new subdivision tunables
    pub fn with_subdivision(&self, multiple: u32, length: usize) -> Result<Self, ProfileError> {
        let mut spec = self.spec.clone();
        spec.multiple = multiple;
        spec.length = length;
        Self::new(spec)
    }

    /// Rebuild with a new raw pattern
    pub fn with_raw_pattern(&self, raw_pattern: Vec<RecoilPoint>) -> Result<Self, ProfileError> {
        let mut spec = self.spec.clone();
        spec.raw_pattern = raw_pattern;
        Self::new(spec)
    }

    /// Internal weapon name (pattern id)
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Human-readable name
    pub fn display_name(&self) -> &str {
        &self.spec.display_name
    }

    /// Cached calculated pattern (cheap to clone, shared)
    pub fn calculated_pattern(&self) -> Arc<Vec<RecoilPoint>> {
        Arc::clone(&self.calculated)
    }

    /// Timing divider applied to each point's delay
    pub fn sleep_divider(&self) -> f64 {
        self.spec.sleep_divider
    }

    /// Additive timing correction
    pub fn sleep_suber(&self) -> f64 {
        self.spec.sleep_suber
    }

    /// Per-tick timing perturbation bound, milliseconds
    pub fn jitter_timing_ms(&self) -> f64 {
        self.spec.jitter_timing_ms
    }

    /// Per-session movement scale bound, percent
    pub fn jitter_movement_pct(&self) -> f64 {
        self.spec.jitter_movement_pct
    }

    /// Subdivision factor
    pub fn multiple(&self) -> u32 {
        self.spec.multiple
    }

    /// Raw point cap
    pub fn length(&self) -> usize {
        self.spec.length
    }

    fn log_precision(&self) {
        let take = self.spec.raw_pattern.len().min(self.spec.length);
        let (raw_x, raw_y) = displacement_sums(&self.spec.raw_pattern[..take]);
        let (out_x, out_y) = displacement_sums(&self.calculated);

        debug!(
            weapon = %self.spec.name,
            raw_x, out_x, raw_y, out_y,
            "subdivision precision check"
        );

        if (raw_x - out_x).abs() > 1.0 || (raw_y - out_y).abs() > 1.0 {
            warn!(
                weapon = %self.spec.name,
                "subdivided pattern deviates from raw displacement sums"
            );
        }
    }
}

/// Shared store of weapon profiles keyed by internal name.
///
/// Lookups hand out `Arc` snapshots so the session thread never observes a
/// profile mid-update; reloads validate every entry before swapping the map.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<String, Arc<WeaponProfile>>>,
}

impl ProfileStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from specs, rejecting the whole set on any invalid entry
    pub fn from_specs(specs: Vec<WeaponProfileSpec>) -> Result<Self, ProfileError> {
        let store = Self::new();
        store.reload(specs)?;
        Ok(store)
    }

    /// Look up a profile by internal name
    pub fn get(&self, name: &str) -> Option<Arc<WeaponProfile>> {
        self.profiles.read().get(name).cloned()
    }

    /// Whether a profile exists
    pub fn contains(&self, name: &str) -> bool {
        self.profiles.read().contains_key(name)
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    /// Names of all profiles, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Insert or replace a single profile
    pub fn insert(&self, profile: WeaponProfile) {
        self.profiles
            .write()
            .insert(profile.name().to_string(), Arc::new(profile));
    }

    /// Replace the entire set. All specs are validated first; on any error
    /// the previously-valid profiles remain in place untouched.
    pub fn reload(&self, specs: Vec<WeaponProfileSpec>) -> Result<(), ProfileError> {
        let mut next = HashMap::with_capacity(specs.len());
        for spec in specs {
            let profile = WeaponProfile::new(spec)?;
            next.insert(profile.name().to_string(), Arc::new(profile));
        }

        *self.profiles.write() = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> WeaponProfileSpec {
        WeaponProfileSpec {
            name: name.to_string(),
            display_name: name.to_uppercase(),
            raw_pattern: vec![
                RecoilPoint::new(0.0, 4.0, 10.0),
                RecoilPoint::new(2.0, 8.0, 10.0),
                RecoilPoint::new(-3.0, 9.0, 10.0),
            ],
            length: 30,
            multiple: 4,
            sleep_divider: 4.0,
            sleep_suber: 0.0,
            jitter_timing_ms: 0.0,
            jitter_movement_pct: 0.0,
        }
    }

    #[test]
    fn profile_caches_subdivided_pattern() {
        let profile = WeaponProfile::new(spec("ak47")).unwrap();
        let pattern = profile.calculated_pattern();

        assert_eq!(pattern.len(), 12);
        let (sx, sy) = displacement_sums(&pattern);
        assert_eq!(sx, -1.0);
        assert_eq!(sy, 21.0);
    }

    #[test]
    fn tunable_change_rebuilds_cache() {
        let profile = WeaponProfile::new(spec("ak47")).unwrap();
        let rebuilt = profile.with_subdivision(6, 2).unwrap();

        assert_eq!(rebuilt.calculated_pattern().len(), 12);
        let (sx, sy) = displacement_sums(&rebuilt.calculated_pattern());
        assert_eq!(sx, 2.0);
        assert_eq!(sy, 12.0);
        // Original profile untouched
        assert_eq!(profile.calculated_pattern().len(), 12);
        assert_eq!(profile.multiple(), 4);
    }

    #[test]
    fn raw_pattern_change_rebuilds_cache() {
        let profile = WeaponProfile::new(spec("ak47")).unwrap();
        let rebuilt = profile
            .with_raw_pattern(vec![RecoilPoint::new(8.0, 16.0, 12.0)])
            .unwrap();

        assert_eq!(rebuilt.calculated_pattern().len(), 4);
        let (sx, sy) = displacement_sums(&rebuilt.calculated_pattern());
        assert_eq!(sx, 8.0);
        assert_eq!(sy, 16.0);
        // Original profile untouched
        assert_eq!(profile.calculated_pattern().len(), 12);

        // The new raw pattern is validated like any other
        assert!(matches!(
            profile.with_raw_pattern(Vec::new()),
            Err(ProfileError::EmptyPattern(_))
        ));
    }

    #[test]
    fn insert_replaces_a_single_profile_in_place() {
        let store = ProfileStore::from_specs(vec![spec("ak47"), spec("m4a4")]).unwrap();

        let rebuilt = store
            .get("ak47")
            .unwrap()
            .with_subdivision(6, 30)
            .unwrap();
        store.insert(rebuilt);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("ak47").unwrap().multiple(), 6);
        // The sibling profile is untouched
        assert_eq!(store.get("m4a4").unwrap().multiple(), 4);
    }

    #[test]
    fn validation_rejects_bad_tunables() {
        let mut s = spec("bad");
        s.sleep_divider = 0.0;
        assert!(matches!(
            WeaponProfile::new(s),
            Err(ProfileError::InvalidSleepDivider(_, _))
        ));

        let mut s = spec("bad");
        s.multiple = 0;
        assert!(matches!(
            WeaponProfile::new(s),
            Err(ProfileError::InvalidMultiple(_, 0))
        ));

        let mut s = spec("bad");
        s.jitter_movement_pct = 120.0;
        assert!(matches!(
            WeaponProfile::new(s),
            Err(ProfileError::InvalidMovementJitter(_, _))
        ));

        let mut s = spec("bad");
        s.raw_pattern.clear();
        assert!(matches!(
            WeaponProfile::new(s),
            Err(ProfileError::EmptyPattern(_))
        ));
    }

    #[test]
    fn reload_keeps_previous_profiles_on_error() {
        let store = ProfileStore::from_specs(vec![spec("ak47"), spec("m4a4")]).unwrap();
        assert_eq!(store.len(), 2);

        let mut bad = spec("famas");
        bad.length = 0;
        let result = store.reload(vec![spec("aug"), bad]);

        assert!(result.is_err());
        assert_eq!(store.names(), vec!["ak47".to_string(), "m4a4".to_string()]);
    }

    #[test]
    fn reload_swaps_whole_set() {
        let store = ProfileStore::from_specs(vec![spec("ak47")]).unwrap();
        store.reload(vec![spec("m4a4"), spec("aug")]).unwrap();

        assert!(store.get("ak47").is_none());
        assert!(store.get("m4a4").is_some());
        assert!(store.get("aug").is_some());
    }
}
