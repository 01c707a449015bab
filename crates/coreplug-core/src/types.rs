//! Domain types for the hotplug controller.
//!
//! Everything here is plain data: the runtime knobs (`Settings`), the
//! threshold tables (`Profile`, `ProfileStore`), the placement policy and
//! the power-state events delivered by the platform.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HotplugError, HotplugResult};

/// Index of a processing unit, `0..platform_units`.
pub type UnitId = usize;

/// Fractional bits of a raw load sample (1.0 runnable task = `1 << 11`).
pub const LOAD_FSHIFT: u32 = 11;

pub const DEFAULT_MIN_ONLINE: usize = 4;
pub const DEFAULT_MAX_ONLINE: usize = 8;
pub const DEFAULT_RESERVED_UNITS: usize = 4;
pub const DEFAULT_MIN_UP_TIME_MS: u64 = 2000;
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 300;
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 10_000;
pub const DEFAULT_LOAD_SCALE_SHIFT: u32 = 4;

/// Per-thread capacity the default power-down threshold is tuned for.
const THREAD_CAPACITY: u64 = 350;

/// `(capacity * 2) - (capacity / 2)`.
pub const DEFAULT_GLOBAL_THRESHOLD: u64 = (THREAD_CAPACITY << 1) - (THREAD_CAPACITY >> 1);

/// Runtime knobs of the control loop.
///
/// A copy is taken at the start of every pass so a concurrent write never
/// produces a torn read across one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Lower bound on the online unit count.
    pub min_online: usize,
    /// Upper bound on the online unit count.
    pub max_online: usize,
    /// Hysteresis window: a freshly powered-up unit stays up at least this long.
    pub min_up_time_ms: u64,
    /// Delay between two sampling ticks.
    pub sampling_interval_ms: u64,
    /// Delay before the first tick after start.
    pub startup_delay_ms: u64,
    /// Fractional bits of the profile thresholds.
    pub load_scale_shift: u32,
    /// Base of the per-pass power-down threshold.
    pub global_threshold: u64,
    /// Units `0..reserved_units` are never powered down.
    pub reserved_units: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_online: DEFAULT_MIN_ONLINE,
            max_online: DEFAULT_MAX_ONLINE,
            min_up_time_ms: DEFAULT_MIN_UP_TIME_MS,
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            load_scale_shift: DEFAULT_LOAD_SCALE_SHIFT,
            global_threshold: DEFAULT_GLOBAL_THRESHOLD,
            reserved_units: DEFAULT_RESERVED_UNITS,
        }
    }
}

impl Settings {
    /// Check the online bounds against the platform size.
    pub fn validate(&self, platform_units: usize) -> HotplugResult<()> {
        if self.min_online < 1 {
            return Err(HotplugError::invalid("min_online", "must be at least 1"));
        }
        if self.min_online > self.max_online {
            return Err(HotplugError::invalid(
                "min_online",
                format!(
                    "{} exceeds max_online {}",
                    self.min_online, self.max_online
                ),
            ));
        }
        if self.max_online > platform_units {
            return Err(HotplugError::invalid(
                "max_online",
                format!(
                    "{} exceeds the {platform_units} units of this platform",
                    self.max_online
                ),
            ));
        }
        if self.reserved_units > platform_units {
            return Err(HotplugError::invalid(
                "reserved_units",
                format!(
                    "{} exceeds the {platform_units} units of this platform",
                    self.reserved_units
                ),
            ));
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Whether the reserved prefix alone exceeds `max_online`, so every pass
    /// that scales down stops short of its target.
    pub fn reserved_exceeds_max(&self) -> bool {
        self.reserved_units > self.max_online
    }

    /// Whether `unit` belongs to the always-online prefix.
    pub fn is_reserved(&self, unit: UnitId) -> bool {
        unit < self.reserved_units
    }
}

/// An ordered threshold table mapping candidate online counts to load bounds.
///
/// Entry `i` is the load the system may carry with `min_online + i` units.
/// The table ends with an implicit `+inf` sentinel, so it is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    name: String,
    thresholds: Vec<u32>,
}

impl Profile {
    pub fn new(name: impl Into<String>, thresholds: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            thresholds,
        }
    }

    /// Tuned default: grows from 4 units at light load up to 8.
    pub fn balanced() -> Self {
        Self::new("balanced", vec![12, 35, 53, 71])
    }

    /// Every step is zero: the target stays at `min_online`.
    pub fn disabled() -> Self {
        Self::new("disabled", vec![0; 8])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    /// Threshold for `step` units above `min_online`.
    ///
    /// Returns `None` past the last finite entry (the `+inf` sentinel).
    pub fn threshold(&self, step: usize) -> Option<u32> {
        self.thresholds.get(step).copied()
    }
}

/// The named profiles and the one currently selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
    current: usize,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self {
            profiles: vec![Profile::balanced(), Profile::disabled()],
            current: 0,
        }
    }
}

impl ProfileStore {
    /// Build a store from a non-empty list of uniquely named profiles.
    pub fn new(profiles: Vec<Profile>, current: usize) -> HotplugResult<Self> {
        if profiles.is_empty() {
            return Err(HotplugError::Config(
                "at least one profile is required".to_string(),
            ));
        }
        for (i, p) in profiles.iter().enumerate() {
            if profiles[..i].iter().any(|q| q.name == p.name) {
                return Err(HotplugError::Config(format!(
                    "duplicate profile name: {}",
                    p.name
                )));
            }
        }
        let mut store = Self {
            profiles,
            current: 0,
        };
        store.select(current)?;
        Ok(store)
    }

    /// Select the profile at `index`. Out-of-range indices are rejected.
    pub fn select(&mut self, index: usize) -> HotplugResult<()> {
        if index >= self.profiles.len() {
            return Err(HotplugError::invalid(
                "profile_index",
                format!(
                    "{index} is out of range, {} profiles configured",
                    self.profiles.len()
                ),
            ));
        }
        self.current = index;
        Ok(())
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Profile {
        &self.profiles[self.current]
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }
}

/// How the controller picks the online set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Load-driven target from the selected profile.
    Adaptive,
    /// Fixed map of units that should be online, indexed by unit id.
    Static(Vec<bool>),
}

/// System power-state transitions reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// The system resumed.
    Active,
    /// The system is suspending.
    Suspend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_global_threshold() {
        assert_eq!(DEFAULT_GLOBAL_THRESHOLD, 525);
    }

    #[test]
    fn default_settings_fit_eight_units() {
        assert!(Settings::default().validate(8).is_ok());
        assert!(Settings::default().validate(6).is_err());
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let mut s = Settings::default();
        s.min_online = 6;
        s.max_online = 5;
        assert!(matches!(
            s.validate(8),
            Err(HotplugError::InvalidInput { ref key, .. }) if key == "min_online"
        ));
    }

    #[test]
    fn reserved_prefix_against_max_online() {
        let mut s = Settings::default();
        assert!(!s.reserved_exceeds_max());
        s.max_online = 2;
        s.min_online = 2;
        assert!(s.validate(8).is_ok());
        assert!(s.reserved_exceeds_max());
    }

    #[test]
    fn profile_sentinel_past_last_entry() {
        let p = Profile::balanced();
        assert_eq!(p.threshold(0), Some(12));
        assert_eq!(p.threshold(3), Some(71));
        assert_eq!(p.threshold(4), None);
    }

    #[test]
    fn store_rejects_out_of_range_selection() {
        let mut store = ProfileStore::default();
        assert!(store.select(1).is_ok());
        assert_eq!(store.current().name(), "disabled");

        let err = store.select(2).unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(store.current_index(), 1);
    }

    #[test]
    fn store_rejects_duplicates_and_empty() {
        assert!(ProfileStore::new(vec![], 0).is_err());
        assert!(
            ProfileStore::new(vec![Profile::balanced(), Profile::balanced()], 0).is_err()
        );
        assert!(ProfileStore::new(vec![Profile::balanced()], 1).is_err());
    }
}
