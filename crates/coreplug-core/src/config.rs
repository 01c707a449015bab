//! coreplug.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HotplugError, HotplugResult};
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotplugConfig {
    /// Start the control loop when the host initializes.
    pub active: bool,
    pub policy: PolicyKind,
    /// Units to keep online under `policy = "static"`, `1` = online.
    pub static_map: Vec<u8>,
    pub limits: LimitsConfig,
    pub timing: TimingConfig,
    pub tuning: TuningConfig,
    pub profiles: Vec<ProfileConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Adaptive,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub min_online: usize,
    pub max_online: usize,
    pub reserved_units: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub sampling_interval_ms: u64,
    pub startup_delay_ms: u64,
    pub min_up_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub load_scale_shift: u32,
    pub global_threshold: u64,
    /// Index into `profiles`.
    pub profile: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    /// Finite thresholds only; the `+inf` sentinel is implicit.
    pub thresholds: Vec<u32>,
}

impl Default for HotplugConfig {
    fn default() -> Self {
        Self {
            active: true,
            policy: PolicyKind::Adaptive,
            static_map: Vec::new(),
            limits: LimitsConfig::default(),
            timing: TimingConfig::default(),
            tuning: TuningConfig::default(),
            profiles: ProfileStore::default()
                .iter()
                .map(|p| ProfileConfig {
                    name: p.name().to_string(),
                    thresholds: p.thresholds().to_vec(),
                })
                .collect(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_online: DEFAULT_MIN_ONLINE,
            max_online: DEFAULT_MAX_ONLINE,
            reserved_units: DEFAULT_RESERVED_UNITS,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            min_up_time_ms: DEFAULT_MIN_UP_TIME_MS,
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            load_scale_shift: DEFAULT_LOAD_SCALE_SHIFT,
            global_threshold: DEFAULT_GLOBAL_THRESHOLD,
            profile: 0,
        }
    }
}

impl HotplugConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    pub fn from_toml_str(content: &str) -> HotplugResult<Self> {
        toml::from_str(content).map_err(|e| HotplugError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Runtime knobs described by this file.
    pub fn settings(&self) -> Settings {
        Settings {
            min_online: self.limits.min_online,
            max_online: self.limits.max_online,
            min_up_time_ms: self.timing.min_up_time_ms,
            sampling_interval_ms: self.timing.sampling_interval_ms,
            startup_delay_ms: self.timing.startup_delay_ms,
            load_scale_shift: self.tuning.load_scale_shift,
            global_threshold: self.tuning.global_threshold,
            reserved_units: self.limits.reserved_units,
        }
    }

    pub fn profile_store(&self) -> HotplugResult<ProfileStore> {
        let profiles = self
            .profiles
            .iter()
            .map(|p| Profile::new(p.name.clone(), p.thresholds.clone()))
            .collect();
        ProfileStore::new(profiles, self.tuning.profile)
    }

    pub fn policy(&self) -> Policy {
        match self.policy {
            PolicyKind::Adaptive => Policy::Adaptive,
            PolicyKind::Static => Policy::Static(self.static_map.iter().map(|&b| b != 0).collect()),
        }
    }

    /// Validate the whole file against a platform of `platform_units` units.
    pub fn validate(&self, platform_units: usize) -> HotplugResult<()> {
        self.settings().validate(platform_units)?;
        self.profile_store()?;
        if self.timing.sampling_interval_ms == 0 {
            return Err(HotplugError::Config(
                "timing.sampling_interval_ms must be positive".to_string(),
            ));
        }
        if self.policy == PolicyKind::Static && self.static_map.len() > platform_units {
            return Err(HotplugError::Config(format!(
                "static_map has {} entries but the platform has {platform_units} units",
                self.static_map.len()
            )));
        }
        Ok(())
    }
}
