//! Validated key/value control surface.
//!
//! Each entry carries an accepted range and a setter applied to a copy of
//! the control block. A write that fails to parse, falls outside the range
//! or breaks the online bounds changes nothing.
//!
//! | key | range |
//! |---|---|
//! | `active` | any integer, `0` = off |
//! | `min_online`, `max_online` | `1..=platform_units` |
//! | `profile_index` | configured profiles |
//! | `global_threshold` | `0..=4096` |
//! | `sampling_interval_ms` | `10..=10000` |
//! | `load_scale_shift` | `0..=100` |
//! | `reserved_units`, `online_units` | read-only |

use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::info;

use coreplug_core::{HotplugError, HotplugResult};

use crate::driver::{ControlBlock, Driver};

pub const GLOBAL_THRESHOLD_RANGE: RangeInclusive<u64> = 0..=4096;
pub const SAMPLING_INTERVAL_RANGE: RangeInclusive<u64> = 10..=10_000;
pub const LOAD_SCALE_SHIFT_RANGE: RangeInclusive<u64> = 0..=100;
/// Narrowed further by the profile store when applied.
const PROFILE_INDEX_RANGE: RangeInclusive<u64> = 0..=u32::MAX as u64;

type Getter = fn(&Driver) -> u64;
type Setter = fn(&mut ControlBlock, u64) -> HotplugResult<()>;

enum Access {
    Active,
    ReadWrite {
        get: Getter,
        set: Setter,
        range: RangeInclusive<u64>,
    },
    ReadOnly(Getter),
}

struct Tunable {
    name: &'static str,
    access: Access,
}

/// The tunable registry of one driver.
pub struct Tunables {
    driver: Arc<Driver>,
    entries: Vec<Tunable>,
}

impl Tunables {
    pub fn new(driver: Arc<Driver>) -> Self {
        let units = driver.platform_units() as u64;
        let entries = vec![
            Tunable {
                name: "active",
                access: Access::Active,
            },
            Tunable {
                name: "min_online",
                access: Access::ReadWrite {
                    get: |d| d.settings().min_online as u64,
                    set: |c, v| {
                        let v = v as usize;
                        c.settings.min_online = v;
                        if c.settings.max_online < v {
                            c.settings.max_online = v;
                        }
                        Ok(())
                    },
                    range: 1..=units,
                },
            },
            Tunable {
                name: "max_online",
                access: Access::ReadWrite {
                    get: |d| d.settings().max_online as u64,
                    set: |c, v| {
                        let v = v as usize;
                        c.settings.max_online = v;
                        if c.settings.min_online > v {
                            c.settings.min_online = v;
                        }
                        Ok(())
                    },
                    range: 1..=units,
                },
            },
            Tunable {
                name: "profile_index",
                access: Access::ReadWrite {
                    get: |d| d.control().profiles.current_index() as u64,
                    set: |c, v| c.profiles.select(v as usize),
                    range: PROFILE_INDEX_RANGE,
                },
            },
            Tunable {
                name: "global_threshold",
                access: Access::ReadWrite {
                    get: |d| d.settings().global_threshold,
                    set: |c, v| {
                        c.settings.global_threshold = v;
                        Ok(())
                    },
                    range: GLOBAL_THRESHOLD_RANGE,
                },
            },
            Tunable {
                name: "sampling_interval_ms",
                access: Access::ReadWrite {
                    get: |d| d.settings().sampling_interval_ms,
                    set: |c, v| {
                        c.settings.sampling_interval_ms = v;
                        Ok(())
                    },
                    range: SAMPLING_INTERVAL_RANGE,
                },
            },
            Tunable {
                name: "load_scale_shift",
                access: Access::ReadWrite {
                    get: |d| u64::from(d.settings().load_scale_shift),
                    set: |c, v| {
                        c.settings.load_scale_shift = v as u32;
                        Ok(())
                    },
                    range: LOAD_SCALE_SHIFT_RANGE,
                },
            },
            Tunable {
                name: "reserved_units",
                access: Access::ReadOnly(|d| d.settings().reserved_units as u64),
            },
            Tunable {
                name: "online_units",
                access: Access::ReadOnly(|d| d.online_units() as u64),
            },
        ];
        Self { driver, entries }
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// Registry keys in display order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|t| t.name)
    }

    /// Current value of `key`, newline terminated.
    pub fn show(&self, key: &str) -> HotplugResult<String> {
        let value = match &self.entry(key)?.access {
            Access::Active => u64::from(self.driver.is_active()),
            Access::ReadWrite { get, .. } | Access::ReadOnly(get) => get(&self.driver),
        };
        Ok(format!("{value}\n"))
    }

    /// Parse, validate and apply `input` to `key`.
    pub async fn store(&self, key: &str, input: &str) -> HotplugResult<()> {
        let tunable = self.entry(key)?;
        match &tunable.access {
            Access::ReadOnly(_) => Err(HotplugError::ReadOnly(key.to_string())),
            Access::Active => {
                let requested = input.trim().parse::<i64>().map_err(|_| {
                    HotplugError::invalid(tunable.name, format!("{:?} is not an integer", input.trim()))
                })? != 0;
                if requested != self.driver.is_active() {
                    info!(active = requested, "activation requested");
                }
                self.driver.set_active(requested).await
            }
            Access::ReadWrite { set, range, .. } => {
                let value = parse_in_range(tunable.name, input, range)?;
                self.driver.update(|c| set(c, value))?;
                info!(key = tunable.name, value, "tunable updated");
                Ok(())
            }
        }
    }

    fn entry(&self, key: &str) -> HotplugResult<&Tunable> {
        self.entries
            .iter()
            .find(|t| t.name == key.trim())
            .ok_or_else(|| HotplugError::UnknownTunable(key.to_string()))
    }
}

fn parse_in_range(key: &str, input: &str, range: &RangeInclusive<u64>) -> HotplugResult<u64> {
    let value = input
        .trim()
        .parse::<u64>()
        .map_err(|_| HotplugError::invalid(key, format!("{:?} is not an unsigned integer", input.trim())))?;
    if !range.contains(&value) {
        return Err(HotplugError::invalid(
            key,
            format!("{value} outside {}..={}", range.start(), range.end()),
        ));
    }
    Ok(value)
}
