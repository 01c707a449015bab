//! Core state table: per-unit load sample and power-up timestamp.
//!
//! Slots are atomics so the resume override can stamp timestamps while a
//! pass is running without either side taking a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use coreplug_core::{LoadSampler, PowerControl, UnitId};

/// `powered_up_at_ms` value of a unit with no recorded power-up.
const CLEARED: u64 = 0;

#[derive(Debug, Default)]
struct CoreSlot {
    load: AtomicU64,
    powered_up_at_ms: AtomicU64,
}

/// Point-in-time view of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreState {
    pub unit: UnitId,
    pub online: bool,
    pub load: u64,
    /// `None` when the unit is offline or was never stamped.
    pub powered_up_at_ms: Option<u64>,
}

/// Fixed-size table indexed by unit id.
#[derive(Debug)]
pub struct CoreStateTable {
    slots: Box<[CoreSlot]>,
}

impl CoreStateTable {
    pub fn new(units: usize) -> Self {
        Self {
            slots: (0..units).map(|_| CoreSlot::default()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Last load sample of `unit`, 0 for unknown units.
    pub fn load(&self, unit: UnitId) -> u64 {
        self.slots
            .get(unit)
            .map_or(0, |s| s.load.load(Ordering::Relaxed))
    }

    pub fn powered_up_at(&self, unit: UnitId) -> Option<u64> {
        self.slots
            .get(unit)
            .map(|s| s.powered_up_at_ms.load(Ordering::Acquire))
            .filter(|&t| t != CLEARED)
    }

    /// Record an offline→online transition at `now_ms`.
    pub fn stamp_power_up(&self, unit: UnitId, now_ms: u64) {
        if let Some(s) = self.slots.get(unit) {
            s.powered_up_at_ms.store(now_ms.max(1), Ordering::Release);
        }
    }

    pub fn clear(&self, unit: UnitId) {
        if let Some(s) = self.slots.get(unit) {
            s.powered_up_at_ms.store(CLEARED, Ordering::Release);
            s.load.store(0, Ordering::Relaxed);
        }
    }

    /// Whether `unit` has been up for at least `min_up_ms`.
    ///
    /// Units without a recorded power-up are always eligible.
    pub fn dwell_elapsed(&self, unit: UnitId, now_ms: u64, min_up_ms: u64) -> bool {
        match self.powered_up_at(unit) {
            Some(at) => now_ms.saturating_sub(at) >= min_up_ms,
            None => true,
        }
    }

    /// Re-sample every online unit. A failed sample keeps the previous value.
    pub fn refresh_online(&self, power: &dyn PowerControl, sampler: &dyn LoadSampler) {
        for (unit, slot) in self.slots.iter().enumerate() {
            if !power.is_online(unit) {
                continue;
            }
            match sampler.sample(unit) {
                Ok(load) => slot.load.store(load, Ordering::Relaxed),
                Err(e) => warn!(unit, error = %e, "load sample failed, keeping last value"),
            }
        }
    }

    /// Clear the timestamps of every offline unit.
    pub fn refresh_offline(&self, power: &dyn PowerControl) {
        for unit in 0..self.slots.len() {
            if !power.is_online(unit) {
                self.clear(unit);
            }
        }
    }

    pub fn refresh(&self, power: &dyn PowerControl, sampler: &dyn LoadSampler) {
        self.refresh_online(power, sampler);
        self.refresh_offline(power);
    }

    /// Sum of the last samples of the online units.
    pub fn total_online_load(&self, power: &dyn PowerControl) -> u64 {
        (0..self.slots.len())
            .filter(|&u| power.is_online(u))
            .fold(0u64, |acc, u| acc.saturating_add(self.load(u)))
    }

    pub fn snapshot(&self, power: &dyn PowerControl) -> Vec<CoreState> {
        (0..self.slots.len())
            .map(|unit| CoreState {
                unit,
                online: power.is_online(unit),
                load: self.load(unit),
                powered_up_at_ms: self.powered_up_at(unit),
            })
            .collect()
    }
}
