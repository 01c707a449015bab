//! Simulated processing units.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::trace;

use coreplug_core::{HotplugError, HotplugResult, LoadSampler, PowerControl, UnitId};

/// A command observed by the simulated platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCommand {
    Up(UnitId),
    Down(UnitId),
}

#[derive(Debug)]
struct SimUnit {
    online: AtomicBool,
    load: AtomicU64,
}

/// Units whose online state and load live in atomics.
#[derive(Debug)]
pub struct SimPlatform {
    units: Vec<SimUnit>,
    fail_power_up: AtomicBool,
    fail_power_down: AtomicBool,
    fail_samples: AtomicBool,
    /// Every accepted command, oldest first.
    commands: Mutex<Vec<PowerCommand>>,
}

impl SimPlatform {
    /// A platform of `units` units, all online.
    pub fn new(units: usize) -> Self {
        Self::with_online(units, units)
    }

    /// A platform of `units` units where only `0..online` are online.
    pub fn with_online(units: usize, online: usize) -> Self {
        Self {
            units: (0..units)
                .map(|u| SimUnit {
                    online: AtomicBool::new(u < online),
                    load: AtomicU64::new(0),
                })
                .collect(),
            fail_power_up: AtomicBool::new(false),
            fail_power_down: AtomicBool::new(false),
            fail_samples: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Set every unit's load from `loads`, missing entries become 0.
    pub fn set_loads(&self, loads: &[u64]) {
        for (i, u) in self.units.iter().enumerate() {
            u.load
                .store(loads.get(i).copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Spread `total` load evenly across the online units.
    pub fn spread_load(&self, total: u64) {
        let online = self.online_units();
        if online.is_empty() {
            return;
        }
        let share = total / online.len() as u64;
        let mut rest = total % online.len() as u64;
        for (i, u) in self.units.iter().enumerate() {
            let load = if online.contains(&i) {
                let extra = u64::from(rest > 0);
                rest = rest.saturating_sub(1);
                share + extra
            } else {
                0
            };
            u.load.store(load, Ordering::Relaxed);
        }
    }

    /// Change a unit's state behind the controller's back.
    pub fn force_online(&self, unit: UnitId, online: bool) {
        if let Some(u) = self.units.get(unit) {
            u.online.store(online, Ordering::SeqCst);
        }
    }

    pub fn online_units(&self) -> Vec<UnitId> {
        (0..self.units.len())
            .filter(|&u| self.is_online(u))
            .collect()
    }

    pub fn fail_power_up(&self, fail: bool) {
        self.fail_power_up.store(fail, Ordering::SeqCst);
    }

    pub fn fail_power_down(&self, fail: bool) {
        self.fail_power_down.store(fail, Ordering::SeqCst);
    }

    pub fn fail_samples(&self, fail: bool) {
        self.fail_samples.store(fail, Ordering::SeqCst);
    }

    /// Commands accepted so far.
    pub fn commands(&self) -> Vec<PowerCommand> {
        self.commands.lock().expect("commands lock").clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().expect("commands lock").clear();
    }

    fn unit(&self, unit: UnitId) -> HotplugResult<&SimUnit> {
        self.units.get(unit).ok_or_else(|| HotplugError::Power {
            unit,
            reason: format!("no such unit, platform has {}", self.units.len()),
        })
    }

    fn record(&self, command: PowerCommand) {
        self.commands.lock().expect("commands lock").push(command);
    }
}

impl PowerControl for SimPlatform {
    fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn is_online(&self, unit: UnitId) -> bool {
        self.units
            .get(unit)
            .is_some_and(|u| u.online.load(Ordering::SeqCst))
    }

    fn power_up(&self, unit: UnitId) -> HotplugResult<()> {
        let u = self.unit(unit)?;
        if self.fail_power_up.load(Ordering::SeqCst) {
            return Err(HotplugError::Power {
                unit,
                reason: "injected power-up failure".to_string(),
            });
        }
        u.online.store(true, Ordering::SeqCst);
        self.record(PowerCommand::Up(unit));
        trace!(unit, "sim unit up");
        Ok(())
    }

    fn power_down(&self, unit: UnitId) -> HotplugResult<()> {
        let u = self.unit(unit)?;
        if self.fail_power_down.load(Ordering::SeqCst) {
            return Err(HotplugError::Power {
                unit,
                reason: "injected power-down failure".to_string(),
            });
        }
        u.online.store(false, Ordering::SeqCst);
        u.load.store(0, Ordering::Relaxed);
        self.record(PowerCommand::Down(unit));
        trace!(unit, "sim unit down");
        Ok(())
    }
}

impl LoadSampler for SimPlatform {
    fn sample(&self, unit: UnitId) -> HotplugResult<u64> {
        if self.fail_samples.load(Ordering::SeqCst) {
            return Err(HotplugError::Sample {
                unit,
                reason: "injected sample failure".to_string(),
            });
        }
        self.units
            .get(unit)
            .map(|u| u.load.load(Ordering::Relaxed))
            .ok_or_else(|| HotplugError::Sample {
                unit,
                reason: "no such unit".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_requested_online_prefix() {
        let p = SimPlatform::with_online(8, 4);
        assert_eq!(p.online_units(), vec![0, 1, 2, 3]);
        assert_eq!(p.online_count(), 4);
    }

    #[test]
    fn power_commands_are_idempotent_and_recorded() {
        let p = SimPlatform::with_online(4, 2);
        p.power_up(3).unwrap();
        p.power_up(3).unwrap();
        assert_eq!(p.online_count(), 3);
        p.power_down(0).unwrap();
        assert!(!p.is_online(0));
        assert_eq!(
            p.commands(),
            vec![PowerCommand::Up(3), PowerCommand::Up(3), PowerCommand::Down(0)]
        );
    }

    #[test]
    fn injected_failures_leave_state_unchanged() {
        let p = SimPlatform::with_online(4, 2);
        p.fail_power_up(true);
        assert!(p.power_up(2).is_err());
        assert!(!p.is_online(2));
        p.fail_samples(true);
        assert!(p.sample(0).is_err());
        assert!(p.commands().is_empty());
    }

    #[test]
    fn out_of_range_unit_is_an_error() {
        let p = SimPlatform::new(2);
        assert!(p.power_up(5).is_err());
        assert!(!p.is_online(5));
    }

    #[test]
    fn spread_load_covers_online_units_only() {
        let p = SimPlatform::with_online(4, 3);
        p.spread_load(10);
        let loads: Vec<u64> = (0..4).map(|u| p.sample(u).unwrap()).collect();
        assert_eq!(loads, vec![4, 3, 3, 0]);
    }
}
