//! Controller: converges the online set to a target count.
//!
//! Power-down walks online units above the reserved prefix, lowest id
//! first, skipping units still inside their hysteresis window and units
//! busier than the per-pass threshold. Power-up walks offline units in the
//! same order. Neither direction retries a failed command: the next pass
//! starts from fresh state and picks it up again.

use std::cmp::Ordering;

use tracing::{debug, warn};

use coreplug_core::{LoadSampler, PowerControl, Settings, UnitId};

use crate::state::CoreStateTable;

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Online units when the pass started.
    pub online_before: usize,
    pub target: usize,
    pub powered_up: Vec<UnitId>,
    pub powered_down: Vec<UnitId>,
}

impl ReconcileOutcome {
    fn start(online_before: usize, target: usize) -> Self {
        Self {
            online_before,
            target,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.powered_up.is_empty() && self.powered_down.is_empty()
    }

    /// Online units after the pass as seen by this pass alone. Units powered
    /// up concurrently by the resume override are not counted.
    pub fn online_after(&self) -> usize {
        (self.online_before + self.powered_up.len()).saturating_sub(self.powered_down.len())
    }
}

/// Per-pass power-down threshold: `(global_threshold * 2) / online`.
pub fn power_down_threshold(global_threshold: u64, online: usize) -> u64 {
    global_threshold.saturating_mul(2) / online.max(1) as u64
}

/// Issues power commands against a platform and keeps the core state table
/// in step with them.
pub struct Controller<'a> {
    pub(crate) power: &'a dyn PowerControl,
    pub(crate) sampler: &'a dyn LoadSampler,
    pub(crate) table: &'a CoreStateTable,
}

impl<'a> Controller<'a> {
    pub fn new(
        power: &'a dyn PowerControl,
        sampler: &'a dyn LoadSampler,
        table: &'a CoreStateTable,
    ) -> Self {
        Self {
            power,
            sampler,
            table,
        }
    }

    /// Move the online count toward `target`.
    ///
    /// `now_ms` is the monotonic time used for the hysteresis window and
    /// power-up stamps.
    pub fn reconcile(&self, target: usize, settings: &Settings, now_ms: u64) -> ReconcileOutcome {
        let online = self.power.online_count();
        let mut outcome = ReconcileOutcome::start(online, target);

        match target.cmp(&online) {
            Ordering::Equal => {}
            Ordering::Less => self.power_down_to(settings, now_ms, &mut outcome),
            Ordering::Greater => self.power_up_to(settings, now_ms, &mut outcome),
        }
        outcome
    }

    fn power_down_to(&self, settings: &Settings, now_ms: u64, outcome: &mut ReconcileOutcome) {
        self.table.refresh_online(self.power, self.sampler);

        let threshold = power_down_threshold(settings.global_threshold, outcome.online_before);
        let mut online = outcome.online_before;

        for unit in settings.reserved_units..self.power.unit_count() {
            if online <= outcome.target {
                break;
            }
            if !self.power.is_online(unit) {
                continue;
            }
            if !self
                .table
                .dwell_elapsed(unit, now_ms, settings.min_up_time_ms)
            {
                debug!(unit, "unit inside hysteresis window, skipped");
                continue;
            }
            let load = self.table.load(unit);
            if load >= threshold {
                continue;
            }
            match self.power.power_down(unit) {
                Ok(()) => {
                    self.table.clear(unit);
                    online -= 1;
                    outcome.powered_down.push(unit);
                    debug!(unit, load, threshold, "unit powered down");
                }
                Err(e) => warn!(unit, error = %e, "power-down failed"),
            }
        }
    }

    fn power_up_to(&self, settings: &Settings, now_ms: u64, outcome: &mut ReconcileOutcome) {
        self.table.refresh_offline(self.power);

        let mut online = outcome.online_before;

        for unit in settings.reserved_units..self.power.unit_count() {
            if online >= outcome.target {
                break;
            }
            if self.power.is_online(unit) {
                continue;
            }
            if self.bring_up(unit, now_ms) {
                online += 1;
                outcome.powered_up.push(unit);
            }
        }
    }

    /// Power up `unit` and stamp it. Returns whether the command succeeded.
    pub fn bring_up(&self, unit: UnitId, now_ms: u64) -> bool {
        match self.power.power_up(unit) {
            Ok(()) => {
                self.table.stamp_power_up(unit, now_ms);
                debug!(unit, "unit powered up");
                true
            }
            Err(e) => {
                warn!(unit, error = %e, "power-up failed");
                false
            }
        }
    }

    /// Power up every offline unit, reserved ones included.
    pub fn bring_all_up(&self, now_ms: u64) -> Vec<UnitId> {
        (0..self.power.unit_count())
            .filter(|&u| !self.power.is_online(u))
            .filter(|&u| self.bring_up(u, now_ms))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreplug_sim::{PowerCommand, SimPlatform};

    fn settings() -> Settings {
        Settings {
            min_online: 4,
            max_online: 8,
            min_up_time_ms: 2000,
            global_threshold: 525,
            reserved_units: 4,
            ..Settings::default()
        }
    }

    #[test]
    fn downward_threshold_formula() {
        assert_eq!(power_down_threshold(525, 8), 131);
        assert_eq!(power_down_threshold(525, 0), 1050);
    }

    #[test]
    fn on_target_is_noop() {
        let sim = SimPlatform::with_online(8, 6);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        let outcome = controller.reconcile(6, &settings(), 10_000);
        assert!(outcome.is_noop());
        assert!(sim.commands().is_empty());
    }

    #[test]
    fn powers_up_lowest_offline_first() {
        let sim = SimPlatform::with_online(8, 4);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        let outcome = controller.reconcile(6, &settings(), 5000);
        assert_eq!(outcome.powered_up, vec![4, 5]);
        assert_eq!(outcome.online_after(), 6);
        assert_eq!(sim.online_count(), 6);
        assert_eq!(table.powered_up_at(4), Some(5000));
        assert_eq!(table.powered_up_at(6), None);
    }

    #[test]
    fn powers_down_idle_units_until_target() {
        let sim = SimPlatform::new(8);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        let outcome = controller.reconcile(5, &settings(), 10_000);
        assert_eq!(outcome.powered_down, vec![4, 5, 6]);
        assert_eq!(sim.online_units(), vec![0, 1, 2, 3, 7]);
    }

    #[test]
    fn busy_units_are_kept() {
        let sim = SimPlatform::new(8);
        // Threshold with 8 online is 131.
        sim.set_loads(&[0, 0, 0, 0, 500, 131, 130, 0]);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        let outcome = controller.reconcile(4, &settings(), 10_000);
        assert_eq!(outcome.powered_down, vec![6, 7]);
        assert_eq!(sim.online_count(), 6);
    }

    #[test]
    fn reserved_units_never_powered_down() {
        let sim = SimPlatform::new(8);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        let mut s = settings();
        s.min_online = 1;
        let outcome = controller.reconcile(1, &s, 10_000);
        assert_eq!(outcome.powered_down, vec![4, 5, 6, 7]);
        for unit in 0..4 {
            assert!(sim.is_online(unit));
        }
    }

    #[test]
    fn hysteresis_protects_fresh_units() {
        let sim = SimPlatform::with_online(8, 4);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        controller.reconcile(8, &settings(), 1000);
        assert_eq!(sim.online_count(), 8);

        // 1999 ms later every fresh unit is still protected.
        let outcome = controller.reconcile(4, &settings(), 2999);
        assert!(outcome.is_noop());

        let outcome = controller.reconcile(4, &settings(), 3000);
        assert_eq!(outcome.powered_down, vec![4, 5, 6, 7]);
    }

    #[test]
    fn repeated_reconcile_is_idempotent() {
        let sim = SimPlatform::with_online(8, 4);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        controller.reconcile(7, &settings(), 100);
        sim.clear_commands();
        let outcome = controller.reconcile(7, &settings(), 100);
        assert!(outcome.is_noop());
        assert!(sim.commands().is_empty());
    }

    #[test]
    fn failed_commands_are_not_retried_within_a_pass() {
        let sim = SimPlatform::with_online(8, 4);
        sim.fail_power_up(true);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        let outcome = controller.reconcile(6, &settings(), 100);
        assert!(outcome.powered_up.is_empty());
        assert_eq!(sim.online_count(), 4);

        // Next pass recovers from fresh state.
        sim.fail_power_up(false);
        let outcome = controller.reconcile(6, &settings(), 400);
        assert_eq!(outcome.powered_up, vec![4, 5]);
    }

    #[test]
    fn failed_power_down_keeps_unit_and_stamp() {
        let sim = SimPlatform::with_online(8, 4);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);
        controller.reconcile(8, &settings(), 100);
        sim.clear_commands();

        sim.fail_power_down(true);
        let outcome = controller.reconcile(4, &settings(), 5000);
        assert!(outcome.powered_down.is_empty());
        assert_eq!(outcome.online_after(), 8);
        assert_eq!(sim.online_count(), 8);
        assert_eq!(table.powered_up_at(4), Some(100));
        // No command was accepted and the stamp is untouched.
        assert!(sim.commands().is_empty());

        sim.fail_power_down(false);
        let outcome = controller.reconcile(4, &settings(), 5300);
        assert_eq!(outcome.powered_down, vec![4, 5, 6, 7]);
        assert_eq!(sim.online_count(), 4);
    }

    #[test]
    fn power_down_clears_stamp() {
        let sim = SimPlatform::with_online(8, 4);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        controller.reconcile(5, &settings(), 100);
        assert!(table.powered_up_at(4).is_some());
        controller.reconcile(4, &settings(), 5000);
        assert_eq!(table.powered_up_at(4), None);
        assert_eq!(
            sim.commands(),
            vec![PowerCommand::Up(4), PowerCommand::Down(4)]
        );
    }

    #[test]
    fn bring_all_up_includes_reserved() {
        let sim = SimPlatform::with_online(8, 0);
        let table = CoreStateTable::new(8);
        let controller = Controller::new(&sim, &sim, &table);

        let up = controller.bring_all_up(50);
        assert_eq!(up, (0..8).collect::<Vec<_>>());
        assert_eq!(sim.online_count(), 8);
    }
}
