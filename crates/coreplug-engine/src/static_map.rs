//! Static core-map policy: a fixed set of units stays online.

use tracing::{debug, warn};

use coreplug_core::{Settings, UnitId};

use crate::controller::{Controller, ReconcileOutcome};

/// Whether `unit` should be online under `map`. Reserved units always are,
/// units past the end of the map never are.
pub fn wanted_online(map: &[bool], settings: &Settings, unit: UnitId) -> bool {
    settings.is_reserved(unit) || map.get(unit).copied().unwrap_or(false)
}

impl Controller<'_> {
    /// Power down online units outside `map`, then power up offline units in it.
    pub fn apply_map(&self, map: &[bool], settings: &Settings, now_ms: u64) -> ReconcileOutcome {
        let units = self.power.unit_count();
        let target = (0..units)
            .filter(|&u| wanted_online(map, settings, u))
            .count();
        let mut outcome = ReconcileOutcome {
            online_before: self.power.online_count(),
            target,
            ..ReconcileOutcome::default()
        };

        for unit in 0..units {
            if !self.power.is_online(unit) || wanted_online(map, settings, unit) {
                continue;
            }
            match self.power.power_down(unit) {
                Ok(()) => {
                    self.table.clear(unit);
                    outcome.powered_down.push(unit);
                    debug!(unit, "unit powered down (static map)");
                }
                Err(e) => warn!(unit, error = %e, "power-down failed"),
            }
        }

        for unit in 0..units {
            if self.power.is_online(unit) || !wanted_online(map, settings, unit) {
                continue;
            }
            if self.bring_up(unit, now_ms) {
                outcome.powered_up.push(unit);
            }
        }

        outcome
    }
}
