//! Sampling pass: refresh → decide → reconcile.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use coreplug_core::Policy;
use coreplug_engine::{ReconcileOutcome, compute_target};

use crate::driver::Shared;

/// Observer for completed passes.
pub type PassCallback = Arc<dyn Fn(&PassReport) + Send + Sync>;

/// Result of one sampling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Sum of the online units' load samples.
    pub load: u64,
    pub outcome: ReconcileOutcome,
}

impl Shared {
    pub(crate) fn run_pass(&self) -> PassReport {
        let _pass = self.pass_lock.lock().expect("pass lock");
        let control = self.control();
        let power = self.power.as_ref();

        self.table.refresh(power, self.sampler.as_ref());
        let load = self.table.total_online_load(power);
        let now = self.now_ms();

        let controller = self.controller();
        let outcome = match &control.policy {
            Policy::Adaptive => {
                let target = compute_target(load, &control.settings, control.profiles.current());
                controller.reconcile(target, &control.settings, now)
            }
            Policy::Static(map) => controller.apply_map(map, &control.settings, now),
        };

        debug!(
            load,
            target = outcome.target,
            online = outcome.online_before,
            up = ?outcome.powered_up,
            down = ?outcome.powered_down,
            "sampling pass"
        );

        let report = PassReport { load, outcome };
        if let Some(cb) = self.on_pass.read().expect("callback lock").as_ref() {
            cb(&report);
        }
        report
    }
}

/// One scheduled tick. Returns the delay before the next one, or `None`
/// once the driver has been deactivated.
pub(crate) fn tick(shared: &Shared) -> Option<Duration> {
    if !shared.is_active() {
        debug!("sampler woke while inactive, not rescheduling");
        return None;
    }
    shared.run_pass();
    shared
        .is_active()
        .then(|| shared.control().settings.sampling_interval())
}

#[cfg(test)]
mod tests {
    use coreplug_core::{HotplugConfig, LOAD_FSHIFT, PowerControl, Profile, ProfileStore};
    use coreplug_sim::{PowerStateBus, SimPlatform};
    use std::sync::Arc;

    use crate::driver::{Driver, Platform};

    fn unscaled_driver(sim: Arc<SimPlatform>) -> Driver {
        let driver = Driver::new(
            &HotplugConfig::default(),
            Platform::new(sim.clone(), sim, Arc::new(PowerStateBus::new())),
        )
        .unwrap();
        driver
            .update(|c| {
                c.settings.load_scale_shift = LOAD_FSHIFT;
                Ok(())
            })
            .unwrap();
        driver
    }

    #[test]
    fn pass_sums_online_load_and_scales_up() {
        let sim = Arc::new(SimPlatform::with_online(8, 4));
        sim.set_loads(&[10, 10, 10, 10, 99, 99, 99, 99]);
        let driver = unscaled_driver(sim.clone());

        let report = driver.run_pass();
        // Offline units do not count toward the load.
        assert_eq!(report.load, 40);
        assert_eq!(report.outcome.target, 6);
        assert_eq!(report.outcome.powered_up, vec![4, 5]);
        assert_eq!(sim.online_count(), 6);
    }

    #[test]
    fn heavy_load_brings_everything_up() {
        let sim = Arc::new(SimPlatform::with_online(8, 4));
        sim.set_loads(&[20, 20, 20, 20]);
        let driver = unscaled_driver(sim.clone());

        let report = driver.run_pass();
        assert_eq!(report.outcome.target, 8);
        assert_eq!(sim.online_count(), 8);
    }

    #[test]
    fn disabled_profile_scales_down_to_min() {
        let sim = Arc::new(SimPlatform::new(8));
        sim.set_loads(&[50, 50, 50, 50, 0, 0, 0, 0]);
        let driver = unscaled_driver(sim.clone());
        driver.update(|c| c.profiles.select(1)).unwrap();

        let report = driver.run_pass();
        assert_eq!(report.outcome.target, 4);
        assert_eq!(report.outcome.powered_down, vec![4, 5, 6, 7]);
    }

    #[test]
    fn static_policy_ignores_load() {
        let sim = Arc::new(SimPlatform::new(8));
        sim.set_loads(&[9999; 8]);
        let driver = unscaled_driver(sim.clone());
        driver
            .update(|c| {
                c.policy = coreplug_core::Policy::Static(vec![false; 8]);
                c.settings.reserved_units = 2;
                Ok(())
            })
            .unwrap();

        driver.run_pass();
        assert_eq!(sim.online_units(), vec![0, 1]);
    }

    #[test]
    fn pass_callback_sees_every_report() {
        let sim = Arc::new(SimPlatform::with_online(8, 4));
        let driver = unscaled_driver(sim);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        driver.set_pass_callback(Arc::new(move |r| sink.lock().unwrap().push(r.outcome.target)));

        driver.run_pass();
        driver.run_pass();
        assert_eq!(*seen.lock().unwrap(), vec![4, 4]);
    }

    #[test]
    fn custom_profile_store() {
        let sim = Arc::new(SimPlatform::with_online(8, 4));
        sim.set_loads(&[1, 1, 1, 1]);
        let driver = unscaled_driver(sim.clone());
        driver
            .update(|c| {
                c.profiles = ProfileStore::new(vec![Profile::new("eager", vec![1, 2])], 0)?;
                Ok(())
            })
            .unwrap();

        // Load 4 exceeds both entries, the sentinel stops the walk at 6.
        assert_eq!(driver.run_pass().outcome.target, 6);
    }
}
