//! Lifecycle controller. Owns the settings, the core state table and the
//! active flag, and starts/stops the sampling loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::time::Instant;
use tracing::{error, info, warn};

use coreplug_core::{
    HotplugConfig, HotplugError, HotplugResult, LoadSampler, Policy, PowerControl,
    PowerStateSource, ProfileStore, Settings, SubscriptionId,
};
use coreplug_engine::{Controller, CoreState, CoreStateTable};

use crate::listener::PowerStateListener;
use crate::sampler::{self, PassCallback};
use crate::work::DelayedWork;

/// Platform capabilities handed to the driver.
#[derive(Clone)]
pub struct Platform {
    pub power: Arc<dyn PowerControl>,
    pub sampler: Arc<dyn LoadSampler>,
    pub events: Arc<dyn PowerStateSource>,
}

impl Platform {
    pub fn new(
        power: Arc<dyn PowerControl>,
        sampler: Arc<dyn LoadSampler>,
        events: Arc<dyn PowerStateSource>,
    ) -> Self {
        Self {
            power,
            sampler,
            events,
        }
    }
}

/// Everything a pass reads from the control surface, copied as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock {
    pub settings: Settings,
    pub profiles: ProfileStore,
    pub policy: Policy,
}

/// State shared between the driver, the sampling task and the listener.
pub(crate) struct Shared {
    pub(crate) control: RwLock<ControlBlock>,
    pub(crate) table: CoreStateTable,
    pub(crate) active: AtomicBool,
    pub(crate) power: Arc<dyn PowerControl>,
    pub(crate) sampler: Arc<dyn LoadSampler>,
    /// Held for the duration of a pass: passes never overlap.
    pub(crate) pass_lock: Mutex<()>,
    pub(crate) on_pass: RwLock<Option<PassCallback>>,
    epoch: Instant,
}

impl Shared {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn control(&self) -> ControlBlock {
        self.control.read().expect("control lock").clone()
    }

    /// Milliseconds since the driver was created.
    pub(crate) fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub(crate) fn controller(&self) -> Controller<'_> {
        Controller::new(self.power.as_ref(), self.sampler.as_ref(), &self.table)
    }
}

/// Resources held while the loop is active.
struct Running {
    work: DelayedWork,
    subscription: SubscriptionId,
}

/// The hotplug driver: one control loop over one platform.
pub struct Driver {
    shared: Arc<Shared>,
    events: Arc<dyn PowerStateSource>,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
    start_on_init: bool,
}

impl Driver {
    /// Build a driver from a validated config. The loop is not started.
    pub fn new(config: &HotplugConfig, platform: Platform) -> HotplugResult<Self> {
        let units = platform.power.unit_count();
        config.validate(units)?;

        let control = ControlBlock {
            settings: config.settings(),
            profiles: config.profile_store()?,
            policy: config.policy(),
        };
        if control.settings.reserved_exceeds_max() {
            warn!(
                reserved_units = control.settings.reserved_units,
                max_online = control.settings.max_online,
                "reserved units exceed max_online, scale-down cannot reach its target"
            );
        }

        Ok(Self {
            shared: Arc::new(Shared {
                control: RwLock::new(control),
                table: CoreStateTable::new(units),
                active: AtomicBool::new(false),
                power: platform.power,
                sampler: platform.sampler,
                pass_lock: Mutex::new(()),
                on_pass: RwLock::new(None),
                epoch: Instant::now(),
            }),
            events: platform.events,
            lifecycle: tokio::sync::Mutex::new(None),
            start_on_init: config.active,
        })
    }

    /// Observe every sampling pass.
    pub fn set_pass_callback(&self, callback: PassCallback) {
        *self.shared.on_pass.write().expect("callback lock") = Some(callback);
    }

    /// Host initialization: start the loop if the config asks for it.
    ///
    /// A failed start is logged and leaves the driver inactive.
    pub async fn init(&self) {
        if !self.start_on_init {
            info!("hotplug driver loaded inactive");
            return;
        }
        if let Err(e) = self.start().await {
            error!(error = %e, "hotplug driver failed to start, staying inactive");
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Start the loop. No-op when already active.
    ///
    /// Allocates the sampling task and registers the power-state listener,
    /// powers every unit up, and schedules the first pass after the startup
    /// delay. On failure everything allocated so far is released and the
    /// driver stays inactive.
    pub async fn start(&self) -> HotplugResult<()> {
        let mut running = self.lifecycle.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let mut work = DelayedWork::new("coreplug-sampler")?;

        let listener = PowerStateListener::new(self.shared.clone());
        let subscription = self
            .events
            .subscribe(listener.into_callback())
            .map_err(|e| {
                HotplugError::ResourceAllocation(format!("power-state listener: {e}"))
            })?;

        let brought_up = self.shared.controller().bring_all_up(self.shared.now_ms());
        self.shared.active.store(true, Ordering::SeqCst);

        let delay = self.shared.control().settings.startup_delay();
        let tick_shared = self.shared.clone();
        work.schedule(delay, move || sampler::tick(&tick_shared));

        *running = Some(Running { work, subscription });
        info!(
            units = self.shared.power.unit_count(),
            cold_started = brought_up.len(),
            startup_delay_ms = delay.as_millis() as u64,
            "hotplug driver started"
        );
        Ok(())
    }

    /// Stop the loop and wait for any in-flight pass. No-op when inactive.
    pub async fn stop(&self) {
        let mut running = self.lifecycle.lock().await;
        let Some(mut r) = running.take() else {
            return;
        };

        self.shared.active.store(false, Ordering::SeqCst);
        r.work.cancel_and_join().await;
        self.events.unsubscribe(r.subscription);
        info!("hotplug driver stopped");
    }

    /// Activate or deactivate. A failed activation leaves the driver inactive.
    pub async fn set_active(&self, active: bool) -> HotplugResult<()> {
        if active == self.is_active() {
            return Ok(());
        }
        if active {
            self.start().await
        } else {
            self.stop().await;
            Ok(())
        }
    }

    /// Run one sampling pass now, outside the schedule.
    #[cfg(test)]
    pub(crate) fn run_pass(&self) -> sampler::PassReport {
        self.shared.run_pass()
    }

    /// Copy of the current control block.
    pub fn control(&self) -> ControlBlock {
        self.shared.control()
    }

    pub fn settings(&self) -> Settings {
        self.shared.control().settings
    }

    /// Apply `f` to a copy of the control block and commit it only if both
    /// `f` and the resulting bounds check succeed.
    pub fn update<F>(&self, f: F) -> HotplugResult<()>
    where
        F: FnOnce(&mut ControlBlock) -> HotplugResult<()>,
    {
        let mut control = self.shared.control.write().expect("control lock");
        let mut next = control.clone();
        f(&mut next)?;
        next.settings.validate(self.platform_units())?;
        if next.settings.reserved_exceeds_max() {
            warn!(
                reserved_units = next.settings.reserved_units,
                max_online = next.settings.max_online,
                "reserved units exceed max_online, scale-down cannot reach its target"
            );
        }
        *control = next;
        Ok(())
    }

    pub fn platform_units(&self) -> usize {
        self.shared.power.unit_count()
    }

    pub fn online_units(&self) -> usize {
        self.shared.power.online_count()
    }

    pub fn core_states(&self) -> Vec<CoreState> {
        self.shared.table.snapshot(self.shared.power.as_ref())
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(r) = self.lifecycle.get_mut().take() {
            self.shared.active.store(false, Ordering::SeqCst);
            self.events.unsubscribe(r.subscription);
        }
    }
}
