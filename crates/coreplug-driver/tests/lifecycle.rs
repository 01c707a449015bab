//! End-to-end lifecycle of the driver on a simulated platform, with the
//! tokio clock paused so tick boundaries are exact.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use coreplug_core::{HotplugConfig, HotplugError, LOAD_FSHIFT, PowerControl, PowerEvent};
use coreplug_driver::{Driver, Platform, Tunables};
use coreplug_sim::{PowerStateBus, SimPlatform};

struct Harness {
    sim: Arc<SimPlatform>,
    bus: Arc<PowerStateBus>,
    driver: Arc<Driver>,
    passes: Arc<AtomicUsize>,
}

fn harness(online: usize) -> Harness {
    let sim = Arc::new(SimPlatform::with_online(8, online));
    let bus = Arc::new(PowerStateBus::new());
    let driver = Arc::new(
        Driver::new(
            &HotplugConfig::default(),
            Platform::new(sim.clone(), sim.clone(), bus.clone()),
        )
        .unwrap(),
    );
    let passes = Arc::new(AtomicUsize::new(0));
    let counter = passes.clone();
    driver.set_pass_callback(Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    Harness {
        sim,
        bus,
        driver,
        passes,
    }
}

impl Harness {
    fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn tasks(n: u64) -> u64 {
    n << LOAD_FSHIFT
}

#[tokio::test(start_paused = true)]
async fn cold_start_then_first_pass_after_startup_delay() {
    let h = harness(4);
    h.driver.init().await;
    assert!(h.driver.is_active());
    assert_eq!(h.sim.online_count(), 8);

    advance(9_999).await;
    assert_eq!(h.passes(), 0);
    assert_eq!(h.sim.online_count(), 8);

    advance(2).await;
    assert_eq!(h.passes(), 1);
    // Idle system: back down to the minimum, reserved prefix kept.
    assert_eq!(h.sim.online_units(), vec![0, 1, 2, 3]);
    h.driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn passes_follow_the_sampling_interval() {
    let h = harness(8);
    h.driver.start().await.unwrap();

    advance(10_001).await;
    assert_eq!(h.passes(), 1);
    advance(300 * 5).await;
    assert_eq!(h.passes(), 6);
    h.driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn interval_change_applies_from_the_next_reschedule() {
    let h = harness(8);
    let tunables = Tunables::new(h.driver.clone());
    h.driver.start().await.unwrap();

    advance(10_001).await;
    assert_eq!(h.passes(), 1);
    tunables.store("sampling_interval_ms", "1000").await.unwrap();

    // The already scheduled tick at +300 keeps its delay.
    advance(300).await;
    assert_eq!(h.passes(), 2);
    advance(998).await;
    assert_eq!(h.passes(), 2);
    advance(2).await;
    assert_eq!(h.passes(), 3);
    h.driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn no_pass_runs_after_stop() {
    let h = harness(8);
    h.driver.start().await.unwrap();
    advance(10_001).await;
    assert_eq!(h.passes(), 1);

    h.driver.stop().await;
    h.sim.clear_commands();
    advance(5_000).await;
    assert_eq!(h.passes(), 1);
    assert!(h.sim.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_during_startup_delay_cancels_first_pass() {
    let h = harness(4);
    h.driver.start().await.unwrap();
    advance(5_000).await;
    h.driver.stop().await;

    advance(20_000).await;
    assert_eq!(h.passes(), 0);
    assert_eq!(h.sim.online_count(), 8);
}

#[tokio::test(start_paused = true)]
async fn load_spike_scales_up_on_next_tick() {
    let h = harness(8);
    h.driver.start().await.unwrap();
    advance(10_001).await;
    assert_eq!(h.sim.online_count(), 4);

    h.sim.spread_load(tasks(10));
    advance(300).await;
    assert_eq!(h.sim.online_count(), 8);
    h.driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn resume_override_then_policy_reapplies_after_dwell() {
    let h = harness(8);
    h.driver.start().await.unwrap();
    advance(10_001).await;
    assert_eq!(h.sim.online_count(), 4);

    h.bus.emit(PowerEvent::Active);
    assert_eq!(h.sim.online_count(), 8);

    // Freshly powered units are held for the minimum up time.
    advance(1_798).await;
    assert_eq!(h.sim.online_count(), 8);
    advance(302).await;
    assert_eq!(h.sim.online_count(), 4);
    h.driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_activation_leaves_driver_inactive() {
    let h = harness(4);
    h.bus.refuse_subscriptions(true);
    let tunables = Tunables::new(h.driver.clone());

    let err = tunables.store("active", "1").await.unwrap_err();
    assert!(matches!(err, HotplugError::ResourceAllocation(_)));
    assert_eq!(tunables.show("active").unwrap(), "0\n");
    assert_eq!(h.sim.online_count(), 4);

    advance(20_000).await;
    assert_eq!(h.passes(), 0);
}

#[tokio::test(start_paused = true)]
async fn active_tunable_restarts_with_cold_start() {
    let h = harness(8);
    let tunables = Tunables::new(h.driver.clone());
    tunables.store("active", "1").await.unwrap();
    advance(10_001).await;
    assert_eq!(h.sim.online_count(), 4);

    tunables.store("active", "0").await.unwrap();
    assert_eq!(h.bus.subscriber_count(), 0);
    assert_eq!(h.sim.online_count(), 4);

    tunables.store("active", "1").await.unwrap();
    assert_eq!(h.sim.online_count(), 8);
    assert_eq!(h.bus.subscriber_count(), 1);
    h.driver.stop().await;
}
