//! In-process power-state event bus.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;

use coreplug_core::{
    HotplugError, HotplugResult, PowerEvent, PowerStateCallback, PowerStateSource,
    SubscriptionId,
};

/// Delivers `PowerEvent`s to every subscriber on the emitting thread.
#[derive(Default)]
pub struct PowerStateBus {
    subscribers: RwLock<Vec<(SubscriptionId, PowerStateCallback)>>,
    next_id: AtomicU64,
    refuse: AtomicBool,
}

impl PowerStateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make further `subscribe` calls fail.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Deliver `event` and return how many subscribers saw it.
    pub fn emit(&self, event: PowerEvent) -> usize {
        // Callbacks run outside the lock so they may unsubscribe.
        let callbacks: Vec<PowerStateCallback> = self
            .subscribers
            .read()
            .expect("subscribers lock")
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        debug!(?event, subscribers = callbacks.len(), "power-state event");
        for cb in &callbacks {
            cb(event);
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("subscribers lock").len()
    }
}

impl PowerStateSource for PowerStateBus {
    fn subscribe(&self, callback: PowerStateCallback) -> HotplugResult<SubscriptionId> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(HotplugError::Subscribe(
                "power-state bus is refusing subscriptions".to_string(),
            ));
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .expect("subscribers lock")
            .push((id, callback));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .write()
            .expect("subscribers lock")
            .retain(|(sid, _)| *sid != id);
    }
}
