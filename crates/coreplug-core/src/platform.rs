//! Capabilities the controller needs from the platform.
//!
//! The controller never touches hardware directly. It drives units through
//! `PowerControl`, reads per-unit load through `LoadSampler`, and learns
//! about suspend/resume through `PowerStateSource`.

use std::sync::Arc;

use crate::error::HotplugResult;
use crate::types::{PowerEvent, UnitId};

/// Powers processing units on and off.
///
/// Both commands are idempotent: powering up an online unit (or down an
/// offline one) has no effect.
pub trait PowerControl: Send + Sync {
    /// Number of units on this platform.
    fn unit_count(&self) -> usize;

    /// Whether `unit` is currently online.
    fn is_online(&self, unit: UnitId) -> bool;

    fn power_up(&self, unit: UnitId) -> HotplugResult<()>;

    fn power_down(&self, unit: UnitId) -> HotplugResult<()>;

    /// Number of units currently online.
    fn online_count(&self) -> usize {
        (0..self.unit_count()).filter(|&u| self.is_online(u)).count()
    }
}

/// Reads a unit's running load as a fixed-point value
/// (see [`LOAD_FSHIFT`](crate::types::LOAD_FSHIFT)).
pub trait LoadSampler: Send + Sync {
    fn sample(&self, unit: UnitId) -> HotplugResult<u64>;
}

/// Callback invoked on the event source's own context.
pub type PowerStateCallback = Arc<dyn Fn(PowerEvent) + Send + Sync>;

/// Handle returned by [`PowerStateSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Source of suspend/resume events.
pub trait PowerStateSource: Send + Sync {
    fn subscribe(&self, callback: PowerStateCallback) -> HotplugResult<SubscriptionId>;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
