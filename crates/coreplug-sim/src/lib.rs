//! coreplug-sim — an in-process platform for the hotplug controller.
//!
//! `SimPlatform` implements `PowerControl` and `LoadSampler` over atomics,
//! with switches to make power commands or samples fail. `PowerStateBus`
//! implements `PowerStateSource` and delivers events synchronously on the
//! caller's thread. `Workload` generates system load over time.

pub mod bus;
pub mod platform;
pub mod workload;

pub use bus::PowerStateBus;
pub use platform::{PowerCommand, SimPlatform};
pub use workload::{Workload, WorkloadParseError};
