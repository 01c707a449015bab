//! coreplug-engine — decides how many units to keep online and converges
//! the platform to that count.
//!
//! # Pass
//!
//! ```text
//! load   = Σ load(u) for online u            (CoreStateTable)
//! target = compute_target(load, settings, profile)
//!
//! target < online:  power down idle units above the reserved prefix,
//!                   skipping units inside min_up_time_ms,
//!                   idle = load(u) < (global_threshold * 2) / online
//! target > online:  power up offline units, stamp power-up time
//! ```
//!
//! Iteration is lowest unit id first in both directions, so a pass is
//! reproducible for a given table and platform state.

pub mod controller;
pub mod decision;
pub mod state;
pub mod static_map;

pub use controller::{Controller, ReconcileOutcome, power_down_threshold};
pub use decision::{compute_target, scale_threshold};
pub use state::{CoreState, CoreStateTable};
pub use static_map::wanted_online;
