//! coreplug-driver — runs the hotplug control loop.
//!
//! # Architecture
//!
//! ```text
//! Driver
//!   ├── DelayedWork "coreplug-sampler"   (startup delay, then every
//!   │     └── tick → run_pass             sampling_interval_ms while active)
//!   │           ├── CoreStateTable::refresh
//!   │           ├── compute_target        (adaptive policy)
//!   │           └── Controller::reconcile / apply_map
//!   ├── PowerStateListener                 (resume → all units online)
//!   └── Tunables                           (validated key/value surface)
//! ```
//!
//! `Driver::stop` cancels the sampling chain and waits for it, so no pass
//! runs once it returns.

pub mod driver;
pub mod listener;
pub mod sampler;
pub mod tunables;
pub mod work;

pub use driver::{ControlBlock, Driver, Platform};
pub use sampler::{PassCallback, PassReport};
pub use tunables::Tunables;
pub use work::DelayedWork;
