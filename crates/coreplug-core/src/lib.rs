//! coreplug-core — shared types for the coreplug hotplug controller.
//!
//! Holds the runtime knobs (`Settings`), the threshold tables
//! (`Profile`, `ProfileStore`), the `coreplug.toml` parser, the error type,
//! and the capability traits the platform implements:
//!
//! ```text
//! PowerControl      power_up / power_down / is_online
//! LoadSampler       per-unit fixed-point load
//! PowerStateSource  Active / Suspend subscription
//! ```

pub mod config;
pub mod error;
pub mod platform;
pub mod types;

pub use config::HotplugConfig;
pub use error::{HotplugError, HotplugResult};
pub use platform::*;
pub use types::*;
