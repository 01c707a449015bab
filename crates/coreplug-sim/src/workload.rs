//! Synthetic system load over time.
//!
//! Loads are given in runnable tasks on the command line and produced as
//! fixed-point values with `LOAD_FSHIFT` fractional bits.

use std::str::FromStr;

use thiserror::Error;

use coreplug_core::LOAD_FSHIFT;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid workload {input:?}: {reason}")]
pub struct WorkloadParseError {
    input: String,
    reason: String,
}

/// Total system load as a function of the tick number.
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    /// No load at all.
    Idle,
    /// Constant load.
    Steady(f64),
    /// Alternate between `low` and `high` every `period` ticks.
    Step { low: f64, high: f64, period: u64 },
    /// Triangle wave from 0 to `peak` and back over `period` ticks.
    Ramp { peak: f64, period: u64 },
}

impl Workload {
    /// Fixed-point system load at `tick`.
    pub fn load_at(&self, tick: u64) -> u64 {
        let tasks = match *self {
            Workload::Idle => 0.0,
            Workload::Steady(load) => load,
            Workload::Step { low, high, period } => {
                if (tick / period.max(1)) % 2 == 0 {
                    low
                } else {
                    high
                }
            }
            Workload::Ramp { peak, period } => {
                let period = period.max(2);
                let half = period / 2;
                let phase = tick % period;
                let up = if phase <= half { phase } else { period - phase };
                peak * up as f64 / half as f64
            }
        };
        to_fixed(tasks)
    }
}

fn to_fixed(tasks: f64) -> u64 {
    (tasks.max(0.0) * f64::from(1u32 << LOAD_FSHIFT)).round() as u64
}

impl FromStr for Workload {
    type Err = WorkloadParseError;

    /// `idle`, `steady:<tasks>`, `step:<low>:<high>:<period>`, `ramp:<peak>:<period>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| WorkloadParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let parts: Vec<&str> = s.trim().split(':').collect();
        let num = |i: usize| -> Result<f64, WorkloadParseError> {
            parts
                .get(i)
                .ok_or_else(|| err("missing field"))?
                .parse::<f64>()
                .map_err(|_| err("expected a number"))
        };
        let ticks = |i: usize| -> Result<u64, WorkloadParseError> {
            parts
                .get(i)
                .ok_or_else(|| err("missing period"))?
                .parse::<u64>()
                .map_err(|_| err("period must be a whole number of ticks"))
        };

        match parts[0] {
            "idle" => Ok(Workload::Idle),
            "steady" => Ok(Workload::Steady(num(1)?)),
            "step" => Ok(Workload::Step {
                low: num(1)?,
                high: num(2)?,
                period: ticks(3)?,
            }),
            "ramp" => Ok(Workload::Ramp {
                peak: num(1)?,
                period: ticks(2)?,
            }),
            _ => Err(err("expected idle, steady, step or ramp")),
        }
    }
}
