//! Decision engine: load sample → target online count.

use coreplug_core::{LOAD_FSHIFT, Profile, Settings};

/// Scale a profile threshold to the fixed-point scale of a load sample.
///
/// Thresholds carry `load_scale_shift` fractional bits, samples carry
/// `LOAD_FSHIFT`. Saturates instead of overflowing.
pub fn scale_threshold(threshold: u32, load_scale_shift: u32) -> u64 {
    let threshold = u64::from(threshold);
    if load_scale_shift <= LOAD_FSHIFT {
        let shift = LOAD_FSHIFT - load_scale_shift;
        if threshold > (u64::MAX >> shift) {
            u64::MAX
        } else {
            threshold << shift
        }
    } else {
        threshold.checked_shr(load_scale_shift - LOAD_FSHIFT).unwrap_or(0)
    }
}

/// Smallest online count in `[min_online, max_online]` whose profile
/// threshold covers `load`.
///
/// Walks the profile one step per extra unit. The walk stops at the first
/// threshold the load does not exceed, past the last finite entry, or at
/// `max_online`. A step whose remaining entries are all zero also ends the
/// walk, so an all-zero profile pins the target to `min_online`; a zero
/// followed by non-zero entries is an ordinary threshold.
pub fn compute_target(load: u64, settings: &Settings, profile: &Profile) -> usize {
    let min = settings.min_online;
    let max = settings.max_online.max(min);

    let mut n = min;
    while n < max {
        let Some(threshold) = profile.threshold(n - min) else {
            break;
        };
        if load <= scale_threshold(threshold, settings.load_scale_shift)
            || zero_tail(profile, n - min)
        {
            break;
        }
        n += 1;
    }
    n
}

fn zero_tail(profile: &Profile, step: usize) -> bool {
    profile.thresholds()[step..].iter().all(|&t| t == 0)
}
