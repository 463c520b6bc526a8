//! Delta and rate helpers shared by the stateful samplers.
//!
//! A sampler keeps the counters of its last successful read in a
//! [`SamplerState`]. The first read only seeds the state; every later read
//! derives a rate from the difference to the stored counters divided by the
//! wall-clock time between the two capture instants.

use std::time::Instant;

use crate::collector::procfs::parser::CpuStat;

/// Previous-sample state of one sampler.
#[derive(Debug, Clone)]
pub struct SamplerState<C> {
    /// Counters of the last successful read.
    pub previous: C,
    /// When those counters were read.
    pub captured_at: Instant,
}

impl<C> SamplerState<C> {
    pub fn new(previous: C, captured_at: Instant) -> Self {
        Self {
            previous,
            captured_at,
        }
    }

    /// Seconds between the stored capture and `now`. Zero if `now` is not later.
    pub fn elapsed_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.captured_at).as_secs_f64()
    }
}

/// Signed per-second rate of a cumulative counter.
///
/// A counter that went backwards (reset, wrap) yields a negative rate.
/// Returns 0 when no time has elapsed.
pub fn per_second(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (current as f64 - previous as f64) / elapsed_secs
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole * 100` rounded to two decimals, 0 when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// Busy share of CPU time between two `/proc/stat` readings, in [0, 100].
pub fn cpu_usage_percent(previous: &CpuStat, current: &CpuStat) -> f64 {
    let idle_delta = current.idle_ticks() as f64 - previous.idle_ticks() as f64;
    let total_delta = current.total_ticks() as f64 - previous.total_ticks() as f64;

    if total_delta <= 0.0 {
        return 0.0;
    }

    round2(100.0 - idle_delta / total_delta * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stat(busy: u64, idle: u64) -> CpuStat {
        CpuStat {
            user: busy,
            idle,
            ..Default::default()
        }
    }

    #[test]
    fn test_cpu_usage_half_busy() {
        // idle 1000 / total 2000 -> idle 1500 / total 3000
        let prev = stat(1000, 1000);
        let curr = stat(1500, 1500);
        assert_eq!(cpu_usage_percent(&prev, &curr), 50.0);
    }

    #[test]
    fn test_cpu_usage_zero_total_delta() {
        let s = stat(1000, 1000);
        assert_eq!(cpu_usage_percent(&s, &s), 0.0);
    }

    #[test]
    fn test_cpu_usage_counter_reset_stays_in_range() {
        let prev = stat(5000, 100);
        let curr = stat(10, 10_000);
        let usage = cpu_usage_percent(&prev, &curr);
        assert!((0.0..=100.0).contains(&usage), "usage = {usage}");
    }

    #[test]
    fn test_cpu_usage_rounds_to_two_decimals() {
        let prev = stat(0, 0);
        let curr = stat(1, 2);
        assert_eq!(cpu_usage_percent(&prev, &curr), 33.33);
    }

    #[test]
    fn test_per_second() {
        assert_eq!(per_second(3000, 1000, 2.0), 1000.0);
        assert_eq!(per_second(1000, 3000, 2.0), -1000.0);
        assert_eq!(per_second(3000, 1000, 0.0), 0.0);
    }

    #[test]
    fn test_elapsed_secs_uses_capture_instants() {
        let t0 = Instant::now();
        let state = SamplerState::new((), t0);
        assert_eq!(state.elapsed_secs(t0 + Duration::from_millis(2500)), 2.5);
        assert_eq!(state.elapsed_secs(t0), 0.0);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(5, 0), 0.0);
    }
}
