use std::time::Duration;

use pagewatch_common::MAX_INTERVAL_MINUTES;
use rand::Rng;

/// First-run offset for site `index` of `count`: an even share of `window`
/// plus up to `jitter` of noise.
pub fn initial_offset<R: Rng + ?Sized>(
    index: usize,
    count: usize,
    window: Duration,
    jitter: Duration,
    rng: &mut R,
) -> Duration {
    let share = if count == 0 {
        Duration::ZERO
    } else {
        window * index as u32 / count as u32
    };
    share + random_up_to(jitter, rng)
}

/// Delay until the next run: uniform in `[check_min, check_max]` minutes.
///
/// Bounds are clamped to `[0, MAX_INTERVAL_MINUTES]`; a non-finite bound
/// counts as the cap.
pub fn next_delay<R: Rng + ?Sized>(check_min: f64, check_max: f64, rng: &mut R) -> Duration {
    let lo = clamp_minutes(check_min);
    let hi = clamp_minutes(check_max);
    let minutes = if hi > lo {
        rng.random_range(lo..=hi)
    } else {
        lo
    };
    Duration::try_from_secs_f64(minutes * 60.0).unwrap_or(MAX_DELAY)
}

const MAX_DELAY: Duration = Duration::from_secs(MAX_INTERVAL_MINUTES as u64 * 60);

fn clamp_minutes(minutes: f64) -> f64 {
    if minutes.is_finite() {
        minutes.clamp(0.0, MAX_INTERVAL_MINUTES)
    } else {
        MAX_INTERVAL_MINUTES
    }
}

fn random_up_to<R: Rng + ?Sized>(max: Duration, rng: &mut R) -> Duration {
    if max.is_zero() {
        Duration::ZERO
    } else {
        max.mul_f64(rng.random_range(0.0..=1.0))
    }
}
