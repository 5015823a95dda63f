//! Retry pacing.
//!
//! Pacing is a flat interval with bounded jitter rather than exponential
//! backoff: every client competing for the same pool retries on roughly the
//! same cadence, and jitter keeps them from doing it in lockstep.

use std::time::Duration;

use rand::Rng;

/// Lowest delay a computed retry may ever have, regardless of configuration.
pub const MIN_FLOOR: Duration = Duration::from_secs(60);

/// Default base interval between ticks.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default jitter half-range.
pub const DEFAULT_JITTER_RANGE: Duration = Duration::from_secs(2 * 60);

/// Retry pacing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    base_interval: Duration,
    jitter_range: Duration,
    min_floor: Duration,
    startup_jitter: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_INTERVAL, DEFAULT_JITTER_RANGE)
    }
}

impl RetryPolicy {
    /// Create a policy with the given base interval and jitter half-range.
    ///
    /// The floor is always [`MIN_FLOOR`].
    pub fn new(base_interval: Duration, jitter_range: Duration) -> Self {
        Self {
            base_interval,
            jitter_range,
            min_floor: MIN_FLOOR,
            startup_jitter: None,
        }
    }

    /// Delay the first tick by up to `ceiling`. A zero ceiling disables it.
    pub fn with_startup_jitter(mut self, ceiling: Duration) -> Self {
        self.startup_jitter = (!ceiling.is_zero()).then_some(ceiling);
        self
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn jitter_range(&self) -> Duration {
        self.jitter_range
    }

    pub fn min_floor(&self) -> Duration {
        self.min_floor
    }

    pub fn startup_jitter(&self) -> Option<Duration> {
        self.startup_jitter
    }

    /// Smallest and largest delay this policy can produce.
    pub fn bounds(&self) -> (Duration, Duration) {
        (self.delay_for_draw(0.0), self.delay_for_draw(1.0))
    }

    /// Draw the delay before the next tick.
    pub fn compute_delay(&self) -> Duration {
        self.compute_delay_with_rng(&mut rand::rng())
    }

    /// Draw the delay before the next tick with a caller-provided RNG.
    pub fn compute_delay_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter = millis(self.jitter_range);
        let offset = rng.random_range(-jitter..=jitter);
        self.delay_with_offset(offset)
    }

    /// Delay for a uniform draw `r` in `[0, 1]`: 0 maps to `base - jitter`,
    /// 1 to `base + jitter`. Out-of-range draws are clamped.
    pub fn delay_for_draw(&self, r: f64) -> Duration {
        let r = if r.is_nan() { 0.5 } else { r.clamp(0.0, 1.0) };
        let jitter = millis(self.jitter_range) as f64;
        let offset = ((2.0 * r - 1.0) * jitter).round() as i128;
        self.delay_with_offset(offset)
    }

    /// Draw the one-time delay before the first tick.
    pub fn startup_delay(&self) -> Duration {
        self.startup_delay_with_rng(&mut rand::rng())
    }

    pub fn startup_delay_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match self.startup_jitter {
            Some(ceiling) => {
                let ceiling = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(rng.random_range(0..=ceiling))
            }
            None => Duration::ZERO,
        }
    }

    fn delay_with_offset(&self, offset_ms: i128) -> Duration {
        let delay = (millis(self.base_interval) + offset_ms).max(millis(self.min_floor));
        Duration::from_millis(u64::try_from(delay).unwrap_or(u64::MAX))
    }
}

fn millis(duration: Duration) -> i128 {
    i128::try_from(duration.as_millis()).unwrap_or(i128::MAX / 4)
}

/// Count of reconciliation ticks since process start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter(u64);

impl AttemptCounter {
    /// Record a new tick and return its 1-based number.
    pub fn advance(&mut self) -> u64 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_draw_maps_onto_jitter_window() {
        let policy = RetryPolicy::new(ms(300_000), ms(120_000));

        assert_eq!(policy.delay_for_draw(0.5), ms(300_000));
        assert_eq!(policy.delay_for_draw(0.0), ms(180_000));
        assert_eq!(policy.delay_for_draw(1.0), ms(420_000));
        assert_eq!(policy.bounds(), (ms(180_000), ms(420_000)));
    }

    #[test]
    fn test_floor_applies_to_misconfigured_interval() {
        let policy = RetryPolicy::new(ms(1_000), ms(500));
        assert_eq!(policy.delay_for_draw(0.0), MIN_FLOOR);
        assert_eq!(policy.delay_for_draw(1.0), MIN_FLOOR);

        let zero = RetryPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(zero.compute_delay(), MIN_FLOOR);
    }

    #[test]
    fn test_floor_is_not_configurable() {
        let policy = RetryPolicy::new(ms(90_000), ms(60_000));
        assert_eq!(policy.min_floor(), MIN_FLOOR);
        // 90s - 60s would be 30s; clamped.
        assert_eq!(policy.delay_for_draw(0.0), MIN_FLOOR);
        assert_eq!(policy.delay_for_draw(1.0), ms(150_000));
    }

    #[test]
    fn test_out_of_range_draws_are_clamped() {
        let policy = RetryPolicy::new(ms(300_000), ms(120_000));
        assert_eq!(policy.delay_for_draw(-3.0), ms(180_000));
        assert_eq!(policy.delay_for_draw(7.0), ms(420_000));
        assert_eq!(policy.delay_for_draw(f64::NAN), ms(300_000));
    }

    #[test]
    fn test_seeded_rng_stays_in_window() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1_000 {
            let delay = policy.compute_delay_with_rng(&mut rng);
            assert!(delay >= ms(180_000));
            assert!(delay <= ms(420_000));
        }
    }

    #[test]
    fn test_startup_jitter_disabled_by_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.startup_jitter(), None);
        assert_eq!(policy.startup_delay(), Duration::ZERO);

        let zero = RetryPolicy::default().with_startup_jitter(Duration::ZERO);
        assert_eq!(zero.startup_jitter(), None);
    }

    #[test]
    fn test_startup_jitter_within_ceiling() {
        let policy = RetryPolicy::default().with_startup_jitter(ms(180_000));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert!(policy.startup_delay_with_rng(&mut rng) <= ms(180_000));
        }
    }

    #[test]
    fn test_attempt_counter_is_monotonic() {
        let mut counter = AttemptCounter::default();
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.advance(), 1);
        assert_eq!(counter.advance(), 2);
        assert_eq!(counter.get(), 2);
    }

    proptest! {
        #[test]
        fn prop_delay_within_bounds(
            base in 0u64..10_000_000,
            jitter in 0u64..10_000_000,
            r in 0.0f64..=1.0,
        ) {
            let policy = RetryPolicy::new(ms(base), ms(jitter));
            let delay = policy.delay_for_draw(r);
            let lower = MIN_FLOOR.max(ms(base.saturating_sub(jitter)));
            let upper = MIN_FLOOR.max(ms(base + jitter));
            prop_assert!(delay >= lower);
            prop_assert!(delay <= upper);
        }

        #[test]
        fn prop_random_delay_never_below_floor(
            base in 0u64..10_000_000,
            jitter in 0u64..10_000_000,
            seed in any::<u64>(),
        ) {
            let policy = RetryPolicy::new(ms(base), ms(jitter));
            let mut rng = StdRng::seed_from_u64(seed);
            let delay = policy.compute_delay_with_rng(&mut rng);
            prop_assert!(delay >= MIN_FLOOR);
            prop_assert!(delay <= MIN_FLOOR.max(ms(base + jitter)));
        }
    }
}
