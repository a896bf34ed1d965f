//! ## lyssna-orchestrator::backoff
//! **Capped exponential backoff with uniform jitter**
//!
//! `delay(n) = min(cap, floor * 2^n) + U[0, delay * jitter_ratio]`
//!
//! Each instance seeds its own generator from OS entropy so that endpoints,
//! and separate runs of the application, do not retry in lockstep.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use lyssna_config::BackoffConfig;

#[derive(Debug)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    jitter_ratio: f64,
    attempt: u32,
    rng: SmallRng,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self::with_rng(config, SmallRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic sequence for a given seed.
    pub fn seeded(config: &BackoffConfig, seed: u64) -> Self {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: &BackoffConfig, rng: SmallRng) -> Self {
        let floor = config.floor();
        Self {
            floor,
            cap: config.cap().max(floor),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
            attempt: 0,
            rng,
        }
    }

    /// Delay before the next attempt. Never below the floor.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let base = self.floor.saturating_mul(factor).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);

        let max_jitter_ms = (base.as_millis() as f64 * self.jitter_ratio) as u64;
        let jitter_ms = if max_jitter_ms == 0 {
            0
        } else {
            self.rng.random_range(0..=max_jitter_ms)
        };
        base + Duration::from_millis(jitter_ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(floor_ms: u64, cap_ms: u64, jitter_ratio: f64) -> BackoffConfig {
        BackoffConfig {
            floor_ms,
            cap_ms,
            jitter_ratio,
        }
    }

    #[test]
    fn doubles_until_cap_without_jitter() {
        let mut backoff = Backoff::new(&config(100, 1_000, 0.0));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, [100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let mut backoff = Backoff::seeded(&config(1_000, 60_000, 0.2), 7);
        for attempt in 0..10u32 {
            let base = Duration::from_millis(1_000 * 2u64.pow(attempt)).min(Duration::from_secs(60));
            let delay = backoff.next_delay();
            assert!(delay >= base, "attempt {attempt}: {delay:?} < {base:?}");
            assert!(delay <= base.mul_f64(1.2), "attempt {attempt}: {delay:?} too large");
        }
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = Backoff::new(&config(50, 500, 0.0));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let mut backoff = Backoff::new(&config(1, 10, 0.5));
        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(1));
            assert!(delay <= Duration::from_millis(15));
        }
    }
}
