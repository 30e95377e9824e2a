use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Draws randomized election timeouts uniformly from `[min, max)`.
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
    rng: StdRng,
}

impl ElectionTimer {
    pub fn new(min_ms: u64, max_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { min_ms, max_ms, rng }
    }

    pub fn next_timeout(&mut self) -> Duration {
        let timeout_ms = self.rng.random_range(self.min_ms..self.max_ms);
        Duration::from_millis(timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_stay_within_range() {
        let mut timer = ElectionTimer::new(150, 300, None);
        for _ in 0..1000 {
            let t = timer.next_timeout();
            assert!(t >= Duration::from_millis(150));
            assert!(t < Duration::from_millis(300));
        }
    }

    #[test]
    fn same_seed_gives_same_sequence() {
        let mut a = ElectionTimer::new(150, 300, Some(7));
        let mut b = ElectionTimer::new(150, 300, Some(7));
        let xs: Vec<_> = (0..16).map(|_| a.next_timeout()).collect();
        let ys: Vec<_> = (0..16).map(|_| b.next_timeout()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn draws_are_not_constant() {
        let mut timer = ElectionTimer::new(150, 300, Some(42));
        let first = timer.next_timeout();
        assert!((0..64).any(|_| timer.next_timeout() != first));
    }
}
