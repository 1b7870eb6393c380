//! Per-player paddle input throttle.
//!
//! At most one accepted action per player per window; anything arriving
//! earlier is dropped, not queued.

use std::time::Duration;

use super::state::Side;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval_ms: u64,
    last_accepted: [Option<u64>; 2],
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            last_accepted: [None, None],
        }
    }

    /// `true` if `side` may act at `now_ms`; records the acceptance.
    pub fn try_acquire(&mut self, side: Side, now_ms: u64) -> bool {
        let slot = &mut self.last_accepted[side_index(side)];
        match *slot {
            Some(last) if now_ms.saturating_sub(last) < self.interval_ms => false,
            _ => {
                *slot = Some(now_ms);
                true
            }
        }
    }
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Player1 => 0,
        Side::Player2 => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_action_inside_window_is_dropped() {
        let mut limiter = RateLimiter::new(Duration::from_millis(16));
        assert!(limiter.try_acquire(Side::Player1, 1_000));
        assert!(!limiter.try_acquire(Side::Player1, 1_010));
        assert!(limiter.try_acquire(Side::Player1, 1_016));
    }

    #[test]
    fn sides_are_throttled_independently() {
        let mut limiter = RateLimiter::new(Duration::from_millis(16));
        assert!(limiter.try_acquire(Side::Player1, 0));
        assert!(limiter.try_acquire(Side::Player2, 0));
        assert!(!limiter.try_acquire(Side::Player2, 5));
    }
}
