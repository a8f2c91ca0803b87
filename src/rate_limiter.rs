//! Adaptive inter-call delay for the remote embedding provider (C3).
//!
//! Multiplicative-decrease on sustained success, exponential backoff on
//! rate-limited failures — see spec.md §4.3. A single-lane critical
//! section serializes state transitions, matching the bespoke,
//! hand-rolled-backoff idiom of `utils::retry` rather than pulling in an
//! external token-bucket crate: the AIMD law here is too specific (distinct
//! success-streak and rate-limited-only backoff rules) to be expressed with
//! a generic limiter.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MIN_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(120);
const SUCCESS_STREAK_THRESHOLD: u32 = 3;
const DECREASE_FACTOR: f64 = 0.8;

struct State {
    delay: Duration,
    success_streak: u32,
    last_call: Option<Instant>,
}

/// AIMD-style adaptive rate limiter, shared across all remote-embedding calls.
pub struct RateLimiter {
    state: Mutex<State>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                delay: INITIAL_DELAY,
                success_streak: 0,
                last_call: None,
            }),
        }
    }

    /// Sleep until at least `delay` has elapsed since the last call, then
    /// record this call's timestamp.
    pub async fn wait(&self) {
        let sleep_for = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let sleep_for = match state.last_call {
                Some(last) => {
                    let elapsed = now.duration_since(last);
                    state.delay.saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            state.last_call = Some(now);
            sleep_for
        };
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// Record a successful call. Three consecutive successes decrease the
    /// delay by 20%, clamped at the floor, and reset the streak.
    pub async fn notify_success(&self) {
        let mut state = self.state.lock().await;
        state.success_streak += 1;
        if state.success_streak >= SUCCESS_STREAK_THRESHOLD {
            state.delay = Duration::from_secs_f64(state.delay.as_secs_f64() * DECREASE_FACTOR)
                .max(MIN_DELAY);
            state.success_streak = 0;
        }
    }

    /// Record a failed call. Any failure resets the success streak; a
    /// rate-limited failure additionally doubles the delay plus one second,
    /// clamped at the ceiling. Non-429 failures leave the delay unchanged.
    pub async fn notify_failure(&self, rate_limited: bool) {
        let mut state = self.state.lock().await;
        state.success_streak = 0;
        if rate_limited {
            state.delay = (state.delay * 2 + Duration::from_secs(1)).min(MAX_DELAY);
        }
    }

    #[cfg(test)]
    async fn current_delay(&self) -> Duration {
        self.state.lock().await.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn three_successes_strictly_decrease_delay() {
        let limiter = RateLimiter::new();
        let before = limiter.current_delay().await;
        limiter.notify_success().await;
        limiter.notify_success().await;
        limiter.notify_success().await;
        let after = limiter.current_delay().await;
        assert!(after <= before);
        assert!(after >= MIN_DELAY);
    }

    #[tokio::test]
    async fn decrease_never_crosses_floor() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            limiter.notify_success().await;
            limiter.notify_success().await;
            limiter.notify_success().await;
        }
        assert_eq!(limiter.current_delay().await, MIN_DELAY);
    }

    #[tokio::test]
    async fn rate_limited_failure_increases_delay() {
        let limiter = RateLimiter::new();
        let before = limiter.current_delay().await;
        limiter.notify_failure(true).await;
        let after = limiter.current_delay().await;
        assert!(after > before);
    }

    #[tokio::test]
    async fn increase_never_crosses_ceiling() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            limiter.notify_failure(true).await;
        }
        assert_eq!(limiter.current_delay().await, MAX_DELAY);
    }

    #[tokio::test]
    async fn non_rate_limited_failure_leaves_delay_unchanged_but_resets_streak() {
        let limiter = RateLimiter::new();
        limiter.notify_success().await;
        limiter.notify_success().await;
        let before = limiter.current_delay().await;
        limiter.notify_failure(false).await;
        let after = limiter.current_delay().await;
        assert_eq!(before, after);

        // Streak was reset: two more successes should not yet trigger a decrease.
        limiter.notify_success().await;
        limiter.notify_success().await;
        assert_eq!(limiter.current_delay().await, before);
    }
}
