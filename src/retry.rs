// src/retry.rs
//! Bounded retry with exponential backoff.
//!
//! The policy is pure data: `delay_after(n)` gives the pause following the
//! n-th failed attempt (1-based), i.e. `base * 2^n`. `run` drives an attempt
//! closure through a [`Clock`], so tests can count attempts and delays
//! without touching the network or sleeping for real.

use std::future::Future;
use std::time::Duration;

use crate::clock::Clock;

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T, E> {
    Done(T),
    /// Transient failure; try again if attempts remain.
    Retry(E),
    /// Terminal failure; stop immediately.
    Fail(E),
}

/// Why `run` gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
    /// True when the last failure was terminal rather than out of attempts.
    pub terminal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    /// 3 attempts total, pauses of 2s then 4s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
        }
    }

    /// Pause after the `attempt`-th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    pub async fn run<T, E, F, Fut>(&self, clock: &dyn Clock, mut op: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op(attempt).await {
                Attempt::Done(v) => return Ok(v),
                Attempt::Fail(e) => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                        terminal: true,
                    })
                }
                Attempt::Retry(e) => {
                    if attempt >= max {
                        return Err(Exhausted {
                            attempts: attempt,
                            last_error: e,
                            terminal: false,
                        });
                    }
                    clock.sleep(self.delay_after(attempt)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn clock() -> ManualClock {
        ManualClock::new(chrono::Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap())
    }

    #[test]
    fn delays_double() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
        assert_eq!(p.delay_after(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn retries_until_exhausted() {
        let c = clock();
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = RetryPolicy::default()
            .run(&c, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Retry("boom") }
            })
            .await;
        let err = res.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(!err.terminal);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            c.recorded_sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn terminal_stops_immediately() {
        let c = clock();
        let res: Result<(), _> = RetryPolicy::default()
            .run(&c, |_| async { Attempt::Fail(404) })
            .await;
        let err = res.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(err.terminal);
        assert!(c.recorded_sleeps().is_empty());
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let c = clock();
        let res = RetryPolicy::default()
            .run(&c, |n| async move {
                if n == 1 {
                    Attempt::Retry("flaky")
                } else {
                    Attempt::Done(n)
                }
            })
            .await;
        assert_eq!(res, Ok(2));
        assert_eq!(c.recorded_sleeps(), vec![Duration::from_secs(2)]);
    }
}
