// src/clock.rs
//! Time source used by retries, the ingestor and the coordinator.
//! `ManualClock` lets tests advance time without really sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

// --- Test helper ---

/// Virtual clock: `sleep` returns immediately, advances `now` and records the delay.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    pub sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, d: chrono::Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += d;
    }

    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("clock mutex poisoned").clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }

    async fn sleep(&self, d: Duration) {
        self.sleeps.lock().expect("clock mutex poisoned").push(d);
        let step = chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero());
        self.advance(step);
    }
}
