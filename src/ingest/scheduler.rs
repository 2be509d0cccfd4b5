// src/ingest/scheduler.rs
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::ScheduleCfg;
use crate::coordinator::RunCoordinator;
use crate::error::TriggerError;
use crate::history::RunLog;

/// Fires once a day at `at` local time in a fixed UTC offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailySchedule {
    pub at: NaiveTime,
    pub offset: FixedOffset,
}

impl DailySchedule {
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    pub fn from_cfg(cfg: &ScheduleCfg) -> Self {
        Self::new(cfg.daily_time(), cfg.offset())
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let local_today = (now + shift).date_naive();
        let fire_today = (local_today.and_time(self.at) - shift).and_utc();
        if fire_today > now {
            fire_today
        } else {
            fire_today + Duration::days(1)
        }
    }

    pub fn describe(&self) -> String {
        format!("Daily at {} (UTC{})", self.at.format("%H:%M"), self.offset)
    }
}

/// Sleep until the next slot and fire one scheduled run.
pub async fn run_next(
    coordinator: &RunCoordinator,
    schedule: &DailySchedule,
    clock: &dyn Clock,
) -> Option<RunLog> {
    let now = clock.now();
    let next = schedule.next_after(now);
    let wait = (next - now).to_std().unwrap_or_default();
    info!(target: "aggregation", next = %next, wait_secs = wait.as_secs(), "next scheduled run");
    clock.sleep(wait).await;

    match coordinator.trigger_run(false).await {
        Ok(log) => Some(log),
        Err(TriggerError::AlreadyRunning) => {
            warn!(target: "aggregation", "scheduled run skipped; a run is already in progress");
            None
        }
    }
}

pub fn spawn_daily_scheduler(
    coordinator: Arc<RunCoordinator>,
    schedule: DailySchedule,
    clock: Arc<dyn Clock>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(target: "aggregation", schedule = %schedule.describe(), "daily scheduler started");
        loop {
            run_next(&coordinator, &schedule, clock.as_ref()).await;
        }
    })
}
