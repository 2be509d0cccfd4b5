//! history.rs: run logs and the bounded in-memory history behind `/aggregation/logs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::ingest::{SourceOutcome, SourceResult};

/// Record of one finished run. Built once at the end of the run and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLog {
    /// Run start.
    pub date: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub manual: bool,
    pub per_source_results: Vec<SourceResult>,
    /// Sum of `count` over successful connectors only.
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub duplicates_skipped: usize,
    pub duration_ms: u64,
}

impl RunLog {
    pub fn from_outcomes(
        date: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        manual: bool,
        outcomes: &[SourceOutcome],
    ) -> Self {
        let per_source_results: Vec<SourceResult> =
            outcomes.iter().map(|o| o.result.clone()).collect();
        let success_count = per_source_results.iter().filter(|r| r.success).count();
        let total_items = per_source_results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.count)
            .sum();

        Self {
            date,
            finished_at,
            manual,
            failure_count: per_source_results.len() - success_count,
            success_count,
            total_items,
            duplicates_skipped: outcomes.iter().map(|o| o.duplicates).sum(),
            duration_ms: (finished_at - date).num_milliseconds().max(0) as u64,
            per_source_results,
        }
    }
}

/// Most recent `cap` logs; pushing past the cap evicts the oldest.
/// Not synchronized on its own: the coordinator keeps it under its state lock.
#[derive(Debug, Clone)]
pub struct RunHistory {
    logs: VecDeque<RunLog>,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            logs: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, log: RunLog) {
        self.logs.push_back(log);
        while self.logs.len() > self.cap {
            self.logs.pop_front();
        }
    }

    pub fn newest_first(&self) -> Vec<RunLog> {
        self.logs.iter().rev().cloned().collect()
    }

    pub fn latest(&self) -> Option<&RunLog> {
        self.logs.back()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn outcome(name: &str, success: bool, count: usize, duplicates: usize) -> SourceOutcome {
        SourceOutcome {
            result: SourceResult {
                platform: name.into(),
                success,
                count,
                error: (!success).then(|| "boom".to_string()),
            },
            duplicates,
        }
    }

    fn log_at(minute: u32) -> RunLog {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 11, minute, 0).unwrap();
        RunLog::from_outcomes(t, t, false, &[])
    }

    #[test]
    fn totals_count_successful_connectors_only() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        let log = RunLog::from_outcomes(
            start,
            start + Duration::milliseconds(1500),
            true,
            &[
                outcome("a", true, 3, 0),
                outcome("b", false, 2, 1),
                outcome("c", true, 1, 1),
            ],
        );
        assert_eq!(log.total_items, 4);
        assert_eq!(log.success_count, 2);
        assert_eq!(log.failure_count, 1);
        assert_eq!(log.duplicates_skipped, 2);
        assert_eq!(log.duration_ms, 1500);
        assert!(log.manual);
    }

    #[test]
    fn empty_run_is_still_a_log() {
        let log = log_at(0);
        assert_eq!(log.total_items, 0);
        assert_eq!(log.success_count + log.failure_count, 0);
    }

    #[test]
    fn history_evicts_oldest() {
        let mut h = RunHistory::with_capacity(2);
        h.push(log_at(1));
        h.push(log_at(2));
        h.push(log_at(3));
        assert_eq!(h.len(), 2);
        let logs = h.newest_first();
        assert_eq!(logs[0].date.format("%M").to_string(), "03");
        assert_eq!(logs[1].date.format("%M").to_string(), "02");
        assert_eq!(h.latest(), Some(&logs[0]));
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(log_at(5)).unwrap();
        assert!(v.get("perSourceResults").is_some());
        assert!(v.get("totalItems").is_some());
        assert!(v.get("durationMs").is_some());
    }
}
