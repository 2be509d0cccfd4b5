// src/coordinator.rs
//! Single-flight run coordinator.
//!
//! `is_running`, the run history, the aggregate stats and the per-connector
//! cursors all live behind one mutex. The lock is taken twice per run: to
//! claim the run and to publish its log. Nothing awaits while holding it.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{AggregationConfig, RunCfg};
use crate::error::TriggerError;
use crate::extract::fetch::PageFetcher;
use crate::extract::Extractor;
use crate::history::{RunHistory, RunLog};
use crate::ingest::dedup::{Deduplicator, RunSeen};
use crate::ingest::ingestor::{Ingestor, QualityPolicy};
use crate::ingest::providers::build_connectors;
use crate::ingest::scheduler::DailySchedule;
use crate::ingest::types::Connector;
use crate::ingest::{connector_keys, ensure_metrics_described, fetch_all, ingest_batch};
use crate::store::ContentStore;

pub const MANUAL_ONLY: &str = "Manual trigger only";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run_description: String,
    pub total_runs: u64,
    pub average_items_per_run: f64,
    pub current_run_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct CoordinatorState {
    status: SchedulerStatus,
    history: RunHistory,
    cursors: HashMap<String, DateTime<Utc>>,
    total_items_all: u64,
}

/// Clears the running flag if a run ends without publishing its log
/// (panic in a connector, or the run future being dropped).
struct RunningGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
    armed: bool,
}

impl RunningGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // never panic inside drop, even on a poisoned lock
        let mut st = match self.state.lock() {
            Ok(st) => st,
            Err(poisoned) => poisoned.into_inner(),
        };
        st.status.is_running = false;
        st.status.current_run_started_at = None;
        warn!(target: "aggregation", "run aborted before completion; running flag cleared");
    }
}

pub struct RunCoordinator {
    connectors: Vec<Arc<dyn Connector>>,
    /// Unique per connector; names the run-log line and the cursor.
    keys: Vec<String>,
    store: Arc<dyn ContentStore>,
    ingestor: Ingestor,
    dedup: Deduplicator,
    clock: Arc<dyn Clock>,
    connector_timeout: Duration,
    state: Mutex<CoordinatorState>,
}

impl RunCoordinator {
    pub fn new(
        connectors: Vec<Arc<dyn Connector>>,
        store: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
        run: &RunCfg,
        policy: QualityPolicy,
        next_run_description: impl Into<String>,
    ) -> Self {
        ensure_metrics_described();
        let connector_timeout = run.connector_timeout();
        Self {
            ingestor: Ingestor::new(store.clone(), clock.clone(), policy),
            dedup: Deduplicator::new(run.dedup_lookback_days, run.title_similarity),
            keys: connector_keys(&connectors),
            connectors,
            store,
            clock,
            connector_timeout,
            state: Mutex::new(CoordinatorState {
                status: SchedulerStatus {
                    is_running: false,
                    last_run: None,
                    next_run_description: next_run_description.into(),
                    total_runs: 0,
                    average_items_per_run: 0.0,
                    current_run_started_at: None,
                },
                history: RunHistory::with_capacity(run.log_retention),
                cursors: HashMap::new(),
                total_items_all: 0,
            }),
        }
    }

    /// Wire every configured source into a coordinator.
    pub fn from_config(
        cfg: &AggregationConfig,
        store: Arc<dyn ContentStore>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<Extractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let connectors = build_connectors(cfg, fetcher, extractor);
        let next = if cfg.schedule.enabled {
            DailySchedule::from_cfg(&cfg.schedule).describe()
        } else {
            MANUAL_ONLY.to_string()
        };
        info!(
            target: "aggregation",
            connectors = connectors.len(),
            schedule = %next,
            "coordinator ready"
        );
        Self::new(
            connectors,
            store,
            clock,
            &cfg.run,
            QualityPolicy::from(&cfg.quality),
            next,
        )
    }

    pub fn connector_names(&self) -> Vec<String> {
        self.keys.clone()
    }

    /// Run every connector once. Rejected with `AlreadyRunning` while another
    /// run is in flight; otherwise always yields a log, even if every
    /// connector failed.
    pub async fn trigger_run(&self, manual: bool) -> Result<RunLog, TriggerError> {
        let started = self.clock.now();
        let cursors = {
            let mut st = self.state.lock().expect("coordinator mutex poisoned");
            if st.status.is_running {
                info!(target: "aggregation", manual, "trigger rejected; run in progress");
                return Err(TriggerError::AlreadyRunning);
            }
            st.status.is_running = true;
            st.status.current_run_started_at = Some(started);
            st.cursors.clone()
        };
        let guard = RunningGuard {
            state: &self.state,
            armed: true,
        };

        info!(
            target: "aggregation",
            manual,
            connectors = self.connectors.len(),
            "run started"
        );

        let fetched = fetch_all(&self.connectors, &self.keys, &cursors, self.connector_timeout).await;

        // Ingest sequentially so in-run dedup sees every earlier acceptance.
        let mut seen = RunSeen::default();
        let mut outcomes = Vec::with_capacity(fetched.len());
        for (name, batch) in fetched {
            let now = self.clock.now();
            outcomes.push(
                ingest_batch(
                    &name,
                    batch,
                    &self.dedup,
                    &self.ingestor,
                    self.store.as_ref(),
                    &mut seen,
                    now,
                )
                .await,
            );
        }

        let finished = self.clock.now();
        let log = RunLog::from_outcomes(started, finished, manual, &outcomes);
        self.finalize(&log);
        guard.disarm();

        counter!("aggregation_runs_total").increment(1);
        histogram!("aggregation_run_ms").record(log.duration_ms as f64);
        gauge!("aggregation_last_run_ts").set(finished.timestamp() as f64);
        info!(
            target: "aggregation",
            manual,
            total_items = log.total_items,
            success = log.success_count,
            failed = log.failure_count,
            duplicates = log.duplicates_skipped,
            ms = log.duration_ms,
            "run finished"
        );
        Ok(log)
    }

    fn finalize(&self, log: &RunLog) {
        let mut st = self.state.lock().expect("coordinator mutex poisoned");
        for r in log.per_source_results.iter().filter(|r| r.success) {
            st.cursors.insert(r.platform.clone(), log.date);
        }
        st.total_items_all += log.total_items as u64;
        st.status.total_runs += 1;
        st.status.average_items_per_run = st.total_items_all as f64 / st.status.total_runs as f64;
        st.status.last_run = Some(log.finished_at);
        st.history.push(log.clone());
        st.status.is_running = false;
        st.status.current_run_started_at = None;
    }

    pub fn status(&self) -> SchedulerStatus {
        self.state
            .lock()
            .expect("coordinator mutex poisoned")
            .status
            .clone()
    }

    /// Newest first.
    pub fn logs(&self) -> Vec<RunLog> {
        self.state
            .lock()
            .expect("coordinator mutex poisoned")
            .history
            .newest_first()
    }

    pub fn latest_log(&self) -> Option<RunLog> {
        self.state
            .lock()
            .expect("coordinator mutex poisoned")
            .history
            .latest()
            .cloned()
    }

    pub fn cursor_for(&self, connector: &str) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .expect("coordinator mutex poisoned")
            .cursors
            .get(connector)
            .copied()
    }
}
