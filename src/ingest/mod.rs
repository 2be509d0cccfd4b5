// src/ingest/mod.rs
pub mod dedup;
pub mod ingestor;
pub mod providers;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::content::ContentCandidate;
use crate::store::{ContentStore, UpsertOutcome};
use dedup::{Deduplicator, RunSeen};
use ingestor::Ingestor;
use types::{Connector, ConnectorBatch};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregation_runs_total", "Aggregation runs completed.");
        describe_counter!(
            "aggregation_items_ingested_total",
            "New content records written by the ingestor."
        );
        describe_counter!(
            "aggregation_duplicates_total",
            "Candidates dropped as duplicates."
        );
        describe_counter!(
            "aggregation_connector_errors_total",
            "Connector fetch failures (including timeouts)."
        );
        describe_counter!(
            "aggregation_ingest_errors_total",
            "Candidates that failed to persist."
        );
        describe_counter!("extract_attempts_total", "Outbound extraction fetches.");
        describe_counter!(
            "extract_fallback_total",
            "Extractions that returned fallback metadata."
        );
        describe_histogram!("aggregation_run_ms", "Run duration in milliseconds.");
        describe_gauge!(
            "aggregation_last_run_ts",
            "Unix ts when the last aggregation run finished."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect::<String>().trim_end().to_string();
    }

    out
}

/// Dedup key for titles: lowercase alphanumerics separated by single spaces.
pub fn normalize_title_key(title: &str) -> String {
    let decoded = normalize_text(title, usize::MAX).to_lowercase();
    decoded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-connector line of a run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    /// Connector name.
    pub platform: String,
    pub success: bool,
    /// New records written for this connector.
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub result: SourceResult,
    pub duplicates: usize,
}

/// `base`, or `base#2`, `base#3`, ... when already taken. Records the result in `taken`.
pub fn unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    let mut name = base.to_string();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{base}#{n}");
        n += 1;
    }
    taken.insert(name.clone());
    name
}

/// Run-log and cursor key for each connector, in order. Two connectors
/// never share a key, so one cannot advance the other's cursor.
pub fn connector_keys(connectors: &[Arc<dyn Connector>]) -> Vec<String> {
    let mut taken = HashSet::new();
    connectors
        .iter()
        .map(|c| unique_name(&mut taken, c.name()))
        .collect()
}

/// Fetch every connector concurrently, each bounded by `timeout`.
/// `keys` runs parallel to `connectors` (see [`connector_keys`]).
/// Results come back in connector order.
pub async fn fetch_all(
    connectors: &[Arc<dyn Connector>],
    keys: &[String],
    cursors: &HashMap<String, DateTime<Utc>>,
    timeout: Duration,
) -> Vec<(String, ConnectorBatch)> {
    let tasks = connectors.iter().zip(keys).map(|(c, key)| {
        let since = cursors.get(key).copied();
        async move {
            let t0 = Instant::now();
            let batch = match tokio::time::timeout(timeout, c.fetch_candidates(since)).await {
                Ok(b) => b,
                Err(_) => ConnectorBatch::failed(
                    Vec::new(),
                    format!("timed out after {}s", timeout.as_secs()),
                ),
            };
            if let Some(err) = &batch.error {
                counter!("aggregation_connector_errors_total").increment(1);
                warn!(
                    target: "aggregation",
                    connector = %key,
                    items = batch.items.len(),
                    error = %err,
                    "connector failed"
                );
            } else {
                debug!(
                    target: "aggregation",
                    connector = %key,
                    items = batch.items.len(),
                    ms = t0.elapsed().as_millis() as u64,
                    "connector fetched"
                );
            }
            (key.clone(), batch)
        }
    });
    join_all(tasks).await
}

/// Dedup and persist one connector's batch. Never fails: storage errors are
/// folded into the returned result.
pub async fn ingest_batch(
    name: &str,
    batch: ConnectorBatch,
    dedup: &Deduplicator,
    ingestor: &Ingestor,
    store: &dyn ContentStore,
    seen: &mut RunSeen,
    now: DateTime<Utc>,
) -> SourceOutcome {
    let mut count = 0usize;
    let mut duplicates = 0usize;
    let mut ingest_errors: Vec<String> = Vec::new();

    for candidate in batch.items {
        match dedup.is_duplicate(&candidate, store, seen, now).await {
            Ok(true) => {
                duplicates += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                ingest_errors.push(e.to_string());
                continue;
            }
        }

        match ingestor.ingest(candidate.clone()).await {
            Ok((_, UpsertOutcome::Inserted)) => {
                count += 1;
                seen.accept(&candidate);
            }
            Ok((_, UpsertOutcome::Touched)) => {
                duplicates += 1;
                seen.accept(&candidate);
            }
            Err(e) => {
                counter!("aggregation_ingest_errors_total").increment(1);
                warn!(
                    target: "aggregation",
                    connector = name,
                    url = %candidate_url(&candidate),
                    error = %e,
                    "ingest failed"
                );
                ingest_errors.push(e.to_string());
            }
        }
    }

    counter!("aggregation_items_ingested_total").increment(count as u64);
    counter!("aggregation_duplicates_total").increment(duplicates as u64);

    let error = match (batch.error, ingest_errors.is_empty()) {
        (None, true) => None,
        (fetch_err, _) => {
            let mut parts: Vec<String> = fetch_err.into_iter().collect();
            if !ingest_errors.is_empty() {
                parts.push(format!(
                    "{} item(s) failed to ingest: {}",
                    ingest_errors.len(),
                    ingest_errors[0]
                ));
            }
            Some(parts.join("; "))
        }
    };

    info!(
        target: "aggregation",
        connector = name,
        count,
        duplicates,
        failed = error.is_some(),
        "connector ingested"
    );

    SourceOutcome {
        result: SourceResult {
            platform: name.to_string(),
            success: error.is_none(),
            count,
            error,
        },
        duplicates,
    }
}

fn candidate_url(c: &ContentCandidate) -> &str {
    &c.meta().original_url
}
