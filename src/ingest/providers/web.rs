// src/ingest/providers/web.rs
//! Fixed list of URLs run through the extractor on every pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::WebCfg;
use crate::extract::{ContentKind, Extractor, Metadata};
use crate::ingest::types::{Connector, ConnectorBatch};

/// Left between this connector's own deadline and the outer fetch timeout,
/// so finished pages are handed back before the batch is cut off.
const DEADLINE_MARGIN: Duration = Duration::from_secs(1);

pub struct WebConnector {
    name: String,
    urls: Vec<String>,
    concurrency: usize,
    budget: Duration,
    extractor: Arc<Extractor>,
}

impl WebConnector {
    /// `fetch_timeout` is the bound the run puts on this connector.
    pub fn new(cfg: &WebCfg, extractor: Arc<Extractor>, fetch_timeout: Duration) -> Self {
        let budget = fetch_timeout
            .saturating_sub(DEADLINE_MARGIN)
            .max(fetch_timeout / 2);
        Self {
            name: cfg.name.clone(),
            urls: cfg.urls.clone(),
            concurrency: cfg.concurrency.max(1),
            budget,
            extractor,
        }
    }
}

enum PageOutcome {
    Extracted(Metadata),
    Invalid,
    Late,
}

#[async_trait]
impl Connector for WebConnector {
    fn name(&self) -> &str {
        &self.name
    }

    // Pages carry no reliable listing date, so the cursor is not applied;
    // dedup takes care of repeats.
    async fn fetch_candidates(&self, _since: Option<DateTime<Utc>>) -> ConnectorBatch {
        let deadline = Instant::now() + self.budget;
        let pages: Vec<_> = self
            .urls
            .iter()
            .map(|raw| async move {
                let outcome =
                    match tokio::time::timeout_at(deadline, self.extractor.extract(raw)).await {
                        Ok(Ok(meta)) => PageOutcome::Extracted(meta),
                        Ok(Err(e)) => {
                            warn!(target: "aggregation", url = %raw, error = %e, "bad configured url");
                            PageOutcome::Invalid
                        }
                        Err(_) => PageOutcome::Late,
                    };
                (raw, outcome)
            })
            .collect();
        let outcomes: Vec<(&String, PageOutcome)> = stream::iter(pages)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut items = Vec::with_capacity(outcomes.len());
        let mut bad: Vec<&str> = Vec::new();
        let mut late: Vec<&str> = Vec::new();
        for (raw, outcome) in outcomes {
            match outcome {
                PageOutcome::Extracted(meta) if meta.kind == ContentKind::Unknown => {
                    debug!(target: "aggregation", url = %raw, "skipping non-article url");
                }
                PageOutcome::Extracted(meta) => items.extend(meta.into_candidate()),
                PageOutcome::Invalid => bad.push(raw),
                PageOutcome::Late => late.push(raw),
            }
        }

        let mut problems = Vec::new();
        if !bad.is_empty() {
            problems.push(format!("invalid url(s): {}", bad.join(", ")));
        }
        if !late.is_empty() {
            problems.push(format!(
                "timed out after {}s: {}",
                self.budget.as_secs(),
                late.join(", ")
            ));
        }
        if problems.is_empty() {
            ConnectorBatch::ok(items)
        } else {
            ConnectorBatch::failed(items, problems.join("; "))
        }
    }
}
