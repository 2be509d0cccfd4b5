// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::content::ContentCandidate;

/// What one connector produced for a run. A failure part-way through still
/// keeps the items fetched before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorBatch {
    pub items: Vec<ContentCandidate>,
    pub error: Option<String>,
}

impl ConnectorBatch {
    pub fn ok(items: Vec<ContentCandidate>) -> Self {
        Self { items, error: None }
    }

    pub fn failed(items: Vec<ContentCandidate>, error: impl Into<String>) -> Self {
        Self {
            items,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One adapter per external source. Connectors only translate the source's
/// listing into candidates; relevance and duplication are decided later.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Unique per configured source, e.g. "youtube" or "rss:bbc".
    fn name(&self) -> &str;

    /// `since` is the start of this connector's last fully successful run.
    async fn fetch_candidates(&self, since: Option<DateTime<Utc>>) -> ConnectorBatch;
}
