// src/ingest/dedup.rs
//! Duplicate detection.
//!
//! A platform-native id is authoritative: `(platform, id)` seen before means
//! duplicate. Items without one (and all generic web pages) fall back to
//! identical URL or equal normalized title among records aggregated inside
//! the lookback window. Keys accepted earlier in the same run count too.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::content::{ContentCandidate, Platform};
use crate::error::IngestError;
use crate::ingest::normalize_title_key;
use crate::store::{ContentStore, SimilarityProbe};

/// Keys accepted so far in the current run.
#[derive(Debug, Default)]
pub struct RunSeen {
    keys: HashSet<(Platform, String)>,
    urls: HashSet<String>,
    titles: HashSet<String>,
}

impl RunSeen {
    pub fn accept(&mut self, c: &ContentCandidate) {
        let meta = c.meta();
        if let Some(id) = meta.source_id.as_deref() {
            self.keys.insert((meta.platform, id.to_string()));
        }
        if !meta.original_url.is_empty() {
            self.urls.insert(meta.original_url.clone());
        }
        if !meta.degraded {
            let key = normalize_title_key(&meta.title);
            if !key.is_empty() {
                self.titles.insert(key);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.urls.is_empty() && self.titles.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    lookback: Duration,
    title_similarity: Option<f64>,
}

impl Deduplicator {
    pub fn new(lookback_days: i64, title_similarity: Option<f64>) -> Self {
        Self {
            lookback: Duration::days(lookback_days.max(0)),
            title_similarity,
        }
    }

    fn uses_heuristic(c: &ContentCandidate) -> bool {
        let meta = c.meta();
        meta.source_id.is_none() || meta.platform == Platform::Web
    }

    pub async fn is_duplicate(
        &self,
        c: &ContentCandidate,
        store: &dyn ContentStore,
        seen: &RunSeen,
        now: DateTime<Utc>,
    ) -> Result<bool, IngestError> {
        let meta = c.meta();

        if let Some(id) = meta.source_id.as_deref() {
            if seen.keys.contains(&(meta.platform, id.to_string())) {
                return Ok(true);
            }
            if store.find_by_key(meta.platform, id).await?.is_some() {
                return Ok(true);
            }
        }

        if !Self::uses_heuristic(c) {
            return Ok(false);
        }

        // Degraded titles are just the domain name; only the URL is meaningful.
        let title_key = if meta.degraded {
            String::new()
        } else {
            normalize_title_key(&meta.title)
        };

        if seen.urls.contains(&meta.original_url)
            || (!title_key.is_empty() && seen.titles.contains(&title_key))
        {
            return Ok(true);
        }

        let probe = SimilarityProbe {
            title_key,
            original_url: meta.original_url.clone(),
            title_similarity: self.title_similarity,
        };
        Ok(store
            .find_recent_similar(&probe, now - self.lookback)
            .await?
            .is_some())
    }
}
