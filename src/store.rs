// src/store.rs
//! Content store seam. The real document database lives outside this crate;
//! `InMemoryStore` backs the binary (optionally snapshotted to JSON) and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

use crate::content::{ContentRecord, Platform};
use crate::error::IngestError;
use crate::ingest::normalize_title_key;

/// What `upsert` did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Key already present; only `source.lastUpdated` moved.
    Touched,
}

/// Near-duplicate lookup for items without a trustworthy platform id.
#[derive(Debug, Clone)]
pub struct SimilarityProbe {
    /// Output of [`normalize_title_key`].
    pub title_key: String,
    pub original_url: String,
    /// `None` means normalized titles must be equal.
    pub title_similarity: Option<f64>,
}

impl SimilarityProbe {
    pub fn matches(&self, record: &ContentRecord) -> bool {
        if !self.original_url.is_empty() && record.source.original_url == self.original_url {
            return true;
        }
        if self.title_key.is_empty() {
            return false;
        }
        let other = normalize_title_key(&record.title);
        if other == self.title_key {
            return true;
        }
        match self.title_similarity {
            Some(threshold) => strsim::normalized_levenshtein(&self.title_key, &other) >= threshold,
            None => false,
        }
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_key(
        &self,
        platform: Platform,
        api_id: &str,
    ) -> Result<Option<ContentRecord>, IngestError>;

    /// Records aggregated at or after `since` that match `probe`.
    async fn find_recent_similar(
        &self,
        probe: &SimilarityProbe,
        since: DateTime<Utc>,
    ) -> Result<Option<ContentRecord>, IngestError>;

    /// Insert, or touch `lastUpdated` when the `(platform, apiId)` key exists.
    async fn upsert(&self, record: ContentRecord) -> Result<UpsertOutcome, IngestError>;
}

type KeyIndex = HashMap<(Platform, String), usize>;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Vec<ContentRecord>>,
    index: RwLock<KeyIndex>,
    snapshot: Option<PathBuf>,
    /// Serializes upserts so a snapshot write and its commit are not interleaved.
    writer: tokio::sync::Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from `path` if it exists; every later upsert rewrites it.
    pub fn with_snapshot(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;
        let path = path.as_ref().to_path_buf();
        let records: Vec<ContentRecord> = if path.exists() {
            let s = std::fs::read_to_string(&path)
                .with_context(|| format!("reading store snapshot {}", path.display()))?;
            serde_json::from_str(&s)
                .with_context(|| format!("parsing store snapshot {}", path.display()))?
        } else {
            Vec::new()
        };
        let store = Self {
            snapshot: Some(path),
            ..Self::default()
        };
        {
            let mut v = store.inner.write().expect("store rwlock poisoned");
            let mut idx = store.index.write().expect("store rwlock poisoned");
            for r in records {
                if let Some((p, id)) = r.key() {
                    idx.insert((p, id.to_string()), v.len());
                }
                v.push(r);
            }
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("store rwlock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<ContentRecord> {
        self.inner.read().expect("store rwlock poisoned").clone()
    }

    /// Insert a record verbatim (e.g. editorial content), bypassing the key index check.
    pub fn seed(&self, record: ContentRecord) {
        let mut v = self.inner.write().expect("store rwlock poisoned");
        if let Some((p, id)) = record.key() {
            self.index
                .write()
                .expect("store rwlock poisoned")
                .insert((p, id.to_string()), v.len());
        }
        v.push(record);
    }
}

/// Insert `record`, or touch `lastUpdated` when its key is already indexed.
fn apply_upsert(
    v: &mut Vec<ContentRecord>,
    idx: &mut KeyIndex,
    record: ContentRecord,
) -> UpsertOutcome {
    match record.key().map(|(p, id)| (p, id.to_string())) {
        Some(key) => match idx.get(&key) {
            Some(&i) => {
                v[i].source.last_updated = record.source.last_updated;
                UpsertOutcome::Touched
            }
            None => {
                idx.insert(key, v.len());
                v.push(record);
                UpsertOutcome::Inserted
            }
        },
        None => {
            v.push(record);
            UpsertOutcome::Inserted
        }
    }
}

async fn write_snapshot(path: &Path, records: &[ContentRecord]) -> Result<(), IngestError> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| IngestError::Storage(format!("serializing snapshot: {e}")))?;
    let tmp = path.with_extension("json.tmp");
    let written = match tokio::fs::write(&tmp, json).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    written.map_err(|e| {
        warn!(error = %e, path = %path.display(), "store snapshot write failed");
        IngestError::Storage(format!("writing snapshot {}: {e}", path.display()))
    })
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn find_by_key(
        &self,
        platform: Platform,
        api_id: &str,
    ) -> Result<Option<ContentRecord>, IngestError> {
        let v = self.inner.read().expect("store rwlock poisoned");
        let idx = self.index.read().expect("store rwlock poisoned");
        Ok(idx
            .get(&(platform, api_id.to_string()))
            .and_then(|&i| v.get(i))
            .cloned())
    }

    async fn find_recent_similar(
        &self,
        probe: &SimilarityProbe,
        since: DateTime<Utc>,
    ) -> Result<Option<ContentRecord>, IngestError> {
        let v = self.inner.read().expect("store rwlock poisoned");
        Ok(v.iter()
            .filter(|r| {
                r.source
                    .aggregated_at
                    .unwrap_or(r.source.last_updated)
                    >= since
            })
            .find(|r| probe.matches(r))
            .cloned())
    }

    async fn upsert(&self, record: ContentRecord) -> Result<UpsertOutcome, IngestError> {
        record.validate_provenance()?;
        let _writer = self.writer.lock().await;

        let Some(path) = &self.snapshot else {
            let mut v = self.inner.write().expect("store rwlock poisoned");
            let mut idx = self.index.write().expect("store rwlock poisoned");
            return Ok(apply_upsert(&mut v, &mut idx, record));
        };

        // Stage on a copy; memory only changes once the snapshot is on disk.
        let mut next = self.all();
        let mut next_idx = self.index.read().expect("store rwlock poisoned").clone();
        let outcome = apply_upsert(&mut next, &mut next_idx, record);
        write_snapshot(path, &next).await?;

        let mut v = self.inner.write().expect("store rwlock poisoned");
        let mut idx = self.index.write().expect("store rwlock poisoned");
        *v = next;
        *idx = next_idx;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{AggregationInfo, RecordDetails, RecordStatus, SourceInfo};
    use chrono::{Duration, TimeZone};

    fn rec(api_id: &str, title: &str, url: &str, at: DateTime<Utc>) -> ContentRecord {
        ContentRecord {
            id: api_id.into(),
            title: title.into(),
            description: String::new(),
            thumbnail_url: None,
            author: None,
            published_at: None,
            details: RecordDetails::News { site_name: None },
            status: RecordStatus::Draft,
            source: SourceInfo {
                platform: Platform::Web,
                original_url: url.into(),
                api_id: Some(api_id.into()),
                aggregated_at: Some(at),
                last_updated: at,
            },
            aggregation: AggregationInfo {
                is_automated: true,
                confidence: 0.8,
                relevance_score: None,
                duplicate_check: true,
                processed: true,
            },
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_key() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        let store = InMemoryStore::new();
        let first = store.upsert(rec("k1", "Hello", "https://a/1", t0)).await.unwrap();
        assert_eq!(first, UpsertOutcome::Inserted);

        let t1 = t0 + Duration::hours(24);
        let second = store.upsert(rec("k1", "Hello", "https://a/1", t1)).await.unwrap();
        assert_eq!(second, UpsertOutcome::Touched);
        assert_eq!(store.len(), 1);

        let got = store.find_by_key(Platform::Web, "k1").await.unwrap().unwrap();
        assert_eq!(got.source.last_updated, t1);
        assert_eq!(got.source.aggregated_at, Some(t0));
    }

    #[tokio::test]
    async fn similar_lookup_respects_window() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        let store = InMemoryStore::new();
        store
            .upsert(rec("k1", "Markets rally, again!", "https://a/1", t0))
            .await
            .unwrap();

        let probe = SimilarityProbe {
            title_key: normalize_title_key("markets RALLY again"),
            original_url: "https://other/2".into(),
            title_similarity: None,
        };
        let hit = store
            .find_recent_similar(&probe, t0 - Duration::days(30))
            .await
            .unwrap();
        assert!(hit.is_some());

        let miss = store
            .find_recent_similar(&probe, t0 + Duration::days(1))
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn fuzzy_title_match_is_opt_in() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        let r = rec("k", "Central bank holds rates steady in March", "https://a/1", t0);
        let mut probe = SimilarityProbe {
            title_key: normalize_title_key("Central bank holds rates steady in march."),
            original_url: String::new(),
            title_similarity: None,
        };
        assert!(probe.matches(&r));

        probe.title_key = normalize_title_key("Central bank hold rates steady in March");
        assert!(!probe.matches(&r));
        probe.title_similarity = Some(0.95);
        assert!(probe.matches(&r));
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("store.json");
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        let store = InMemoryStore::with_snapshot(&path).unwrap();

        let err = store.upsert(rec("k1", "Hello", "https://a/1", t0)).await.unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)), "{err}");
        assert!(store.is_empty());
        assert!(store.find_by_key(Platform::Web, "k1").await.unwrap().is_none());

        // once the directory exists the same record goes in as new
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let outcome = store.upsert(rec("k1", "Hello", "https://a/1", t0)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        {
            let store = InMemoryStore::with_snapshot(&path).unwrap();
            store.upsert(rec("k1", "Hello", "https://a/1", t0)).await.unwrap();
        }
        let reopened = InMemoryStore::with_snapshot(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened
            .find_by_key(Platform::Web, "k1")
            .await
            .unwrap()
            .is_some());
    }
}
