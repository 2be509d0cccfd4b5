// src/ingest/ingestor.rs
//! Candidate → persisted `ContentRecord`.
//!
//! Confidence is the weighted share of fields the source actually supplied
//! (title 0.30, description 0.20, thumbnail 0.20, author 0.10, publish
//! time 0.10, native id 0.10), halved for degraded extractions.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::QualityCfg;
use crate::content::{
    record_id, AggregationInfo, CandidateMeta, ContentCandidate, ContentRecord, RecordDetails,
    RecordStatus, SourceInfo,
};
use crate::error::IngestError;
use crate::extract::DEGRADED_DESCRIPTION;
use crate::ingest::normalize_text;
use crate::store::{ContentStore, UpsertOutcome};

const TITLE_MAX: usize = 300;
const DESCRIPTION_MAX: usize = 2000;

pub fn confidence(meta: &CandidateMeta) -> f32 {
    let has = |o: &Option<String>| o.as_deref().is_some_and(|s| !s.trim().is_empty());
    let description = meta
        .description
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty() && d != DEGRADED_DESCRIPTION);

    let mut score = 0.0f32;
    if meta.title.trim().chars().count() >= 3 {
        score += 0.30;
    }
    if description {
        score += 0.20;
    }
    if has(&meta.thumbnail_url) {
        score += 0.20;
    }
    if has(&meta.author_name) {
        score += 0.10;
    }
    if meta.published_at.is_some() {
        score += 0.10;
    }
    if has(&meta.source_id) {
        score += 0.10;
    }
    if meta.degraded {
        score *= 0.5;
    }
    // keep two decimals so serialized values stay readable
    ((score * 100.0).round() / 100.0).clamp(0.0, 1.0)
}

/// Stable id for items whose source has none: hash of the URL minus fragment
/// and trailing slash.
pub fn derive_api_id(original_url: &str) -> String {
    let trimmed = original_url.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let canonical = without_fragment.trim_end_matches('/');
    format!("url-{}", &record_id(crate::content::Platform::Web, canonical)[..16])
}

/// Gate for auto-publishing. Records that fail it are still written, as drafts.
#[derive(Debug, Clone)]
pub struct QualityPolicy {
    pub min_confidence: f32,
    pub min_title_len: usize,
    pub auto_publish: bool,
}

impl From<&QualityCfg> for QualityPolicy {
    fn from(q: &QualityCfg) -> Self {
        Self {
            min_confidence: q.min_confidence,
            min_title_len: q.min_title_len,
            auto_publish: q.auto_publish,
        }
    }
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::from(&QualityCfg::default())
    }
}

impl QualityPolicy {
    pub fn passes(&self, record: &ContentRecord) -> bool {
        record.aggregation.confidence >= self.min_confidence
            && record.title.chars().count() >= self.min_title_len
    }

    pub fn status_for(&self, record: &ContentRecord) -> RecordStatus {
        if self.auto_publish && self.passes(record) {
            RecordStatus::Published
        } else {
            RecordStatus::Draft
        }
    }
}

/// Pure mapping; `Ingestor::ingest` adds the clock and the store.
pub fn to_record(c: ContentCandidate, now: DateTime<Utc>, policy: &QualityPolicy) -> ContentRecord {
    let (meta, details) = match c {
        ContentCandidate::News(n) => (
            n.meta,
            RecordDetails::News {
                site_name: n.site_name,
            },
        ),
        ContentCandidate::Video(v) => (
            v.meta,
            RecordDetails::Video {
                embed_url: v.embed_url,
            },
        ),
    };

    let conf = confidence(&meta);
    let api_id = meta
        .source_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| derive_api_id(&meta.original_url));

    let mut record = ContentRecord {
        id: record_id(meta.platform, &api_id),
        title: normalize_text(&meta.title, TITLE_MAX),
        description: meta
            .description
            .as_deref()
            .map(|d| normalize_text(d, DESCRIPTION_MAX))
            .unwrap_or_default(),
        thumbnail_url: meta.thumbnail_url,
        author: meta.author_name,
        published_at: meta.published_at,
        details,
        status: RecordStatus::Draft,
        source: SourceInfo {
            platform: meta.platform,
            original_url: meta.original_url,
            api_id: Some(api_id),
            aggregated_at: Some(now),
            last_updated: now,
        },
        aggregation: AggregationInfo {
            is_automated: true,
            confidence: conf,
            relevance_score: None,
            duplicate_check: true,
            processed: true,
        },
    };
    record.status = policy.status_for(&record);
    record
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    policy: QualityPolicy,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ContentStore>, clock: Arc<dyn Clock>, policy: QualityPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub async fn ingest(
        &self,
        c: ContentCandidate,
    ) -> Result<(ContentRecord, UpsertOutcome), IngestError> {
        let record = to_record(c, self.clock.now(), &self.policy);
        let outcome = self.store.upsert(record.clone()).await?;
        Ok((record, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Platform, RecordKind};
    use chrono::TimeZone;

    fn full_meta() -> CandidateMeta {
        CandidateMeta {
            platform: Platform::Newsapi,
            title: "Rates held steady for third month".into(),
            description: Some("The central bank kept rates unchanged.".into()),
            thumbnail_url: Some("https://img.example/1.jpg".into()),
            author_name: Some("A. Writer".into()),
            original_url: "https://news.example/a".into(),
            source_id: Some("na-1".into()),
            published_at: Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()),
            degraded: false,
        }
    }

    #[test]
    fn confidence_tracks_present_fields() {
        assert_eq!(confidence(&full_meta()), 1.0);

        let mut sparse = full_meta();
        sparse.thumbnail_url = None;
        sparse.author_name = None;
        sparse.published_at = None;
        assert_eq!(confidence(&sparse), 0.6);

        let mut degraded = CandidateMeta::new(Platform::Web, "example.com", "https://example.com/x");
        degraded.description = Some(DEGRADED_DESCRIPTION.into());
        degraded.degraded = true;
        assert_eq!(confidence(&degraded), 0.15);
    }

    #[test]
    fn record_is_draft_and_automated() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap();
        let r = to_record(
            ContentCandidate::news(full_meta()),
            now,
            &QualityPolicy::default(),
        );
        assert_eq!(r.kind(), RecordKind::News);
        assert_eq!(r.status, RecordStatus::Draft);
        assert!(r.aggregation.is_automated);
        assert!(r.aggregation.duplicate_check);
        assert!(r.aggregation.processed);
        assert_eq!(r.source.api_id.as_deref(), Some("na-1"));
        assert_eq!(r.source.aggregated_at, Some(now));
        assert!(r.validate_provenance().is_ok());
    }

    #[test]
    fn auto_publish_requires_quality() {
        let now = Utc::now();
        let policy = QualityPolicy {
            auto_publish: true,
            ..QualityPolicy::default()
        };
        let good = to_record(ContentCandidate::news(full_meta()), now, &policy);
        assert_eq!(good.status, RecordStatus::Published);

        let mut short = full_meta();
        short.title = "Short".into();
        let r = to_record(ContentCandidate::news(short), now, &policy);
        assert_eq!(r.status, RecordStatus::Draft);
    }

    #[test]
    fn low_confidence_stays_draft_despite_long_title() {
        let policy = QualityPolicy {
            auto_publish: true,
            ..QualityPolicy::default()
        };
        let mut sparse = full_meta();
        sparse.description = None;
        sparse.thumbnail_url = None;
        sparse.author_name = None;
        let r = to_record(ContentCandidate::news(sparse), Utc::now(), &policy);
        assert!(r.title.chars().count() >= policy.min_title_len);
        assert!(r.aggregation.confidence < policy.min_confidence);
        assert!(!policy.passes(&r));
        assert_eq!(r.status, RecordStatus::Draft);
    }

    #[test]
    fn web_items_get_a_derived_api_id() {
        let meta = CandidateMeta::new(Platform::Web, "Some page title", "https://example.com/p/#top");
        let r = to_record(ContentCandidate::news(meta), Utc::now(), &QualityPolicy::default());
        let id = r.source.api_id.unwrap();
        assert!(id.starts_with("url-"));
        assert_eq!(id, derive_api_id("https://example.com/p"));
    }

    #[test]
    fn video_candidate_maps_to_video_record() {
        let mut meta = full_meta();
        meta.platform = Platform::Youtube;
        let c = ContentCandidate::Video(crate::content::VideoCandidate {
            meta,
            embed_url: Some("https://www.youtube.com/embed/x".into()),
        });
        let r = to_record(c, Utc::now(), &QualityPolicy::default());
        assert_eq!(r.kind(), RecordKind::Video);
        assert_eq!(
            r.details,
            RecordDetails::Video {
                embed_url: Some("https://www.youtube.com/embed/x".into())
            }
        );
    }
}
