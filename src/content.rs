// src/content.rs
//! Candidates produced by connectors and the records the ingestor persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Vimeo,
    Dailymotion,
    Newsapi,
    Rss,
    Web,
    Manual,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Vimeo => "vimeo",
            Platform::Dailymotion => "dailymotion",
            Platform::Newsapi => "newsapi",
            Platform::Rss => "rss",
            Platform::Web => "web",
            Platform::Manual => "manual",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields every candidate carries, whatever its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMeta {
    pub platform: Platform,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub author_name: Option<String>,
    pub original_url: String,
    /// Platform-native id; `None` for generic web pages.
    pub source_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Set when the metadata came from a fallback instead of the source itself.
    #[serde(default)]
    pub degraded: bool,
}

impl CandidateMeta {
    pub fn new(platform: Platform, title: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            platform,
            title: title.into(),
            description: None,
            thumbnail_url: None,
            author_name: None,
            original_url: original_url.into(),
            source_id: None,
            published_at: None,
            degraded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsCandidate {
    #[serde(flatten)]
    pub meta: CandidateMeta,
    pub site_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCandidate {
    #[serde(flatten)]
    pub meta: CandidateMeta,
    pub embed_url: Option<String>,
}

/// A not-yet-persisted item discovered during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentCandidate {
    News(NewsCandidate),
    Video(VideoCandidate),
}

impl ContentCandidate {
    pub fn news(meta: CandidateMeta) -> Self {
        ContentCandidate::News(NewsCandidate {
            meta,
            site_name: None,
        })
    }

    pub fn video(meta: CandidateMeta) -> Self {
        ContentCandidate::Video(VideoCandidate {
            meta,
            embed_url: None,
        })
    }

    pub fn meta(&self) -> &CandidateMeta {
        match self {
            ContentCandidate::News(n) => &n.meta,
            ContentCandidate::Video(v) => &v.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut CandidateMeta {
        match self {
            ContentCandidate::News(n) => &mut n.meta,
            ContentCandidate::Video(v) => &mut v.meta,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            ContentCandidate::News(_) => RecordKind::News,
            ContentCandidate::Video(_) => RecordKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    News,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub platform: Platform,
    pub original_url: String,
    pub api_id: Option<String>,
    pub aggregated_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationInfo {
    pub is_automated: bool,
    /// 0.0 ..= 1.0
    pub confidence: f32,
    pub relevance_score: Option<f32>,
    pub duplicate_check: bool,
    pub processed: bool,
}

/// Type-specific part of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordDetails {
    News {
        #[serde(rename = "siteName")]
        site_name: Option<String>,
    },
    Video {
        #[serde(rename = "embedUrl")]
        embed_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub details: RecordDetails,
    pub status: RecordStatus,
    pub source: SourceInfo,
    pub aggregation: AggregationInfo,
}

impl ContentRecord {
    pub fn kind(&self) -> RecordKind {
        match self.details {
            RecordDetails::News { .. } => RecordKind::News,
            RecordDetails::Video { .. } => RecordKind::Video,
        }
    }

    /// Natural dedup key; only automated records are guaranteed to have one.
    pub fn key(&self) -> Option<(Platform, &str)> {
        self.source
            .api_id
            .as_deref()
            .map(|id| (self.source.platform, id))
    }

    /// Provenance rules the store enforces on every write.
    pub fn validate_provenance(&self) -> Result<(), IngestError> {
        if self.source.platform == Platform::Manual && self.aggregation.is_automated {
            return Err(IngestError::InvalidRecord(
                "manual records cannot be marked automated".into(),
            ));
        }
        if self.aggregation.is_automated
            && self.source.api_id.as_deref().is_none_or(|id| id.is_empty())
        {
            return Err(IngestError::InvalidRecord(
                "automated records require source.apiId".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.aggregation.confidence) {
            return Err(IngestError::InvalidRecord(format!(
                "confidence {} outside [0, 1]",
                self.aggregation.confidence
            )));
        }
        Ok(())
    }
}

/// Stable record id derived from the dedup key.
pub fn record_id(platform: Platform, api_id: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(platform.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(api_id.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(24);
    for b in digest.iter().take(12) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(platform: Platform, automated: bool, api_id: Option<&str>) -> ContentRecord {
        let now = Utc::now();
        ContentRecord {
            id: "x".into(),
            title: "A title".into(),
            description: String::new(),
            thumbnail_url: None,
            author: None,
            published_at: None,
            details: RecordDetails::News { site_name: None },
            status: RecordStatus::Draft,
            source: SourceInfo {
                platform,
                original_url: "https://example.com/a".into(),
                api_id: api_id.map(str::to_string),
                aggregated_at: Some(now),
                last_updated: now,
            },
            aggregation: AggregationInfo {
                is_automated: automated,
                confidence: 0.5,
                relevance_score: None,
                duplicate_check: true,
                processed: true,
            },
        }
    }

    #[test]
    fn manual_records_may_not_be_automated() {
        assert!(record(Platform::Manual, true, Some("1"))
            .validate_provenance()
            .is_err());
        assert!(record(Platform::Manual, false, None)
            .validate_provenance()
            .is_ok());
    }

    #[test]
    fn automated_records_need_api_id() {
        assert!(record(Platform::Rss, true, None).validate_provenance().is_err());
        assert!(record(Platform::Rss, true, Some("")).validate_provenance().is_err());
        assert!(record(Platform::Rss, true, Some("guid-1"))
            .validate_provenance()
            .is_ok());
    }

    #[test]
    fn record_id_is_stable_and_platform_scoped() {
        let a = record_id(Platform::Youtube, "abc");
        assert_eq!(a, record_id(Platform::Youtube, "abc"));
        assert_ne!(a, record_id(Platform::Vimeo, "abc"));
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn candidate_serializes_with_type_tag() {
        let c = ContentCandidate::video(CandidateMeta::new(
            Platform::Youtube,
            "Clip",
            "https://youtu.be/x",
        ));
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "video");
        assert_eq!(v["platform"], "youtube");
        assert_eq!(v["originalUrl"], "https://youtu.be/x");
    }
}
