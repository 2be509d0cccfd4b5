// src/extract/mod.rs
//! URL → normalized metadata.
//!
//! Video platform URLs go through the platform's oEmbed endpoint and fall
//! back to URL-derived metadata on any failure. Everything else is fetched
//! as a web page with bounded retries; once retries run out the caller gets
//! a degraded `news` result, never an error. The only error is a URL that
//! does not parse.

pub mod fetch;
pub mod page;
pub mod video;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::clock::Clock;
use crate::config::ExtractorCfg;
use crate::content::{CandidateMeta, ContentCandidate, NewsCandidate, Platform, VideoCandidate};
use crate::error::{ExtractError, FetchError};
use crate::retry::{Attempt, RetryPolicy};

use fetch::{FetchRequest, PageFetcher};
use page::ParsedPage;
use video::{OEmbed, VideoPlatform};

pub const MIN_TITLE_CHARS: usize = 3;
pub const DEGRADED_DESCRIPTION: &str =
    "Unable to extract content from this page. Please add the details manually.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    News,
    /// Not ingestable (e.g. a PDF or image URL).
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub url: String,
    pub platform: Platform,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub site_name: Option<String>,
    pub video_id: Option<String>,
    pub embed_url: Option<String>,
    pub degraded: bool,
}

impl Metadata {
    /// `None` for `unknown` results, which must not be ingested.
    pub fn into_candidate(self) -> Option<ContentCandidate> {
        let meta = CandidateMeta {
            platform: self.platform,
            title: self.title,
            description: self.description,
            thumbnail_url: self.thumbnail_url,
            author_name: self.author,
            original_url: self.url,
            source_id: self.video_id,
            published_at: self.published_at,
            degraded: self.degraded,
        };
        match self.kind {
            ContentKind::Video => Some(ContentCandidate::Video(VideoCandidate {
                meta,
                embed_url: self.embed_url,
            })),
            ContentKind::News => Some(ContentCandidate::News(NewsCandidate {
                meta,
                site_name: self.site_name,
            })),
            ContentKind::Unknown => None,
        }
    }
}

/// Which path `extract` takes for a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    OEmbed {
        platform: VideoPlatform,
        video_id: Option<String>,
    },
    Page,
}

pub fn classify(url: &Url) -> Strategy {
    match VideoPlatform::from_url(url) {
        Some(platform) => Strategy::OEmbed {
            platform,
            video_id: platform.video_id(url),
        },
        None => Strategy::Page,
    }
}

/// Host without a leading `www.`.
pub fn domain_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

pub fn parse_input_url(raw: &str) -> Result<Url, ExtractError> {
    let url = Url::parse(raw.trim()).map_err(|e| ExtractError::InvalidInput(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractError::InvalidInput(format!(
            "{raw}: unsupported scheme {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(|h| h.is_empty()) {
        return Err(ExtractError::InvalidInput(format!("{raw}: missing host")));
    }
    Ok(url)
}

fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        // Servers that omit the header are assumed to send HTML.
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        }
    }
}

enum PageFailure {
    Fetch(FetchError),
    NoTitle,
}

impl std::fmt::Display for PageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageFailure::Fetch(e) => write!(f, "{e}"),
            PageFailure::NoTitle => f.write_str("no usable title"),
        }
    }
}

enum PageResult {
    Parsed(ParsedPage),
    NotHtml(Option<String>),
}

#[derive(Clone)]
pub struct Extractor {
    fetcher: Arc<dyn PageFetcher>,
    clock: Arc<dyn Clock>,
    oembed_timeout: Duration,
    page_timeout: Duration,
    retry: RetryPolicy,
    user_agent: String,
}

impl Extractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, clock: Arc<dyn Clock>, cfg: &ExtractorCfg) -> Self {
        Self {
            fetcher,
            clock,
            oembed_timeout: Duration::from_secs(cfg.oembed_timeout_secs),
            page_timeout: Duration::from_secs(cfg.page_timeout_secs),
            retry: RetryPolicy::new(cfg.max_attempts, Duration::from_secs(cfg.backoff_base_secs)),
            user_agent: cfg.user_agent.clone(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn extract(&self, raw_url: &str) -> Result<Metadata, ExtractError> {
        let url = parse_input_url(raw_url)?;
        let meta = match classify(&url) {
            Strategy::OEmbed { platform, video_id } => {
                self.extract_video(&url, platform, video_id).await
            }
            Strategy::Page => self.extract_page(&url).await,
        };
        Ok(meta)
    }

    async fn extract_video(
        &self,
        url: &Url,
        platform: VideoPlatform,
        video_id: Option<String>,
    ) -> Metadata {
        let endpoint = platform.oembed_url(url.as_str());
        counter!("extract_attempts_total").increment(1);

        let fetched = self
            .fetcher
            .fetch(FetchRequest::json(&endpoint, self.oembed_timeout))
            .await
            .and_then(fetch::FetchedPage::into_success);

        let oembed = match fetched {
            Ok(page) => match serde_json::from_str::<OEmbed>(&page.body) {
                Ok(o) if o.title.as_deref().is_some_and(|t| !t.trim().is_empty()) => Some(o),
                Ok(_) => {
                    warn!(url = %url, "oembed response without title");
                    None
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "oembed body malformed");
                    None
                }
            },
            Err(e) => {
                warn!(url = %url, error = %e, "oembed fetch failed");
                None
            }
        };

        match oembed {
            Some(o) => video_metadata(url, platform, video_id, o),
            None => {
                counter!("extract_fallback_total").increment(1);
                video_fallback(url, platform, video_id)
            }
        }
    }

    async fn extract_page(&self, url: &Url) -> Metadata {
        let fetcher = &self.fetcher;
        let timeout = self.page_timeout;
        let ua = self.user_agent.as_str();

        let outcome = self
            .retry
            .run(self.clock.as_ref(), move |attempt| async move {
                counter!("extract_attempts_total").increment(1);
                debug!(url = %url, attempt, "fetching page");
                match fetcher
                    .fetch(FetchRequest::html(url.as_str(), timeout, ua))
                    .await
                {
                    Ok(page) if page.is_success() => {
                        if !is_html(page.content_type.as_deref()) {
                            return Attempt::Done(PageResult::NotHtml(page.content_type));
                        }
                        let parsed = page::parse_html(&page.body, url);
                        let title_ok = parsed
                            .title
                            .as_deref()
                            .is_some_and(|t| t.chars().count() >= MIN_TITLE_CHARS);
                        if title_ok {
                            Attempt::Done(PageResult::Parsed(parsed))
                        } else {
                            Attempt::Retry(PageFailure::NoTitle)
                        }
                    }
                    Ok(page) => {
                        let e = FetchError::Status(page.status);
                        if e.is_transient() {
                            Attempt::Retry(PageFailure::Fetch(e))
                        } else {
                            Attempt::Fail(PageFailure::Fetch(e))
                        }
                    }
                    Err(e) if e.is_transient() => Attempt::Retry(PageFailure::Fetch(e)),
                    Err(e) => Attempt::Fail(PageFailure::Fetch(e)),
                }
            })
            .await;

        match outcome {
            Ok(PageResult::Parsed(p)) => page_metadata(url, p),
            Ok(PageResult::NotHtml(ct)) => {
                info!(url = %url, content_type = ?ct, "not an html page; marking unknown");
                Metadata {
                    kind: ContentKind::Unknown,
                    ..degraded_page(url)
                }
            }
            Err(exhausted) => {
                counter!("extract_fallback_total").increment(1);
                warn!(
                    url = %url,
                    attempts = exhausted.attempts,
                    terminal = exhausted.terminal,
                    error = %exhausted.last_error,
                    "page extraction degraded"
                );
                degraded_page(url)
            }
        }
    }
}

fn video_metadata(
    url: &Url,
    platform: VideoPlatform,
    video_id: Option<String>,
    o: OEmbed,
) -> Metadata {
    let derived = video_id.as_deref().map(|id| platform.derived_thumbnail(id));
    let thumbnail_url = match platform {
        // maxresdefault beats the hqdefault oEmbed hands out
        VideoPlatform::YouTube => derived.or(o.thumbnail_url),
        _ => o.thumbnail_url.or(derived),
    };
    let author = o.author_name.filter(|a| !a.trim().is_empty());
    Metadata {
        kind: ContentKind::Video,
        url: url.to_string(),
        platform: platform.platform(),
        title: o.title.unwrap_or_default().trim().to_string(),
        description: author.as_ref().map(|a| format!("Video by {a}")),
        thumbnail_url,
        author,
        published_at: None,
        site_name: o.provider_name.or_else(|| Some(platform.display_name().to_string())),
        embed_url: video_id.as_deref().map(|id| platform.embed_url(id)),
        video_id,
        degraded: false,
    }
}

fn video_fallback(url: &Url, platform: VideoPlatform, video_id: Option<String>) -> Metadata {
    let name = platform.display_name();
    Metadata {
        kind: ContentKind::Video,
        url: url.to_string(),
        platform: platform.platform(),
        title: format!("{name} video"),
        description: Some(format!("Video from {name}")),
        thumbnail_url: video_id.as_deref().map(|id| platform.derived_thumbnail(id)),
        author: None,
        published_at: None,
        site_name: Some(name.to_string()),
        embed_url: video_id.as_deref().map(|id| platform.embed_url(id)),
        video_id,
        degraded: true,
    }
}

fn page_metadata(url: &Url, p: ParsedPage) -> Metadata {
    Metadata {
        kind: ContentKind::News,
        url: url.to_string(),
        platform: Platform::Web,
        title: p.title.unwrap_or_else(|| domain_of(url)),
        description: p.description,
        thumbnail_url: p.thumbnail_url,
        author: p.author,
        published_at: p.published_at,
        site_name: p.site_name.or_else(|| Some(domain_of(url))),
        video_id: None,
        embed_url: None,
        degraded: false,
    }
}

fn degraded_page(url: &Url) -> Metadata {
    Metadata {
        kind: ContentKind::News,
        url: url.to_string(),
        platform: Platform::Web,
        title: domain_of(url),
        description: Some(DEGRADED_DESCRIPTION.to_string()),
        thumbnail_url: None,
        author: None,
        published_at: None,
        site_name: Some(domain_of(url)),
        video_id: None,
        embed_url: None,
        degraded: true,
    }
}
