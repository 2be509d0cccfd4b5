// src/ingest/providers/youtube.rs
//! YouTube Data API v3 `search.list`, newest first.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::YoutubeCfg;
use crate::content::{CandidateMeta, ContentCandidate, Platform, VideoCandidate};
use crate::extract::fetch::{FetchRequest, PageFetcher};
use crate::extract::video::VideoPlatform;
use crate::ingest::normalize_text;
use crate::ingest::types::{Connector, ConnectorBatch};

pub const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";
const PAGE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<SearchItem>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: Option<DateTime<Utc>>,
    channel_title: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumb>,
    medium: Option<Thumb>,
    default: Option<Thumb>,
}

#[derive(Debug, Deserialize)]
struct Thumb {
    url: String,
}

/// One decoded result page.
#[derive(Debug)]
pub struct SearchPage {
    pub items: Vec<ContentCandidate>,
    pub next_page_token: Option<String>,
}

pub fn parse_search_page(body: &str) -> Result<SearchPage> {
    let rsp: SearchResponse = serde_json::from_str(body).context("decoding youtube search response")?;
    if let Some(err) = rsp.error {
        bail!(
            "youtube api error {}: {}",
            err.code.unwrap_or_default(),
            err.message.unwrap_or_else(|| "unknown".into())
        );
    }

    let items = rsp
        .items
        .into_iter()
        .filter_map(|it| {
            // channels and playlists also show up in search results
            let id = it.id.video_id?;
            let sn = it.snippet?;
            let title = normalize_text(sn.title.as_deref().unwrap_or_default(), 300);
            if title.is_empty() {
                return None;
            }
            let thumb = sn
                .thumbnails
                .high
                .or(sn.thumbnails.medium)
                .or(sn.thumbnails.default)
                .map(|t| t.url);
            Some(ContentCandidate::Video(VideoCandidate {
                meta: CandidateMeta {
                    platform: Platform::Youtube,
                    title,
                    description: sn
                        .description
                        .map(|d| normalize_text(&d, 2000))
                        .filter(|d| !d.is_empty()),
                    thumbnail_url: thumb,
                    author_name: sn.channel_title,
                    original_url: format!("https://www.youtube.com/watch?v={id}"),
                    published_at: sn.published_at,
                    degraded: false,
                    source_id: Some(id.clone()),
                },
                embed_url: Some(VideoPlatform::YouTube.embed_url(&id)),
            }))
        })
        .collect();

    Ok(SearchPage {
        items,
        next_page_token: rsp.next_page_token.filter(|t| !t.is_empty()),
    })
}

pub struct YoutubeConnector {
    cfg: YoutubeCfg,
    fetcher: Arc<dyn PageFetcher>,
}

impl YoutubeConnector {
    pub fn new(cfg: YoutubeCfg, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { cfg, fetcher }
    }

    pub fn search_url(&self, since: Option<DateTime<Utc>>, page_token: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(SEARCH_ENDPOINT)?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("part", "snippet")
                .append_pair("type", "video")
                .append_pair("order", "date")
                .append_pair("maxResults", &self.cfg.page_size.to_string())
                .append_pair("key", &self.cfg.api_key);
            if let Some(query) = &self.cfg.query {
                q.append_pair("q", query);
            }
            if let Some(channel) = &self.cfg.channel_id {
                q.append_pair("channelId", channel);
            }
            if let Some(since) = since {
                q.append_pair(
                    "publishedAfter",
                    &since.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            if let Some(token) = page_token {
                q.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    async fn fetch_page(&self, url: &Url) -> Result<SearchPage> {
        let page = self
            .fetcher
            .fetch(FetchRequest::json(url.as_str(), PAGE_TIMEOUT))
            .await
            .context("youtube request")?;
        if !page.is_success() {
            // quota and key errors carry a JSON body worth surfacing
            return Err(parse_search_page(&page.body)
                .err()
                .unwrap_or_else(|| anyhow!("youtube returned HTTP {}", page.status)));
        }
        parse_search_page(&page.body)
    }
}

#[async_trait]
impl Connector for YoutubeConnector {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn fetch_candidates(&self, since: Option<DateTime<Utc>>) -> ConnectorBatch {
        if self.cfg.api_key.trim().is_empty() {
            return ConnectorBatch::failed(Vec::new(), "youtube api key not configured");
        }
        if self.cfg.query.is_none() && self.cfg.channel_id.is_none() {
            return ConnectorBatch::failed(Vec::new(), "youtube needs a query or channel_id");
        }

        let mut items = Vec::new();
        let mut token: Option<String> = None;
        for page_no in 0..self.cfg.max_pages {
            let url = match self.search_url(since, token.as_deref()) {
                Ok(u) => u,
                Err(e) => return ConnectorBatch::failed(items, format!("{e:#}")),
            };
            match self.fetch_page(&url).await {
                Ok(page) => {
                    debug!(target: "aggregation", connector = %self.cfg.name, page = page_no, items = page.items.len(), "youtube page");
                    items.extend(page.items);
                    match page.next_page_token {
                        Some(t) => token = Some(t),
                        None => break,
                    }
                }
                Err(e) => return ConnectorBatch::failed(items, format!("{e:#}")),
            }
        }
        ConnectorBatch::ok(items)
    }
}
