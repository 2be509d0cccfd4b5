// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::content::{CandidateMeta, ContentCandidate, NewsCandidate, Platform};
use crate::extract::fetch::{FetchRequest, PageFetcher};
use crate::extract::page::parse_datetime;
use crate::ingest::normalize_text;
use crate::ingest::types::{Connector, ConnectorBatch};

const FEED_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
    #[serde(default)]
    enclosure: Vec<MediaRef>,
    #[serde(rename = "media:thumbnail", default)]
    media_thumbnail: Vec<MediaRef>,
    #[serde(rename = "media:content", default)]
    media_content: Vec<MediaRef>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaRef {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    mime: Option<String>,
    #[serde(rename = "@medium")]
    medium: Option<String>,
}

impl MediaRef {
    fn is_image(&self) -> bool {
        self.mime.as_deref().is_some_and(|m| m.starts_with("image/"))
            || self.medium.as_deref() == Some("image")
    }
}

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("img regex"));

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        // feeds in the wild also use ISO dates
        .or_else(|| parse_datetime(ts))
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn thumbnail_for(it: &Item) -> Option<String> {
    it.media_thumbnail
        .iter()
        .find_map(|m| m.url.clone())
        .or_else(|| {
            it.media_content
                .iter()
                .filter(|m| m.is_image())
                .find_map(|m| m.url.clone())
        })
        .or_else(|| {
            it.enclosure
                .iter()
                .filter(|m| m.is_image())
                .find_map(|m| m.url.clone())
        })
        .or_else(|| {
            it.description
                .as_deref()
                .and_then(|d| IMG_SRC.captures(d))
                .map(|c| c[1].to_string())
        })
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        fetcher: Arc<dyn PageFetcher>,
    },
}

pub struct RssConnector {
    name: String,
    mode: Mode,
}

impl RssConnector {
    pub fn from_url(name: &str, url: &str, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            name: format!("rss:{name}"),
            mode: Mode::Http {
                url: url.to_string(),
                fetcher,
            },
        }
    }

    /// Parse a feed held in memory instead of fetching it.
    pub fn from_fixture_str(name: &str, xml: &str) -> Self {
        Self {
            name: format!("rss:{name}"),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn parse_items_from_str(s: &str, since: Option<DateTime<Utc>>) -> Result<Vec<ContentCandidate>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
        let site_name = non_empty(rss.channel.title);

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let published_at = it.pub_date.as_deref().and_then(parse_rfc2822);
            if let (Some(since), Some(p)) = (since, published_at) {
                if p < since {
                    continue;
                }
            }

            let title = normalize_text(it.title.as_deref().unwrap_or_default(), 300);
            let link = non_empty(it.link.clone());
            let guid = non_empty(it.guid.as_ref().and_then(|g| g.value.clone()));
            let Some(url) = link.clone().or_else(|| guid.clone().filter(|g| g.starts_with("http")))
            else {
                continue;
            };
            if title.is_empty() {
                continue;
            }

            let thumbnail_url = thumbnail_for(&it);
            let description = it
                .description
                .as_deref()
                .map(|d| normalize_text(d, 2000))
                .filter(|d| !d.is_empty());

            out.push(ContentCandidate::News(NewsCandidate {
                meta: CandidateMeta {
                    platform: Platform::Rss,
                    title,
                    description,
                    thumbnail_url,
                    author_name: non_empty(it.creator).or_else(|| non_empty(it.author)),
                    original_url: url.clone(),
                    source_id: guid.or(link),
                    published_at,
                    degraded: false,
                },
                site_name: site_name.clone(),
            }));
        }
        Ok(out)
    }

    async fn load(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ContentCandidate>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s, since),
            Mode::Http { url, fetcher } => {
                let page = fetcher
                    .fetch(FetchRequest::xml(url, FEED_TIMEOUT))
                    .await
                    .and_then(|p| p.into_success())
                    .with_context(|| format!("fetching feed {url}"))?;
                Self::parse_items_from_str(&page.body, since)
            }
        }
    }
}

#[async_trait]
impl Connector for RssConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candidates(&self, since: Option<DateTime<Utc>>) -> ConnectorBatch {
        match self.load(since).await {
            Ok(items) => ConnectorBatch::ok(items),
            Err(e) => ConnectorBatch::failed(Vec::new(), format!("{e:#}")),
        }
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
