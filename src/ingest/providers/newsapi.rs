// src/ingest/providers/newsapi.rs
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::NewsApiCfg;
use crate::content::{CandidateMeta, ContentCandidate, NewsCandidate, Platform};
use crate::extract::fetch::{FetchRequest, PageFetcher};
use crate::ingest::ingestor::derive_api_id;
use crate::ingest::normalize_text;
use crate::ingest::types::{Connector, ConnectorBatch};

pub const EVERYTHING_ENDPOINT: &str = "https://newsapi.org/v2/everything";
const PAGE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EverythingResponse {
    status: String,
    code: Option<String>,
    message: Option<String>,
    total_results: Option<u64>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    source: Option<ArticleSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

#[derive(Debug)]
pub struct ArticlePage {
    pub items: Vec<ContentCandidate>,
    pub total_results: u64,
}

pub fn parse_articles(body: &str) -> Result<ArticlePage> {
    let rsp: EverythingResponse = serde_json::from_str(body).context("decoding newsapi response")?;
    if rsp.status != "ok" {
        bail!(
            "newsapi error {}: {}",
            rsp.code.unwrap_or_else(|| "unknown".into()),
            rsp.message.unwrap_or_default()
        );
    }

    let items = rsp
        .articles
        .into_iter()
        .filter_map(|a| {
            let url = a.url.filter(|u| u.starts_with("http"))?;
            let title = normalize_text(a.title.as_deref().unwrap_or_default(), 300);
            // NewsAPI's placeholder for articles pulled by the publisher
            if title.is_empty() || title == "[Removed]" {
                return None;
            }
            let site_name = a.source.and_then(|s| s.name).filter(|n| !n.trim().is_empty());
            let author = a
                .author
                .map(|s| normalize_text(&s, 200))
                .filter(|s| !s.is_empty())
                .or_else(|| site_name.clone());
            Some(ContentCandidate::News(NewsCandidate {
                meta: CandidateMeta {
                    platform: Platform::Newsapi,
                    title,
                    description: a
                        .description
                        .map(|d| normalize_text(&d, 2000))
                        .filter(|d| !d.is_empty()),
                    thumbnail_url: a.url_to_image.filter(|u| u.starts_with("http")),
                    author_name: author,
                    source_id: Some(derive_api_id(&url)),
                    original_url: url,
                    published_at: a.published_at,
                    degraded: false,
                },
                site_name,
            }))
        })
        .collect();

    Ok(ArticlePage {
        items,
        total_results: rsp.total_results.unwrap_or_default(),
    })
}

pub struct NewsApiConnector {
    cfg: NewsApiCfg,
    fetcher: Arc<dyn PageFetcher>,
}

impl NewsApiConnector {
    pub fn new(cfg: NewsApiCfg, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { cfg, fetcher }
    }

    pub fn page_url(&self, since: Option<DateTime<Utc>>, page: u32) -> Result<Url> {
        let mut url = Url::parse(EVERYTHING_ENDPOINT)?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("q", &self.cfg.query)
                .append_pair("sortBy", "publishedAt")
                .append_pair("pageSize", &self.cfg.page_size.to_string())
                .append_pair("page", &page.to_string())
                .append_pair("apiKey", &self.cfg.api_key);
            if let Some(lang) = &self.cfg.language {
                q.append_pair("language", lang);
            }
            if let Some(since) = since {
                q.append_pair("from", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
        Ok(url)
    }

    async fn fetch_page(&self, page: u32, since: Option<DateTime<Utc>>) -> Result<ArticlePage> {
        let url = self.page_url(since, page)?;
        let rsp = self
            .fetcher
            .fetch(FetchRequest::json(url.as_str(), PAGE_TIMEOUT))
            .await
            .context("newsapi request")?;
        if !rsp.is_success() {
            return Err(parse_articles(&rsp.body)
                .err()
                .unwrap_or_else(|| anyhow!("newsapi returned HTTP {}", rsp.status)));
        }
        parse_articles(&rsp.body)
    }
}

#[async_trait]
impl Connector for NewsApiConnector {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn fetch_candidates(&self, since: Option<DateTime<Utc>>) -> ConnectorBatch {
        if self.cfg.api_key.trim().is_empty() {
            return ConnectorBatch::failed(Vec::new(), "newsapi key not configured");
        }

        let mut items = Vec::new();
        for page in 1..=self.cfg.max_pages {
            match self.fetch_page(page, since).await {
                Ok(p) => {
                    let got = p.items.len();
                    items.extend(p.items);
                    let fetched_so_far = u64::from(page) * u64::from(self.cfg.page_size);
                    if got == 0 || fetched_so_far >= p.total_results {
                        break;
                    }
                }
                Err(e) => return ConnectorBatch::failed(items, format!("{e:#}")),
            }
        }
        ConnectorBatch::ok(items)
    }
}
