// src/config/mod.rs
//! Aggregation configuration.
//!
//! Lookup order:
//! 1) $AGGREGATION_CONFIG_PATH
//! 2) config/aggregation.toml
//! 3) config/aggregation.json
//! 4) built-in defaults
//!
//! API keys set to `"ENV"` are read from `YOUTUBE_API_KEY` / `NEWSAPI_KEY`.
//! Out-of-range numbers are clamped, not rejected.

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, NaiveTime, Offset as _};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::extract::fetch::BROWSER_USER_AGENT;
use crate::ingest::unique_name;

pub const ENV_CONFIG_PATH: &str = "AGGREGATION_CONFIG_PATH";
pub const ENV_YOUTUBE_KEY: &str = "YOUTUBE_API_KEY";
pub const ENV_NEWSAPI_KEY: &str = "NEWSAPI_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub server: ServerCfg,
    pub schedule: ScheduleCfg,
    pub run: RunCfg,
    pub quality: QualityCfg,
    pub extractor: ExtractorCfg,
    pub youtube: Vec<YoutubeCfg>,
    pub newsapi: Vec<NewsApiCfg>,
    pub rss: Vec<RssCfg>,
    pub web: WebCfg,
    pub store: StoreCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
    pub bind: String,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleCfg {
    pub enabled: bool,
    /// Local wall-clock time, "HH:MM".
    pub daily_at: String,
    /// Fixed offset of the local zone; -5 is EST.
    pub utc_offset_hours: i32,
}

impl Default for ScheduleCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_at: "06:00".into(),
            utc_offset_hours: -5,
        }
    }
}

impl ScheduleCfg {
    pub fn daily_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(self.daily_at.trim(), "%H:%M")
            .unwrap_or_else(|_| NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default())
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.clamp(-14, 14) * 3600)
            .unwrap_or_else(|| chrono::Utc.fix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCfg {
    pub connector_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub log_retention: usize,
    pub dedup_lookback_days: i64,
    /// Optional fuzzy title match (normalized Levenshtein, 0..=1).
    pub title_similarity: Option<f64>,
}

impl RunCfg {
    /// Per-connector fetch bound: the connector timeout, never past the run timeout.
    pub fn connector_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connector_timeout_secs
                .min(self.run_timeout_secs)
                .max(1),
        )
    }
}

impl Default for RunCfg {
    fn default() -> Self {
        Self {
            connector_timeout_secs: 120,
            run_timeout_secs: 600,
            log_retention: 30,
            dedup_lookback_days: 30,
            title_similarity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityCfg {
    pub min_confidence: f32,
    pub min_title_len: usize,
    pub auto_publish: bool,
}

impl Default for QualityCfg {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_title_len: 10,
            auto_publish: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorCfg {
    pub oembed_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub user_agent: String,
}

impl Default for ExtractorCfg {
    fn default() -> Self {
        Self {
            oembed_timeout_secs: 5,
            page_timeout_secs: 8,
            max_attempts: 3,
            backoff_base_secs: 1,
            user_agent: BROWSER_USER_AGENT.into(),
        }
    }
}

fn default_youtube_name() -> String {
    "youtube".into()
}
fn default_newsapi_name() -> String {
    "newsapi".into()
}
fn default_max_pages() -> u32 {
    2
}
fn default_page_size() -> u32 {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeCfg {
    #[serde(default = "default_youtube_name")]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsApiCfg {
    #[serde(default = "default_newsapi_name")]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    pub query: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssCfg {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebCfg {
    pub name: String,
    pub urls: Vec<String>,
    /// Pages extracted at once.
    pub concurrency: usize,
}

impl Default for WebCfg {
    fn default() -> Self {
        Self {
            name: "web".into(),
            urls: Vec::new(),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub snapshot_path: Option<PathBuf>,
}

impl AggregationConfig {
    /// Load from an explicit path. TOML or JSON, picked by extension then content.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading aggregation config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing aggregation config {}", path.display()))?;
        cfg.resolve_api_keys();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/aggregation.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/aggregation.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        let mut cfg = Self::default();
        cfg.sanitize();
        Ok(cfg)
    }

    fn resolve_api_keys(&mut self) {
        for y in &mut self.youtube {
            y.api_key = resolve_key(&y.api_key, ENV_YOUTUBE_KEY, &y.name);
        }
        for n in &mut self.newsapi {
            n.api_key = resolve_key(&n.api_key, ENV_NEWSAPI_KEY, &n.name);
        }
    }

    pub fn sanitize(&mut self) {
        let e = &mut self.extractor;
        e.oembed_timeout_secs = e.oembed_timeout_secs.clamp(1, 30);
        e.page_timeout_secs = e.page_timeout_secs.clamp(1, 60);
        e.max_attempts = e.max_attempts.clamp(1, 10);
        e.backoff_base_secs = e.backoff_base_secs.min(60);
        if e.user_agent.trim().is_empty() {
            e.user_agent = BROWSER_USER_AGENT.into();
        }

        let r = &mut self.run;
        r.connector_timeout_secs = r.connector_timeout_secs.max(1);
        r.run_timeout_secs = r.run_timeout_secs.max(1);
        r.log_retention = r.log_retention.clamp(1, 10_000);
        r.dedup_lookback_days = r.dedup_lookback_days.clamp(0, 3650);
        r.title_similarity = r
            .title_similarity
            .filter(|t| t.is_finite())
            .map(|t| t.clamp(0.5, 1.0));

        let q = &mut self.quality;
        q.min_confidence = if q.min_confidence.is_finite() {
            q.min_confidence.clamp(0.0, 1.0)
        } else {
            QualityCfg::default().min_confidence
        };

        if NaiveTime::parse_from_str(self.schedule.daily_at.trim(), "%H:%M").is_err() {
            warn!(daily_at = %self.schedule.daily_at, "invalid schedule.daily_at; using 06:00");
            self.schedule.daily_at = ScheduleCfg::default().daily_at;
        }
        self.schedule.utc_offset_hours = self.schedule.utc_offset_hours.clamp(-14, 14);

        for y in &mut self.youtube {
            y.max_pages = y.max_pages.clamp(1, 20);
            y.page_size = y.page_size.clamp(1, 50);
        }
        for n in &mut self.newsapi {
            n.max_pages = n.max_pages.clamp(1, 20);
            n.page_size = n.page_size.clamp(1, 100);
        }
        self.web.urls.retain(|u| !u.trim().is_empty());
        self.web.concurrency = self.web.concurrency.clamp(1, 32);
        self.dedupe_connector_names();
    }

    /// Connector names key the per-source cursors, so repeated names
    /// (two unnamed `[[youtube]]` blocks, say) get a `#n` suffix.
    fn dedupe_connector_names(&mut self) {
        let mut taken = HashSet::new();
        let api_names = self
            .youtube
            .iter_mut()
            .map(|y| &mut y.name)
            .chain(self.newsapi.iter_mut().map(|n| &mut n.name))
            .chain(std::iter::once(&mut self.web.name));
        for name in api_names {
            rename_if_taken(&mut taken, name);
        }
        // rss connectors are exposed as `rss:<name>`
        let mut rss_taken = HashSet::new();
        for r in &mut self.rss {
            rename_if_taken(&mut rss_taken, &mut r.name);
        }
    }
}

fn rename_if_taken(taken: &mut HashSet<String>, name: &mut String) {
    let unique = unique_name(taken, name);
    if unique != *name {
        warn!(from = %name, to = %unique, "duplicate connector name renamed");
        *name = unique;
    }
}

fn resolve_key(raw: &str, env_name: &str, connector: &str) -> String {
    if !raw.trim().eq_ignore_ascii_case("env") {
        return raw.trim().to_string();
    }
    match std::env::var(env_name) {
        Ok(v) => v.trim().to_string(),
        Err(_) => {
            // The connector reports the missing key in its run log entry.
            warn!(connector, env = env_name, "api key env var missing");
            String::new()
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AggregationConfig> {
    if hint_ext == "json" || s.trim_start().starts_with('{') {
        return serde_json::from_str(s).context("json");
    }
    toml::from_str(s).context("toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_match_documented_policy() {
        let c = AggregationConfig::default();
        assert_eq!(c.extractor.oembed_timeout_secs, 5);
        assert_eq!(c.extractor.page_timeout_secs, 8);
        assert_eq!(c.extractor.max_attempts, 3);
        assert_eq!(c.schedule.daily_time(), NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert_eq!(c.schedule.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(c.run.dedup_lookback_days, 30);
    }

    #[test]
    fn toml_sections_and_clamping() {
        let toml = r#"
            [schedule]
            daily_at = "25:99"

            [quality]
            min_confidence = 3.0

            [extractor]
            max_attempts = 0

            [[rss]]
            name = "bbc"
            url = "https://feeds.bbci.co.uk/news/rss.xml"

            [web]
            urls = ["https://example.com/a", "  "]
        "#;
        let mut c = parse_config(toml, "toml").unwrap();
        c.sanitize();
        assert_eq!(c.schedule.daily_at, "06:00");
        assert_eq!(c.quality.min_confidence, 1.0);
        assert_eq!(c.extractor.max_attempts, 1);
        assert_eq!(c.rss.len(), 1);
        assert_eq!(c.web.urls, vec!["https://example.com/a".to_string()]);
        assert_eq!(c.web.name, "web");
    }

    #[serial_test::serial]
    #[test]
    fn env_api_key_is_resolved() {
        env::set_var(ENV_YOUTUBE_KEY, "yt-secret");
        let json = r#"{ "youtube": [{ "api_key": "ENV", "query": "rust" }] }"#;
        let mut c = parse_config(json, "json").unwrap();
        assert_eq!(c.youtube[0].name, "youtube");
        c.resolve_api_keys();
        assert_eq!(c.youtube[0].api_key, "yt-secret");
        env::remove_var(ENV_YOUTUBE_KEY);
    }
}
