// src/ingest/providers/mod.rs
pub mod newsapi;
pub mod rss;
pub mod web;
pub mod youtube;

use std::sync::Arc;

use crate::config::AggregationConfig;
use crate::extract::fetch::PageFetcher;
use crate::extract::Extractor;
use crate::ingest::types::Connector;

/// One connector per configured source, in config order.
pub fn build_connectors(
    cfg: &AggregationConfig,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<Extractor>,
) -> Vec<Arc<dyn Connector>> {
    let mut out: Vec<Arc<dyn Connector>> = Vec::new();
    for y in &cfg.youtube {
        out.push(Arc::new(youtube::YoutubeConnector::new(y.clone(), fetcher.clone())));
    }
    for n in &cfg.newsapi {
        out.push(Arc::new(newsapi::NewsApiConnector::new(n.clone(), fetcher.clone())));
    }
    for r in &cfg.rss {
        out.push(Arc::new(rss::RssConnector::from_url(&r.name, &r.url, fetcher.clone())));
    }
    if !cfg.web.urls.is_empty() {
        out.push(Arc::new(web::WebConnector::new(
            &cfg.web,
            extractor,
            cfg.run.connector_timeout(),
        )));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::{ExtractorCfg, RssCfg, YoutubeCfg};
    use crate::extract::fetch::StubFetcher;

    #[test]
    fn builds_one_connector_per_source() {
        let mut cfg = AggregationConfig::default();
        cfg.youtube.push(YoutubeCfg {
            name: "youtube".into(),
            api_key: "k".into(),
            channel_id: Some("UC1".into()),
            query: None,
            max_pages: 1,
            page_size: 10,
        });
        cfg.rss.push(RssCfg {
            name: "wire".into(),
            url: "https://wire.example/feed.xml".into(),
        });
        let fetcher: Arc<dyn PageFetcher> = Arc::new(StubFetcher::new());
        let extractor = Arc::new(Extractor::new(
            fetcher.clone(),
            Arc::new(SystemClock),
            &ExtractorCfg::default(),
        ));

        let names: Vec<String> = build_connectors(&cfg, fetcher, extractor)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        // web has no urls by default and is left out
        assert_eq!(names, vec!["youtube", "rss:wire"]);
    }
}
