// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /aggregation/status, /aggregation/logs, /aggregation/logs/latest
// - POST /aggregation/trigger (200 with RunLog, 409 while running)
// - POST /extract (200 metadata, 400 on malformed URL)

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http::{Request, StatusCode};
use serde_json::json;
use serde_json::Value as Json;
use tokio::sync::Notify;
use tower::ServiceExt as _; // for `oneshot`

use content_aggregator::clock::ManualClock;
use content_aggregator::config::{ExtractorCfg, RunCfg};
use content_aggregator::content::{CandidateMeta, ContentCandidate, Platform};
use content_aggregator::coordinator::RunCoordinator;
use content_aggregator::extract::fetch::{FetchedPage, StubFetcher};
use content_aggregator::extract::Extractor;
use content_aggregator::ingest::ingestor::QualityPolicy;
use content_aggregator::ingest::types::{Connector, ConnectorBatch};
use content_aggregator::store::InMemoryStore;
use content_aggregator::{router, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

struct OneItem {
    gate: Option<Arc<(Notify, Notify)>>,
}

#[async_trait]
impl Connector for OneItem {
    fn name(&self) -> &str {
        "one"
    }

    async fn fetch_candidates(&self, _since: Option<DateTime<Utc>>) -> ConnectorBatch {
        if let Some(g) = &self.gate {
            g.0.notify_one();
            g.1.notified().await;
        }
        let mut m = CandidateMeta::new(Platform::Rss, "Ferry schedule changes", "https://f.example/1");
        m.source_id = Some("f-1".into());
        ConnectorBatch::ok(vec![ContentCandidate::news(m)])
    }
}

/// Build the same Router the binary uses, over stubbed collaborators.
fn test_router(gate: Option<Arc<(Notify, Notify)>>) -> Router {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 8, 1, 11, 0, 0).unwrap(),
    ));
    let fetcher = Arc::new(StubFetcher::new().on(
        "https://site.example/",
        Ok(FetchedPage::ok(
            "text/html",
            r#"<html><head><title>Lighthouse restored</title>
               <meta name="description" content="The 1890 lighthouse reopens to visitors this weekend."></head></html>"#,
        )),
    ));
    let extractor = Arc::new(Extractor::new(fetcher, clock.clone(), &ExtractorCfg::default()));
    let coordinator = Arc::new(RunCoordinator::new(
        vec![Arc::new(OneItem { gate })],
        Arc::new(InMemoryStore::new()),
        clock,
        &RunCfg::default(),
        QualityPolicy::default(),
        "Daily at 06:00 (UTC-05:00)",
    ));
    router(AppState {
        coordinator,
        extractor,
    })
}

async fn send(app: Router, method: &str, uri: &str, payload: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match payload {
        Some(b) => {
            req = req.header("content-type", "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_router(None);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "ok");
}

#[tokio::test]
async fn status_and_logs_start_empty() {
    let app = test_router(None);

    let (code, st) = send(app.clone(), "GET", "/aggregation/status", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(st["isRunning"], false);
    assert_eq!(st["totalRuns"], 0);
    assert_eq!(st["nextRunDescription"], "Daily at 06:00 (UTC-05:00)");
    assert!(st["lastRun"].is_null());

    let (_, logs) = send(app.clone(), "GET", "/aggregation/logs", None).await;
    assert_eq!(logs, json!([]));

    let (code, latest) = send(app, "GET", "/aggregation/logs/latest", None).await;
    assert_eq!(code, StatusCode::OK);
    assert!(latest.is_null());
}

#[tokio::test]
async fn trigger_returns_run_log_and_updates_status() {
    let app = test_router(None);

    let (code, log) = send(app.clone(), "POST", "/aggregation/trigger", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(log["totalItems"], 1);
    assert_eq!(log["successCount"], 1);
    assert_eq!(log["manual"], true);
    assert_eq!(log["perSourceResults"][0]["platform"], "one");

    let (_, st) = send(app.clone(), "GET", "/aggregation/status", None).await;
    assert_eq!(st["totalRuns"], 1);
    assert_eq!(st["averageItemsPerRun"], 1.0);

    let (_, latest) = send(app.clone(), "GET", "/aggregation/logs/latest", None).await;
    assert_eq!(latest, log);

    let (_, logs) = send(app, "GET", "/aggregation/logs", None).await;
    assert_eq!(logs.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn trigger_while_running_is_409() {
    let gate = Arc::new((Notify::new(), Notify::new()));
    let app = test_router(Some(gate.clone()));

    let first = tokio::spawn(send(app.clone(), "POST", "/aggregation/trigger", None));
    gate.0.notified().await;

    let (_, st) = send(app.clone(), "GET", "/aggregation/status", None).await;
    assert_eq!(st["isRunning"], true);

    let (code, err) = send(app.clone(), "POST", "/aggregation/trigger", None).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(err["error"], "already_running");

    gate.1.notify_one();
    let (code, _) = first.await.unwrap();
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn extract_returns_metadata() {
    let app = test_router(None);
    let (code, meta) = send(
        app,
        "POST",
        "/extract",
        Some(json!({ "url": "https://site.example/lighthouse" })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(meta["type"], "news");
    assert_eq!(meta["platform"], "web");
    assert_eq!(meta["title"], "Lighthouse restored");
    assert_eq!(meta["degraded"], false);
}

#[tokio::test]
async fn extract_rejects_malformed_url() {
    let app = test_router(None);
    let (code, err) = send(app, "POST", "/extract", Some(json!({ "url": "not a url" }))).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_input");
}
