//! Content aggregation service: binary entrypoint.
//! Loads config, wires the pipeline, starts the daily scheduler and serves the HTTP API.

use std::sync::Arc;

use anyhow::Context;
use content_aggregator::{
    api::{self, AppState},
    clock::{Clock, SystemClock},
    config::AggregationConfig,
    coordinator::RunCoordinator,
    extract::{fetch::HttpFetcher, Extractor},
    ingest::scheduler::{spawn_daily_scheduler, DailySchedule},
    metrics::Metrics,
    store::{ContentStore, InMemoryStore},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `LOG_FORMAT=json` switches to JSON lines; otherwise compact text.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("content_aggregator=info,aggregation=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics_route = std::env::var("METRICS_ROUTE")
        .ok()
        .is_some_and(|v| v == "1");
    let metrics = if metrics_route {
        Some(Metrics::init()?)
    } else {
        None
    };

    let cfg = AggregationConfig::load_default().context("loading aggregation config")?;

    let store: Arc<dyn ContentStore> = match &cfg.store.snapshot_path {
        Some(p) => Arc::new(InMemoryStore::with_snapshot(p)?),
        None => Arc::new(InMemoryStore::new()),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = Arc::new(HttpFetcher::new());
    let extractor = Arc::new(Extractor::new(fetcher.clone(), clock.clone(), &cfg.extractor));

    let coordinator = Arc::new(RunCoordinator::from_config(
        &cfg,
        store,
        fetcher,
        extractor.clone(),
        clock.clone(),
    ));

    if cfg.schedule.enabled {
        spawn_daily_scheduler(
            coordinator.clone(),
            DailySchedule::from_cfg(&cfg.schedule),
            clock,
        );
    } else {
        warn!("daily schedule disabled; runs only via POST /aggregation/trigger");
    }

    let mut app = api::router(AppState {
        coordinator,
        extractor,
    });
    if let Some(m) = &metrics {
        app = app.merge(m.router());
    }

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!(bind = %cfg.server.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
