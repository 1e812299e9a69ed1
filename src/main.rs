//! InvestRight feeds service: binary entrypoint.
//! Loads feed configuration, wires the shared service and serves the JSON API.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use investright_feeds::{api, config, metrics::Metrics, FeedService};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FEEDS_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("FEEDS_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fetch=info,sentiment=info,cache=info,warn"));

    // The runtime may already own a global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = config::load_default().context("loading feeds config")?;
    tracing::info!(
        datasets = cfg.datasets.len(),
        templates = cfg.sentiment.templates.len(),
        "feeds config loaded"
    );

    let metrics = match Metrics::init(&cfg) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed; /metrics disabled");
            None
        }
    };

    let service = Arc::new(FeedService::from_config(cfg).context("building feed service")?);
    let router = match &metrics {
        Some(m) => api::router_with_metrics(service, m),
        None => api::router(service),
    };

    Ok(router.into())
}
