//! Core shared utilities for recommendation services.

use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, TextEncoder};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod resilience;
pub use resilience::{retry_async, retry_async_if, RetryConfig};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

/// Env var naming an optional config file layered under the `RECSYS__*` environment.
pub const CONFIG_FILE_ENV: &str = "RECSYS_CONFIG_FILE";
/// Env var switching log output to flattened JSON lines.
pub const JSON_LOG_ENV: &str = "RECSYS_JSON_LOG";

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }
pub fn is_live() -> bool { NODE_LIVENESS.load(Ordering::SeqCst) }

fn json_logging_requested() -> bool {
    std::env::var(JSON_LOG_ENV).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Installs the global tracing subscriber. Safe to call more than once; only the first call wins.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json_logging_requested() {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false))
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(true))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(service, "tracing initialized");
    Ok(())
}

/// Layered settings: `defaults`, then the optional file named by `RECSYS_CONFIG_FILE`,
/// then `RECSYS__*` environment variables (`__` separates nested keys).
pub fn load_config<T: DeserializeOwned>(service: &str, defaults: &[(&str, &str)]) -> Result<T> {
    let mut builder = config::Config::builder().set_default("service_name", service)?;
    for (key, value) in defaults {
        builder = builder.set_default(*key, *value)?;
    }
    if let Ok(file) = std::env::var(CONFIG_FILE_ENV) {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("RECSYS").separator("__").try_parsing(true));
    let cfg = builder.build()?;
    Ok(cfg.try_deserialize()?)
}

/// Liveness, readiness and Prometheus endpoints, mergeable into any service router.
pub fn probe_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/live", get(|| async { Json(serde_json::json!({"live": is_live()})) }))
        .route("/ready", get(|| async { Json(serde_json::json!({"ready": is_ready()})) }))
        .route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> Response {
    let metric_families = prometheus::default_registry().gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}
