use crate::registry::ServingState;
use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct ServingMetrics {
    pub predict_total: IntCounterVec,
    pub reload_total: IntCounterVec,
    pub reload_duration_seconds: Histogram,
    pub model_generation: IntGauge,
    pub model_size_bytes: IntGauge,
}

fn register<C: prometheus::core::Collector + Clone + 'static>(collector: C) -> C {
    if let Err(e) = prometheus::register(Box::new(collector.clone())) {
        warn!(error = %e, "metric registration skipped");
    }
    collector
}

pub static SERVING_METRICS: Lazy<ServingMetrics> = Lazy::new(|| ServingMetrics {
    predict_total: register(IntCounterVec::new(Opts::new("recsys_predict_total", "Predictions served, by reason"), &["reason"])
        .expect("valid predict counter")),
    reload_total: register(IntCounterVec::new(Opts::new("recsys_reload_total", "Reload attempts, by outcome"), &["outcome"])
        .expect("valid reload counter")),
    reload_duration_seconds: register(Histogram::with_opts(HistogramOpts::new("recsys_reload_duration_seconds", "Locate+load+swap latency")
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]))
        .expect("valid reload histogram")),
    model_generation: register(IntGauge::new("recsys_model_generation", "Generation of the active model").expect("valid generation gauge")),
    model_size_bytes: register(IntGauge::new("recsys_model_size_bytes", "Artifact size of the active model").expect("valid size gauge")),
});

pub fn serving_metrics() -> &'static ServingMetrics { &SERVING_METRICS }

pub fn record_active(state: &ServingState) {
    let m = serving_metrics();
    m.model_generation.set(state.generation as i64);
    m.model_size_bytes.set(state.metadata.size_bytes.unwrap_or(0) as i64);
}
