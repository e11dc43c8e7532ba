use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::time::Duration;

/// Metric name prefix for all what's-new metrics
const PREFIX: &str = "whatsnew";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Feed Metrics
    pub static ref FEED_ITEMS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_feed_items"), "Retained feed items per category"),
        &["category"]
    ).expect("Failed to create feed_items metric");

    pub static ref FEED_MUTATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_feed_mutations_total"), "Feed mutations that changed content"),
        &["operation"]
    ).expect("Failed to create feed_mutations_total metric");

    pub static ref VIEW_CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_view_cache_lookups_total"), "Per-user view cache lookups"),
        &["result"]
    ).expect("Failed to create view_cache_lookups_total metric");

    pub static ref REFRESH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_refresh_requests_total"), "Manual refresh requests by outcome"),
        &["outcome"]
    ).expect("Failed to create refresh_requests_total metric");

    pub static ref PERSISTENCE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_persistence_errors_total"), "Snapshot read/write failures"),
        &["snapshot", "operation"]
    ).expect("Failed to create persistence_errors_total metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job executions"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 1.0, 10.0, 60.0, 300.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(FEED_ITEMS.clone()));
    let _ = REGISTRY.register(Box::new(FEED_MUTATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(VIEW_CACHE_LOOKUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REFRESH_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PERSISTENCE_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Replace the per-category feed gauges with the given counts.
pub fn set_feed_items(counts: &HashMap<&str, usize>) {
    FEED_ITEMS.reset();
    for (category, count) in counts {
        FEED_ITEMS.with_label_values(&[*category]).set(*count as f64);
    }
}

pub fn record_feed_mutation(operation: &str) {
    FEED_MUTATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_view_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    VIEW_CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_refresh_request(outcome: &str) {
    REFRESH_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_persistence_error(snapshot: &str, operation: &str) {
    PERSISTENCE_ERRORS_TOTAL
        .with_label_values(&[snapshot, operation])
        .inc();
}

pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
        }
    }
}
