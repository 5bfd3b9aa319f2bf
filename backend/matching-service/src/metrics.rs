use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static HUB_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "matching_hub_connections",
        "Live websocket connections registered in the hub",
    )
    .expect("failed to create matching_hub_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register matching_hub_connections");
    gauge
});

static HUB_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "matching_hub_evictions_total",
        "Connections dropped because their outbound buffer was full",
    )
    .expect("failed to create matching_hub_evictions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register matching_hub_evictions_total");
    counter
});

static GATE_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "matching_gate_rejections_total",
            "Conversation gate decisions that refused the caller",
        ),
        &["operation", "code"],
    )
    .expect("failed to create matching_gate_rejections_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register matching_gate_rejections_total");
    counter
});

static JOB_ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "matching_job_items_total",
            "Items processed by background jobs",
        ),
        &["job", "outcome"],
    )
    .expect("failed to create matching_job_items_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register matching_job_items_total");
    counter
});

pub fn set_connected(count: usize) {
    HUB_CONNECTIONS.set(count as i64);
}

pub fn record_eviction() {
    HUB_EVICTIONS_TOTAL.inc();
}

pub fn record_rejection(operation: &str, code: &str) {
    GATE_REJECTIONS_TOTAL
        .with_label_values(&[operation, code])
        .inc();
}

pub fn record_job_item(job: &str, succeeded: bool) {
    let outcome = if succeeded { "ok" } else { "error" };
    JOB_ITEMS_TOTAL.with_label_values(&[job, outcome]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
