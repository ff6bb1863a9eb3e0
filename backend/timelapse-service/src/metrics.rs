use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, TextEncoder};

static ACTIVE_SESSIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "timelapse_active_sessions",
            "Streaming sessions currently holding a connection",
        ),
        &["mode"],
    )
    .expect("failed to create timelapse_active_sessions");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register timelapse_active_sessions");
    gauge
});

static FRAMES_EMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "timelapse_frames_emitted_total",
        "Frames written to streaming clients",
    )
    .expect("failed to create timelapse_frames_emitted_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register timelapse_frames_emitted_total");
    counter
});

static FRAMES_SKIPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "timelapse_frames_skipped_total",
        "Frames skipped because they could not be read",
    )
    .expect("failed to create timelapse_frames_skipped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register timelapse_frames_skipped_total");
    counter
});

static RENDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("timelapse_renders_total", "Encoder invocations by outcome"),
        &["result"],
    )
    .expect("failed to create timelapse_renders_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register timelapse_renders_total");
    counter
});

pub fn session_opened(mode: &str) {
    ACTIVE_SESSIONS.with_label_values(&[mode]).inc();
}

pub fn session_closed(mode: &str) {
    ACTIVE_SESSIONS.with_label_values(&[mode]).dec();
}

pub fn frame_emitted() {
    FRAMES_EMITTED_TOTAL.inc();
}

pub fn frame_skipped() {
    FRAMES_SKIPPED_TOTAL.inc();
}

pub fn render_finished(success: bool) {
    let result = if success { "success" } else { "failure" };
    RENDERS_TOTAL.with_label_values(&[result]).inc();
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
