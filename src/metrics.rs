/// Prometheus metrics for the booking service
///
/// Every series is prefixed with `appoint_` and registered in the default
/// registry, which `/metrics` renders.
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

lazy_static! {
    /// Requests served, labelled by matched route
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appoint_http_requests_total",
        "Requests served per route and status",
        &["method", "route", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "appoint_http_request_duration_seconds",
        "Time spent handling a request",
        &["method", "route"],
        LATENCY_BUCKETS.to_vec()
    )
    .unwrap();

    /// Appointments created, by acting role
    pub static ref APPOINTMENTS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appoint_appointments_created_total",
        "Appointments created per acting role",
        &["actor"]
    )
    .unwrap();

    /// Create/update attempts refused by a booking rule
    pub static ref SCHEDULING_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appoint_scheduling_rejections_total",
        "Booking attempts refused per rule",
        &["reason"]
    )
    .unwrap();

    pub static ref OTP_ISSUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appoint_otp_issued_total",
        "One-time codes issued per purpose",
        &["purpose"]
    )
    .unwrap();

    pub static ref OTP_VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appoint_otp_verifications_total",
        "One-time code checks per outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appoint_rate_limited_total",
        "Requests turned away per limiter scope",
        &["scope"]
    )
    .unwrap();

    /// Maintenance loop iterations
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appoint_jobs_total",
        "Maintenance job runs per job and result",
        &["job", "result"]
    )
    .unwrap();

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "appoint_job_duration_seconds",
        "Maintenance job run time",
        &["job"],
        vec![0.001, 0.01, 0.1, 1.0, 10.0]
    )
    .unwrap();
}

/// Text exposition of the default registry
pub fn render_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_http_request(method: &str, route: &str, status: u16, seconds: f64) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route])
        .observe(seconds);
}

pub fn record_appointment_created(actor: &str) {
    APPOINTMENTS_CREATED_TOTAL.with_label_values(&[actor]).inc();
}

pub fn record_scheduling_rejection(reason: &str) {
    SCHEDULING_REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_rate_limited(scope: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[scope]).inc();
}

pub fn record_background_job(job: &str, result: &str, seconds: f64) {
    BACKGROUND_JOBS_TOTAL.with_label_values(&[job, result]).inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(seconds);
}
