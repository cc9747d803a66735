use std::time::{Duration, Instant};

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::StatusCode;
use actix_web::{Error, HttpResponse};
use futures::future::{ready, LocalBoxFuture, Ready};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder,
};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_http_requests_total",
            "HTTP requests by surface and status class",
        ),
        &["surface", "status"],
    )
    .expect("failed to create realtime_notify_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "realtime_notify_http_request_duration_seconds",
            "HTTP request latency by surface",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["surface"],
    )
    .expect("failed to create realtime_notify_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register realtime_notify_http_request_duration_seconds");
    histogram
});

static WS_ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_notify_ws_active_connections",
        "Open WebSocket connections",
    )
    .expect("failed to create realtime_notify_ws_active_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_notify_ws_active_connections");
    gauge
});

static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_deliveries_total",
            "Delivery hub outcomes per send",
        ),
        &["outcome"],
    )
    .expect("failed to create realtime_notify_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_deliveries_total");
    counter
});

static BROKER_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_broker_events_total",
            "Broker events handled by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create realtime_notify_broker_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_broker_events_total");
    counter
});

/// Which part of the service a request hit. Keeps label cardinality fixed.
pub fn surface_for(path: &str) -> &'static str {
    match path {
        "/ws" => "websocket_upgrade",
        "/notification" => "notifications",
        p if p.starts_with("/api/v1/ws/") => "connection_status",
        "/health" | "/metrics" | "/" => "ops",
        _ => "unmatched",
    }
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

pub fn observe_http_request(surface: &str, status: StatusCode, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[surface, status_class(status)])
        .inc();
    // Upgrades are counted but not timed.
    if surface != "websocket_upgrade" {
        HTTP_REQUEST_DURATION_SECONDS
            .with_label_values(&[surface])
            .observe(elapsed.as_secs_f64());
    }
}

pub fn connection_opened() {
    WS_ACTIVE_CONNECTIONS.inc();
}

pub fn connections_closed(count: usize) {
    WS_ACTIVE_CONNECTIONS.sub(count as i64);
}

/// `outcome` is `delivered`, `pruned` or a `DeliveryError` label.
pub fn record_delivery(outcome: &str) {
    DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// `outcome` is `persisted`, `malformed` or `persist_failed`.
pub fn record_broker_event(outcome: &str) {
    BROKER_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
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

/// Counts requests per surface and status class
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let surface = surface_for(req.path());
        let start = Instant::now();
        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let status = match &result {
                Ok(response) => response.status(),
                Err(e) => e.as_response_error().status_code(),
            };
            observe_http_request(surface, status, start.elapsed());
            result
        })
    }
}
