use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

use crate::errors::{AppError, Result};

pub struct MetricsService {
    registry: Registry,
    http_requests: IntCounterVec,
    request_duration: HistogramVec,
    sets_created: IntCounter,
    quota_rejections: IntCounter,
    ratings_applied: IntCounter,
}

impl MetricsService {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status"),
            &["method", "route", "status"],
        )
        .map_err(metrics_error)?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "HTTP request latency"),
            &["method", "route"],
        )
        .map_err(metrics_error)?;
        let sets_created = IntCounter::new("flashcard_sets_created_total", "Sets created")
            .map_err(metrics_error)?;
        let quota_rejections = IntCounter::new(
            "quota_rejections_total",
            "Set creations refused by the daily limit",
        )
        .map_err(metrics_error)?;
        let ratings_applied = IntCounter::new("ratings_applied_total", "Ratings applied")
            .map_err(metrics_error)?;

        registry.register(Box::new(http_requests.clone())).map_err(metrics_error)?;
        registry.register(Box::new(request_duration.clone())).map_err(metrics_error)?;
        registry.register(Box::new(sets_created.clone())).map_err(metrics_error)?;
        registry.register(Box::new(quota_rejections.clone())).map_err(metrics_error)?;
        registry.register(Box::new(ratings_applied.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            http_requests,
            request_duration,
            sets_created,
            quota_rejections,
            ratings_applied,
        })
    }

    pub fn record_request(&self, method: &str, route: &str, status: u16, started: Instant) {
        self.http_requests
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.request_duration
            .with_label_values(&[method, route])
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn record_set_created(&self) {
        self.sets_created.inc();
    }

    pub fn record_quota_rejection(&self) {
        self.quota_rejections.inc();
    }

    pub fn record_rating(&self) {
        self.ratings_applied.inc();
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.into()))
    }
}

fn metrics_error(err: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Metrics error: {}", err))
}
