//! Prometheus metrics for the custody server.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no case or evidence names, only aggregate counts.
//! Restrict the endpoint to scraper addresses at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static CASES_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("custody_cases_created_total", "Total number of cases created")
        .expect("metric creation failed")
});

pub static EVIDENCE_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "custody_evidence_created_total",
        "Total number of evidence items created",
    )
    .expect("metric creation failed")
});

pub static EVIDENCE_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "custody_evidence_deleted_total",
        "Total number of evidence items deleted",
    )
    .expect("metric creation failed")
});

pub static EVIDENCE_ROLLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "custody_evidence_rollbacks_total",
        "Blobs removed after a failed evidence metadata insert",
    )
    .expect("metric creation failed")
});

pub static EVIDENCE_INCONSISTENCIES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "custody_evidence_inconsistencies_total",
            "Cross-store inconsistencies left behind, by state",
        ),
        &["state"],
    )
    .expect("metric creation failed")
});

pub static TOKENS_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "custody_tokens_issued_total",
        "Total number of authentication tokens issued",
    )
    .expect("metric creation failed")
});

pub static AUTH_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "custody_auth_rejections_total",
            "Requests rejected by the access gate, by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CASES_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EVIDENCE_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EVIDENCE_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EVIDENCE_ROLLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EVIDENCE_INCONSISTENCIES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_ISSUED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUTH_REJECTIONS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a residual inconsistency by its state label.
pub fn record_inconsistency(state: &str) {
    EVIDENCE_INCONSISTENCIES.with_label_values(&[state]).inc();
}
