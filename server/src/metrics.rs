//! # Prometheus Metrics
//!
//! Exposes operational metrics for the wallet server. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the server.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct ServerMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of users registered since startup.
    pub registered_users_total: IntCounter,
    /// Total number of successful logins.
    pub logins_total: IntCounter,
    /// Total number of settled transfers, across every flow that moves money.
    pub transfers_total: IntCounter,
    /// Total number of QR charges redeemed.
    pub qr_redemptions_total: IntCounter,
    /// Total number of payment requests resolved (accepted or declined).
    pub requests_resolved_total: IntCounter,
    /// Total number of requests refused for missing, invalid, or expired
    /// credentials.
    pub auth_failures_total: IntCounter,
    /// Current number of live sessions.
    pub active_sessions: IntGauge,
    /// Histogram of settlement latency in seconds.
    pub settlement_latency_seconds: Histogram,
}

impl ServerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("vela".into()), None)
            .expect("failed to create prometheus registry");

        let registered_users_total = IntCounter::new(
            "registered_users_total",
            "Total number of users registered since startup",
        )
        .expect("metric creation");
        registry
            .register(Box::new(registered_users_total.clone()))
            .expect("metric registration");

        let logins_total = IntCounter::new("logins_total", "Total number of successful logins")
            .expect("metric creation");
        registry
            .register(Box::new(logins_total.clone()))
            .expect("metric registration");

        let transfers_total = IntCounter::new(
            "transfers_total",
            "Total number of settled transfers across all flows",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transfers_total.clone()))
            .expect("metric registration");

        let qr_redemptions_total = IntCounter::new(
            "qr_redemptions_total",
            "Total number of QR charges redeemed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(qr_redemptions_total.clone()))
            .expect("metric registration");

        let requests_resolved_total = IntCounter::new(
            "requests_resolved_total",
            "Total number of payment requests accepted or declined",
        )
        .expect("metric creation");
        registry
            .register(Box::new(requests_resolved_total.clone()))
            .expect("metric registration");

        let auth_failures_total = IntCounter::new(
            "auth_failures_total",
            "Total number of requests refused for bad credentials or sessions",
        )
        .expect("metric creation");
        registry
            .register(Box::new(auth_failures_total.clone()))
            .expect("metric registration");

        let active_sessions = IntGauge::new("active_sessions", "Current number of live sessions")
            .expect("metric creation");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("metric registration");

        let settlement_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_latency_seconds",
                "End-to-end settlement latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(settlement_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            registered_users_total,
            logins_total,
            transfers_total,
            qr_redemptions_total,
            requests_resolved_total,
            auth_failures_total,
            active_sessions,
            settlement_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<ServerMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_encode() {
        let metrics = ServerMetrics::new();
        metrics.registered_users_total.inc();
        metrics.transfers_total.inc_by(3);
        metrics.auth_failures_total.inc();
        metrics.active_sessions.set(2);
        metrics.settlement_latency_seconds.observe(0.012);

        let body = metrics.encode().unwrap();
        assert!(body.contains("vela_registered_users_total 1"));
        assert!(body.contains("vela_transfers_total 3"));
        assert!(body.contains("vela_auth_failures_total 1"));
        assert!(body.contains("vela_active_sessions 2"));
        assert!(body.contains("vela_settlement_latency_seconds_count 1"));
    }
}
