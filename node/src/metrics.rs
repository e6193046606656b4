//! # Prometheus Metrics
//!
//! Conversion metrics for the swap node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `gacha` prefix so they do not collide with the default registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use gacha_contracts::ConversionReceipt;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are reference counted) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct SwapMetrics {
    registry: Registry,
    /// Conversions that reached `Complete`.
    pub conversions_succeeded_total: IntCounter,
    /// Rejected conversions, labelled by error kind.
    pub conversions_rejected_total: IntCounterVec,
    /// Destination units paid out of the reserve.
    pub units_converted_total: IntCounter,
    /// Surplus value kept by the reserve.
    pub value_forfeited_total: IntCounter,
    /// Wall-clock time spent in `convert`, including the ledger lock wait.
    pub conversion_latency_seconds: Histogram,
}

impl SwapMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("gacha".into()), None)?;

        let conversions_succeeded_total = IntCounter::new(
            "conversions_succeeded_total",
            "Total number of completed conversions",
        )?;
        registry.register(Box::new(conversions_succeeded_total.clone()))?;

        let conversions_rejected_total = IntCounterVec::new(
            Opts::new(
                "conversions_rejected_total",
                "Total number of rejected conversions by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(conversions_rejected_total.clone()))?;

        let units_converted_total = IntCounter::new(
            "units_converted_total",
            "Total destination units paid out of the reserve",
        )?;
        registry.register(Box::new(units_converted_total.clone()))?;

        let value_forfeited_total = IntCounter::new(
            "value_forfeited_total",
            "Total surplus value forfeited to the reserve",
        )?;
        registry.register(Box::new(value_forfeited_total.clone()))?;

        let conversion_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "conversion_latency_seconds",
                "Conversion processing latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(conversion_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            conversions_succeeded_total,
            conversions_rejected_total,
            units_converted_total,
            value_forfeited_total,
            conversion_latency_seconds,
        })
    }

    /// Records a conversion whose result was persisted.
    pub fn observe_completed(&self, receipt: &ConversionReceipt, elapsed_secs: f64) {
        self.conversion_latency_seconds.observe(elapsed_secs);
        self.conversions_succeeded_total.inc();
        self.units_converted_total.inc_by(receipt.received);
        self.value_forfeited_total.inc_by(receipt.forfeited_value);
    }

    /// Records a conversion that left the ledger unchanged, labelled with
    /// its failure kind.
    pub fn observe_rejected(&self, kind: &str, elapsed_secs: f64) {
        self.conversion_latency_seconds.observe(elapsed_secs);
        self.conversions_rejected_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<SwapMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
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
    use gacha_protocol::ledger::Rank;

    fn receipt(forfeited: u64) -> ConversionReceipt {
        ConversionReceipt {
            receipt_id: "r".into(),
            holder: "alice".into(),
            destination: Rank(8),
            received: 1,
            consumed: vec![],
            offered_value: 12 + forfeited,
            required_value: 12,
            forfeited_value: forfeited,
            completed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn outcomes_are_counted() {
        let m = SwapMetrics::new().unwrap();
        m.observe_completed(&receipt(3), 0.001);
        m.observe_completed(&receipt(0), 0.001);
        m.observe_rejected("arithmetic_overflow", 0.001);

        assert_eq!(m.conversions_succeeded_total.get(), 2);
        assert_eq!(m.units_converted_total.get(), 2);
        assert_eq!(m.value_forfeited_total.get(), 3);
        assert_eq!(
            m.conversions_rejected_total
                .with_label_values(&["arithmetic_overflow"])
                .get(),
            1
        );
        assert_eq!(m.conversion_latency_seconds.get_sample_count(), 3);
    }

    #[test]
    fn encoding_uses_the_gacha_prefix() {
        let m = SwapMetrics::new().unwrap();
        m.conversions_succeeded_total.inc();
        let text = m.encode().unwrap();
        assert!(text.contains("gacha_conversions_succeeded_total 1"));
    }
}
