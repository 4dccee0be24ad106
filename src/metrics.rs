//! Metrics sink — capability trait plus the Prometheus wiring.
//!
//! The poller only talks to [`RateMetrics`]. The real implementation
//! registers on a registry owned by `main` and shared with the
//! exposition endpoint; tests substitute a recording fake.

use prometheus::{IntCounter, IntGaugeVec, Opts, Registry};

/// What one poll cycle publishes.
pub trait RateMetrics: Send + Sync {
    /// Overwrite the remaining budget for one rate category. Labels
    /// stay stable across cycles; re-publication replaces the value
    /// under the same label.
    fn set_remaining(&self, rate: &str, remaining: i64);

    /// Tally one failed collection cycle.
    fn inc_failures(&self);
}

/// Gauge + counter pair registered on a `prometheus::Registry`.
///
/// Metric names match the exposition format consumed by the existing
/// dashboards, so they are part of the external interface.
pub struct PrometheusMetrics {
    remaining: IntGaugeVec,
    failures: IntCounter,
}

impl PrometheusMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let remaining = IntGaugeVec::new(
            Opts::new(
                "ms_ratelimit_remaining_resource_gauge",
                "Remaining resource reads before reaching the throttling threshold",
            ),
            &["rate"],
        )?;
        let failures = IntCounter::new(
            "ms_ratelimit_failures_total",
            "Number of failures trying to obtain Azure rate limits",
        )?;

        registry.register(Box::new(remaining.clone()))?;
        registry.register(Box::new(failures.clone()))?;

        Ok(Self { remaining, failures })
    }
}

impl RateMetrics for PrometheusMetrics {
    fn set_remaining(&self, rate: &str, remaining: i64) {
        self.remaining.with_label_values(&[rate]).set(remaining);
    }

    fn inc_failures(&self) {
        self.failures.inc();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn render(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_gauge_exposed_per_rate_label() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::register(&registry).unwrap();

        metrics.set_remaining("subscription-reads", 11999);
        metrics.set_remaining("subscription-writes", 1199);

        let text = render(&registry);
        assert!(text.contains(
            "ms_ratelimit_remaining_resource_gauge{rate=\"subscription-reads\"} 11999"
        ));
        assert!(text.contains(
            "ms_ratelimit_remaining_resource_gauge{rate=\"subscription-writes\"} 1199"
        ));
    }

    #[test]
    fn test_gauge_overwrites_previous_value() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::register(&registry).unwrap();

        metrics.set_remaining("subscription-reads", 100);
        metrics.set_remaining("subscription-reads", 99);

        let text = render(&registry);
        assert!(text.contains("ms_ratelimit_remaining_resource_gauge{rate=\"subscription-reads\"} 99"));
        assert!(!text.contains("} 100"));
    }

    #[test]
    fn test_failure_counter_accumulates() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::register(&registry).unwrap();

        metrics.inc_failures();
        metrics.inc_failures();

        let text = render(&registry);
        assert!(text.contains("ms_ratelimit_failures_total 2"));
    }
}
