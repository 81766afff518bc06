use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Stages of the audit delivery unit that can fail. Used as the `stage` label on
/// `audit_event_emit_failures_total`.
pub const FAILURE_STAGES: [&str; 5] = ["schema", "validate", "encode", "serialize", "deliver"];

#[derive(Clone)]
pub struct AuditMetrics {
    pub registry: Registry,
    pub records_opened: IntCounter,
    pub records_skipped: IntCounter,
    pub events_delivered: IntCounter,
    pub audit_emit_failures: IntCounterVec,
    pub delivery_duration_seconds: Histogram,
}

impl AuditMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let records_opened = IntCounter::new(
            "audit_records_opened_total",
            "Invocations matched to an audited source",
        )?;
        let records_skipped = IntCounter::new(
            "audit_records_skipped_total",
            "Invocations with no matching audit source",
        )?;
        let events_delivered = IntCounter::new(
            "audit_events_delivered_total",
            "Audit events accepted by the broker",
        )?;
        let audit_emit_failures = IntCounterVec::new(
            Opts::new(
                "audit_event_emit_failures_total",
                "Audit event emission failures",
            ),
            &["stage"],
        )?;
        let delivery_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "audit_event_delivery_duration_seconds",
                "Time spent in a single connect/send/disconnect delivery",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;
        registry.register(Box::new(records_opened.clone()))?;
        registry.register(Box::new(records_skipped.clone()))?;
        registry.register(Box::new(events_delivered.clone()))?;
        registry.register(Box::new(audit_emit_failures.clone()))?;
        registry.register(Box::new(delivery_duration_seconds.clone()))?;
        for stage in FAILURE_STAGES {
            audit_emit_failures.with_label_values(&[stage]);
        }
        Ok(Self {
            registry,
            records_opened,
            records_skipped,
            events_delivered,
            audit_emit_failures,
            delivery_duration_seconds,
        })
    }

    pub fn record_failure(&self, stage: &str) {
        self.audit_emit_failures.with_label_values(&[stage]).inc();
    }

    pub fn failures(&self, stage: &str) -> u64 {
        self.audit_emit_failures.with_label_values(&[stage]).get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_counted_per_stage() {
        let metrics = AuditMetrics::new().unwrap();
        metrics.record_failure("deliver");
        metrics.record_failure("deliver");
        metrics.record_failure("validate");
        assert_eq!(metrics.failures("deliver"), 2);
        assert_eq!(metrics.failures("validate"), 1);
        assert_eq!(metrics.failures("encode"), 0);
    }

    #[test]
    fn render_exposes_registered_families() {
        let metrics = AuditMetrics::new().unwrap();
        metrics.records_opened.inc();
        metrics.record_failure("schema");
        let text = metrics.render().unwrap();
        assert!(text.contains("audit_records_opened_total 1"), "{text}");
        assert!(text.contains("audit_event_emit_failures_total{stage=\"schema\"} 1"), "{text}");
    }
}
