// =============================================================================
// Metrics — Prometheus counters and histograms for the decision path
// =============================================================================
//
// One registry per engine instance so tests get isolated metrics. Metric
// emission happens after the response is built and must never fail a
// decision; registration errors surface once at construction.
// =============================================================================

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use crate::orchestrator::Decision;

/// Latency buckets covering 1 ms .. 1 s, in seconds.
const LATENCY_BUCKETS: [f64; 10] = [
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Finer buckets for sub-phase timings (rule pass, pattern scan).
const PHASE_BUCKETS: [f64; 8] = [
    0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05,
];

pub struct EngineMetrics {
    registry: Registry,

    request_count: IntCounter,
    request_latency: Histogram,
    decision_count: IntCounterVec,

    rule_evaluation_latency: Histogram,
    rule_hit_count: IntCounterVec,
    evaluation_truncated: IntCounter,

    pattern_match_count: IntCounterVec,
    pattern_match_latency: Histogram,

    error_count: IntCounterVec,
    reload_count: IntCounterVec,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_count = IntCounter::with_opts(Opts::new(
            "meridian_requests_total",
            "Total decision requests received",
        ))?;

        let request_latency = Histogram::with_opts(
            HistogramOpts::new(
                "meridian_request_latency_seconds",
                "End-to-end decision latency",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;

        let decision_count = IntCounterVec::new(
            Opts::new("meridian_decisions_total", "Decisions by outcome"),
            &["decision"],
        )?;

        let rule_evaluation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "meridian_rule_evaluation_seconds",
                "Rule engine single-pass latency",
            )
            .buckets(PHASE_BUCKETS.to_vec()),
        )?;

        let rule_hit_count = IntCounterVec::new(
            Opts::new("meridian_rule_hits_total", "Rule hits by rule id"),
            &["rule_id"],
        )?;

        let evaluation_truncated = IntCounter::with_opts(Opts::new(
            "meridian_evaluations_truncated_total",
            "Evaluations cut short by the rule budget",
        ))?;

        let pattern_match_count = IntCounterVec::new(
            Opts::new("meridian_pattern_matches_total", "Pattern hits by category"),
            &["category"],
        )?;

        let pattern_match_latency = Histogram::with_opts(
            HistogramOpts::new(
                "meridian_pattern_match_seconds",
                "Pattern scan latency per request",
            )
            .buckets(PHASE_BUCKETS.to_vec()),
        )?;

        let error_count = IntCounterVec::new(
            Opts::new("meridian_errors_total", "Errors by component and kind"),
            &["component", "kind"],
        )?;

        let reload_count = IntCounterVec::new(
            Opts::new("meridian_reloads_total", "Configuration reloads by artifact and outcome"),
            &["artifact", "outcome"],
        )?;

        registry.register(Box::new(request_count.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;
        registry.register(Box::new(decision_count.clone()))?;
        registry.register(Box::new(rule_evaluation_latency.clone()))?;
        registry.register(Box::new(rule_hit_count.clone()))?;
        registry.register(Box::new(evaluation_truncated.clone()))?;
        registry.register(Box::new(pattern_match_count.clone()))?;
        registry.register(Box::new(pattern_match_latency.clone()))?;
        registry.register(Box::new(error_count.clone()))?;
        registry.register(Box::new(reload_count.clone()))?;

        Ok(Self {
            registry,
            request_count,
            request_latency,
            decision_count,
            rule_evaluation_latency,
            rule_hit_count,
            evaluation_truncated,
            pattern_match_count,
            pattern_match_latency,
            error_count,
            reload_count,
        })
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    pub fn record_request(&self) {
        self.request_count.inc();
    }

    pub fn record_decision(&self, decision: Decision, latency_seconds: f64) {
        self.decision_count
            .with_label_values(&[decision.as_str()])
            .inc();
        self.request_latency.observe(latency_seconds);
    }

    pub fn record_rule_evaluation(&self, seconds: f64, triggered_rule_ids: &[&str]) {
        self.rule_evaluation_latency.observe(seconds);
        for rule_id in triggered_rule_ids {
            self.rule_hit_count.with_label_values(&[rule_id]).inc();
        }
    }

    pub fn record_truncation(&self) {
        self.evaluation_truncated.inc();
    }

    pub fn record_pattern_scan(&self, seconds: f64, blacklist_hits: usize, whitelist_hits: usize) {
        self.pattern_match_latency.observe(seconds);
        if blacklist_hits > 0 {
            self.pattern_match_count
                .with_label_values(&["blacklist"])
                .inc_by(blacklist_hits as u64);
        }
        if whitelist_hits > 0 {
            self.pattern_match_count
                .with_label_values(&["whitelist"])
                .inc_by(whitelist_hits as u64);
        }
    }

    pub fn record_error(&self, component: &str, kind: &str) {
        self.error_count.with_label_values(&[component, kind]).inc();
    }

    pub fn record_reload(&self, artifact: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.reload_count
            .with_label_values(&[artifact, outcome])
            .inc();
    }

    // -------------------------------------------------------------------------
    // Exposition
    // -------------------------------------------------------------------------

    /// Render the registry in Prometheus text exposition format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_and_gathers() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.record_request();
        metrics.record_decision(Decision::Approve, 0.002);
        metrics.record_rule_evaluation(0.0004, &["high_value", "bot_agent"]);
        metrics.record_pattern_scan(0.0002, 2, 1);
        metrics.record_error("orchestrator", "invalid_request");
        metrics.record_reload("rules", true);

        let text = metrics.gather();
        assert!(text.contains("meridian_requests_total 1"));
        assert!(text.contains("meridian_decisions_total"));
        assert!(text.contains("decision=\"APPROVE\""));
        assert!(text.contains("rule_id=\"high_value\""));
        assert!(text.contains("category=\"blacklist\""));
        assert!(text.contains("component=\"orchestrator\""));
    }

    #[test]
    fn separate_instances_are_isolated() {
        let a = EngineMetrics::new().unwrap();
        let b = EngineMetrics::new().unwrap();
        a.record_request();
        assert!(a.gather().contains("meridian_requests_total 1"));
        assert!(b.gather().contains("meridian_requests_total 0"));
    }
}
