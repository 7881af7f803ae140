// =============================================================================
// Decision Orchestrator — request in, APPROVE / REVIEW / DECLINE out
// =============================================================================
//
// Per request: validate the envelope, parse, scan patterns, build the rule
// context, run the rule pass, fuse rule contributions with the fixed
// categorical adjustments and the pattern score, clamp to [0, 100], apply
// thresholds, and emit the response with its audit trail.
//
// Pattern matching always completes before rule evaluation starts; metrics
// are emitted after the response body is built.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

use crate::config::ConfigStore;
use crate::error::{DecisionError, ErrorKind};
use crate::metrics::EngineMetrics;
use crate::patterns::{MatcherState, PatternCategory, PatternMatcher};
use crate::request::{Request, MAX_BODY_BYTES};
use crate::rules::{RuleContext, RuleEngine};
use crate::trace::TraceId;

// =============================================================================
// Decision & response
// =============================================================================

/// Final verdict for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "APPROVE")]
    Approve,
    #[serde(rename = "REVIEW")]
    Review,
    #[serde(rename = "DECLINE")]
    Decline,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Review => "REVIEW",
            Self::Decline => "DECLINE",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision response document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub decision: Decision,
    /// Clamped to [0, 100], two decimal places.
    pub risk_score: f64,
    /// Triggered rule ids, categorical adjustments, and contributing pattern
    /// hits, in contribution order.
    #[serde(rename = "reasons")]
    pub triggered_rules: Vec<String>,
    pub latency_ms: f64,
    pub model_version: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

// =============================================================================
// Fusion constants
// =============================================================================

/// Currencies that carry no foreign-exchange adjustment.
const MAJOR_CURRENCIES: [&str; 7] = ["USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF"];

const HIGH_AMOUNT_THRESHOLD: f64 = 10_000.0;
const HIGH_CUSTOMER_RISK_THRESHOLD: f64 = 70.0;
const NEW_ACCOUNT_AGE_DAYS: f64 = 30.0;

const HIGH_AMOUNT_ADJUSTMENT: f64 = 25.0;
const NON_MAJOR_CURRENCY_ADJUSTMENT: f64 = 15.0;
const HIGH_CUSTOMER_RISK_ADJUSTMENT: f64 = 30.0;
const NEW_ACCOUNT_ADJUSTMENT: f64 = 20.0;
const PRIVATE_IP_ADJUSTMENT: f64 = 10.0;

// =============================================================================
// Health / readiness
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub components: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadyReport {
    pub status: &'static str,
    pub dependencies: BTreeMap<String, String>,
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct DecisionOrchestrator {
    config: Arc<ConfigStore>,
    rules: Arc<RuleEngine>,
    patterns: Arc<PatternMatcher>,
    metrics: Arc<EngineMetrics>,
}

impl DecisionOrchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        rules: Arc<RuleEngine>,
        patterns: Arc<PatternMatcher>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            rules,
            patterns,
            metrics,
        }
    }

    /// Process one decision request from its raw body.
    pub fn process_decision(&self, body: &str) -> Result<Response, DecisionError> {
        let started = Instant::now();
        self.metrics.record_request();

        let trace_id = TraceId::generate();
        let _trace = crate::trace::scope(trace_id.clone());
        let span = info_span!("decision", trace_id = %trace_id);
        let _entered = span.enter();

        match self.decide(body, started) {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(error = %e, "decision rejected");
                self.metrics.record_error("orchestrator", e.kind().as_str());
                Err(e)
            }
        }
    }

    fn decide(&self, body: &str, started: Instant) -> Result<Response, DecisionError> {
        // ── 1. Envelope checks ───────────────────────────────────────────
        if body.is_empty() {
            return Err(DecisionError::invalid_request("empty request body"));
        }
        if body.len() > MAX_BODY_BYTES {
            return Err(DecisionError::invalid_request(format!(
                "request body exceeds {MAX_BODY_BYTES} bytes"
            )));
        }

        // ── 2. Parse & validate ──────────────────────────────────────────
        let request = Request::parse(body)?;

        // ── 3. Pattern scan (completes before rule evaluation) ───────────
        let scan = self.patterns.match_transaction(&request, None);
        self.metrics.record_pattern_scan(
            scan.evaluation_time_us as f64 / 1e6,
            scan.blacklist_matches.len(),
            scan.whitelist_matches.len(),
        );

        let ip_blacklisted = !self
            .patterns
            .match_text(&request.device.ip, Some(PatternCategory::Blacklist))
            .matches
            .is_empty();

        // ── 4. Rule context & evaluation ─────────────────────────────────
        let mut context = RuleContext::from_request(&request);
        if ip_blacklisted {
            context.ip_blacklist_match = 1.0;
        }
        if !context.is_evaluable() {
            return Err(DecisionError::invalid_request(
                "request lacks an evaluable context",
            ));
        }

        let budget = Duration::from_secs_f64(self.config.performance().target_p99_ms / 1_000.0);
        let evaluation = self.rules.evaluate_rules_with_budget(&context, Some(budget));

        let triggered_ids: Vec<&str> = evaluation
            .results
            .iter()
            .filter(|r| r.triggered)
            .map(|r| r.rule_id.as_str())
            .collect();
        self.metrics.record_rule_evaluation(
            evaluation.total_evaluation_time_us as f64 / 1e6,
            &triggered_ids,
        );
        if evaluation.truncated {
            self.metrics.record_truncation();
        }
        for result in evaluation.results.iter().filter(|r| r.debug_info.is_some()) {
            debug!(rule_id = %result.rule_id, "rule excluded from contribution");
            self.metrics
                .record_error("rule_engine", ErrorKind::RuleEvaluation.as_str());
        }

        // ── 5. Fusion ────────────────────────────────────────────────────
        let mut score = evaluation.total_score;
        let mut reasons: Vec<String> = triggered_ids.iter().map(|s| s.to_string()).collect();

        if request.transaction.amount > HIGH_AMOUNT_THRESHOLD {
            score += HIGH_AMOUNT_ADJUSTMENT;
            reasons.push("high_amount".to_string());
        }
        if !MAJOR_CURRENCIES.contains(&request.transaction.currency.as_str()) {
            score += NON_MAJOR_CURRENCY_ADJUSTMENT;
            reasons.push("non_major_currency".to_string());
        }
        if request.customer.risk_score > HIGH_CUSTOMER_RISK_THRESHOLD {
            score += HIGH_CUSTOMER_RISK_ADJUSTMENT;
            reasons.push("high_customer_risk".to_string());
        }
        if context.account_age_days < NEW_ACCOUNT_AGE_DAYS {
            score += NEW_ACCOUNT_ADJUSTMENT;
            reasons.push("new_account".to_string());
        }
        if request.has_private_source_ip() {
            score += PRIVATE_IP_ADJUSTMENT;
            reasons.push("private_ip".to_string());
        }

        score += scan.score();
        for hit in &scan.blacklist_matches {
            let reason = format!("pattern:{}", hit.pattern_name);
            if !reasons.contains(&reason) {
                reasons.push(reason);
            }
        }
        if ip_blacklisted && scan.blacklist_matches.is_empty() {
            // The targeted ip scan can see a database reloaded after the full
            // scan; still name the hit in the audit trail.
            reasons.push("pattern:ip".to_string());
        }

        let score = (score.clamp(0.0, 100.0) * 100.0).round() / 100.0;

        // ── 6. Threshold decision ────────────────────────────────────────
        let thresholds = evaluation.thresholds;
        let mut decision = if score < thresholds.approve_threshold {
            Decision::Approve
        } else if score >= thresholds.review_threshold {
            Decision::Decline
        } else {
            Decision::Review
        };

        // High-risk conditions override the thresholds downward only.
        let high_risk = request.customer.risk_score > HIGH_CUSTOMER_RISK_THRESHOLD
            || request.transaction.amount > HIGH_AMOUNT_THRESHOLD;
        if high_risk {
            decision = Decision::Decline;
        }
        if evaluation.truncated && decision == Decision::Approve {
            decision = Decision::Review;
        }

        // ── 7. Response ──────────────────────────────────────────────────
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let response = Response {
            request_id: request.request_id.clone(),
            decision,
            risk_score: score,
            triggered_rules: reasons,
            latency_ms: (latency_ms * 100.0).round() / 100.0,
            model_version: self.config.snapshot().model_version.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        debug!(
            request_id = %response.request_id,
            decision = %response.decision,
            risk_score = response.risk_score,
            rules_evaluated = evaluation.rules_evaluated,
            rules_triggered = evaluation.rules_triggered,
            latency_ms = response.latency_ms,
            "decision complete"
        );

        // ── 8. Metrics (after the response body is built) ────────────────
        self.metrics
            .record_decision(decision, started.elapsed().as_secs_f64());

        Ok(response)
    }

    // -------------------------------------------------------------------------
    // Health & readiness
    // -------------------------------------------------------------------------

    pub fn health(&self) -> HealthReport {
        let mut components = BTreeMap::new();

        components.insert(
            "config".to_string(),
            match self.config.last_error() {
                None => "ok".to_string(),
                Some(e) => format!("degraded: {e}"),
            },
        );

        components.insert(
            "rule_engine".to_string(),
            if !self.rules.is_initialized() {
                "not_loaded".to_string()
            } else {
                match self.rules.get_last_error() {
                    None => "ok".to_string(),
                    Some(e) => format!("degraded: {e}"),
                }
            },
        );

        let matcher_state = self.patterns.state();
        components.insert(
            "pattern_matcher".to_string(),
            match matcher_state {
                MatcherState::Ready | MatcherState::Compiled => "ok".to_string(),
                other => other.to_string(),
            },
        );

        let healthy = components.values().all(|v| v == "ok");
        HealthReport {
            status: if healthy { "healthy" } else { "degraded" },
            components,
        }
    }

    pub fn ready(&self) -> ReadyReport {
        let mut dependencies = BTreeMap::new();

        let rules_ready = self.rules.is_initialized();
        dependencies.insert(
            "rule_config".to_string(),
            if rules_ready { "loaded" } else { "missing" }.to_string(),
        );

        let patterns_ready = matches!(
            self.patterns.state(),
            MatcherState::Ready | MatcherState::Compiled
        );
        dependencies.insert(
            "pattern_db".to_string(),
            if patterns_ready { "compiled" } else { "missing" }.to_string(),
        );

        ReadyReport {
            status: if rules_ready && patterns_ready {
                "ready"
            } else {
                "not_ready"
            },
            dependencies,
        }
    }
}

// =============================================================================
// Tests — universal invariants and the end-to-end seed scenarios
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::patterns::BackendPreference;

    const RULES: &str = r#"{
        "version": "2026.07",
        "rules": [
            {"id": "ip_blacklist", "name": "Source IP on blocklist", "expression": "ip_blacklist_match == 1", "weight": 60.0},
            {"id": "elevated_customer_risk", "name": "Elevated customer risk", "expression": "customer_risk_score >= 40", "weight": 15.0},
            {"id": "high_velocity", "name": "High hourly velocity", "expression": "hourly_count > 20 && amount_sum > 5000", "weight": 35.0},
            {"id": "bot_user_agent", "name": "Automation user agent", "expression": "user_agent contains 'bot' || user_agent contains 'curl'", "weight": 30.0}
        ],
        "thresholds": {"approve_threshold": 30.0, "review_threshold": 70.0}
    }"#;

    const BLACKLIST: &str = "203.0.113.0/24\nstolen-fingerprint\n";
    const WHITELIST: &str = "trusted-merchant\n";

    struct Fixture {
        orchestrator: DecisionOrchestrator,
        metrics: Arc<EngineMetrics>,
        _files: Vec<std::path::PathBuf>,
    }

    fn fixture() -> Fixture {
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let mut black = std::env::temp_dir();
        black.push(format!(
            "meridian-orch-black-{}-{seq}.txt",
            std::process::id()
        ));
        std::fs::write(&black, BLACKLIST).unwrap();
        let mut white = std::env::temp_dir();
        white.push(format!(
            "meridian-orch-white-{}-{seq}.txt",
            std::process::id()
        ));
        std::fs::write(&white, WHITELIST).unwrap();

        let config = ConfigStore::with_config(Config::default());
        let rules = Arc::new(RuleEngine::new());
        rules.load_rules_from_str(RULES).unwrap();

        let patterns = Arc::new(PatternMatcher::new(BackendPreference::Auto));
        patterns.load_file(&black, "ip_blacklist").unwrap();
        patterns.load_file(&white, "merchant_whitelist").unwrap();
        patterns.compile().unwrap();

        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let orchestrator =
            DecisionOrchestrator::new(config, rules, patterns, metrics.clone());

        Fixture {
            orchestrator,
            metrics,
            _files: vec![black, white],
        }
    }

    fn body(
        amount: f64,
        currency: &str,
        risk: f64,
        age_days: u32,
        ip: &str,
    ) -> String {
        serde_json::json!({
            "request_id": "req-123",
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "transaction": {
                "amount": amount,
                "currency": currency,
                "merchant_id": "merchant-42",
                "merchant_category": 5411,
                "pos_entry_mode": "chip"
            },
            "card": {
                "token": "tok_1",
                "issuer_country": "US",
                "card_brand": "visa"
            },
            "device": {
                "ip": ip,
                "fingerprint": "fp-regular",
                "user_agent": "Mozilla/5.0"
            },
            "customer": {
                "id": "cust-9",
                "risk_score": risk,
                "account_age_days": age_days
            }
        })
        .to_string()
    }

    // ---- seed scenarios --------------------------------------------------

    #[test]
    fn scenario_low_risk_approve() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(100.0, "USD", 25.0, 365, "8.8.8.8"))
            .unwrap();

        assert_eq!(resp.decision, Decision::Approve);
        assert!(resp.risk_score < 30.0, "score {}", resp.risk_score);
        assert!(resp.triggered_rules.is_empty());
        assert_eq!(resp.request_id, "req-123");
    }

    #[test]
    fn scenario_high_amount_decline() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(15_000.0, "USD", 10.0, 365, "8.8.8.8"))
            .unwrap();

        assert_eq!(resp.decision, Decision::Decline);
        assert!(resp.triggered_rules.contains(&"high_amount".to_string()));
    }

    #[test]
    fn scenario_high_customer_risk_decline() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(200.0, "USD", 85.0, 365, "8.8.8.8"))
            .unwrap();

        assert_eq!(resp.decision, Decision::Decline);
        assert!(resp
            .triggered_rules
            .contains(&"high_customer_risk".to_string()));
    }

    #[test]
    fn scenario_new_account_review() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(500.0, "USD", 40.0, 10, "8.8.8.8"))
            .unwrap();

        assert_eq!(resp.decision, Decision::Review);
        assert!(
            (30.0..70.0).contains(&resp.risk_score),
            "score {}",
            resp.risk_score
        );
        assert!(resp.triggered_rules.contains(&"new_account".to_string()));
    }

    #[test]
    fn scenario_non_major_currency_adjustment() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(300.0, "ZZZ", 20.0, 365, "8.8.8.8"))
            .unwrap();

        assert!(resp
            .triggered_rules
            .contains(&"non_major_currency".to_string()));
        assert!(matches!(resp.decision, Decision::Approve | Decision::Review));
    }

    #[test]
    fn scenario_ip_blacklist_decline() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(100.0, "USD", 10.0, 365, "203.0.113.77"))
            .unwrap();

        assert_eq!(resp.decision, Decision::Decline);
        // The rule saw ip_blacklist_match == 1 and the pattern hit is named.
        assert!(resp.triggered_rules.contains(&"ip_blacklist".to_string()));
        assert!(resp
            .triggered_rules
            .iter()
            .any(|r| r.starts_with("pattern:")));
    }

    #[test]
    fn scenario_malformed_request_missing_customer_id() {
        let f = fixture();
        let mut doc: serde_json::Value =
            serde_json::from_str(&body(100.0, "USD", 25.0, 365, "8.8.8.8")).unwrap();
        doc["customer"]
            .as_object_mut()
            .unwrap()
            .remove("id");

        let err = f
            .orchestrator
            .process_decision(&doc.to_string())
            .unwrap_err();
        assert!(matches!(err, DecisionError::InvalidRequest { .. }));

        let text = f.metrics.gather();
        assert!(
            text.contains("component=\"orchestrator\"") && text.contains("kind=\"invalid_request\""),
            "error counter missing: {text}"
        );
    }

    #[test]
    fn scenario_oversized_body_rejected_before_parse() {
        let f = fixture();
        let padding = "x".repeat(MAX_BODY_BYTES + 1);
        let err = f.orchestrator.process_decision(&padding).unwrap_err();
        match err {
            DecisionError::InvalidRequest { reason } => {
                assert!(reason.contains("8192"), "reason: {reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ---- universal invariants --------------------------------------------

    #[test]
    fn response_echoes_request_id_and_score_in_range() {
        let f = fixture();
        for (amount, risk) in [(50.0, 5.0), (9_999.0, 69.0), (1_000_000.0, 100.0)] {
            let resp = f
                .orchestrator
                .process_decision(&body(amount, "USD", risk, 100, "8.8.8.8"))
                .unwrap();
            assert_eq!(resp.request_id, "req-123");
            assert!((0.0..=100.0).contains(&resp.risk_score));
            assert!(resp.latency_ms >= 0.0);
        }
    }

    #[test]
    fn decision_matches_thresholds_modulo_override() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(700.0, "USD", 45.0, 15, "8.8.8.8"))
            .unwrap();
        // elevated_customer_risk (15) + new_account (20) = 35.
        assert!((resp.risk_score - 35.0).abs() < 1e-9);
        assert_eq!(resp.decision, Decision::Review);
    }

    #[test]
    fn deterministic_for_fixed_input() {
        let f = fixture();
        let input = body(500.0, "USD", 40.0, 10, "8.8.8.8");
        let a = f.orchestrator.process_decision(&input).unwrap();
        let b = f.orchestrator.process_decision(&input).unwrap();
        assert_eq!(a.decision, b.decision);
        assert_eq!(a.risk_score, b.risk_score);
        assert_eq!(a.triggered_rules, b.triggered_rules);
    }

    #[test]
    fn response_round_trips_through_json() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(500.0, "USD", 40.0, 10, "8.8.8.8"))
            .unwrap();

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"reasons\""));
        assert!(json.contains("\"REVIEW\""));

        let reparsed: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, resp);
    }

    #[test]
    fn empty_body_rejected() {
        let f = fixture();
        assert!(matches!(
            f.orchestrator.process_decision("").unwrap_err(),
            DecisionError::InvalidRequest { .. }
        ));
    }

    #[test]
    fn private_ip_adjustment_applies() {
        let f = fixture();
        let resp = f
            .orchestrator
            .process_decision(&body(100.0, "USD", 10.0, 365, "192.168.1.50"))
            .unwrap();
        assert!(resp.triggered_rules.contains(&"private_ip".to_string()));
        assert!((resp.risk_score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn whitelist_hits_cannot_push_score_negative() {
        let f = fixture();
        let mut doc: serde_json::Value =
            serde_json::from_str(&body(100.0, "USD", 5.0, 365, "8.8.8.8")).unwrap();
        doc["transaction"]["merchant_id"] = "trusted-merchant".into();

        let resp = f.orchestrator.process_decision(&doc.to_string()).unwrap();
        assert!(resp.risk_score >= 0.0);
        assert_eq!(resp.decision, Decision::Approve);
    }

    // ---- health & readiness ----------------------------------------------

    #[test]
    fn health_and_ready_when_fully_loaded() {
        let f = fixture();
        let health = f.orchestrator.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.components["rule_engine"], "ok");
        assert_eq!(health.components["pattern_matcher"], "ok");

        let ready = f.orchestrator.ready();
        assert_eq!(ready.status, "ready");
        assert_eq!(ready.dependencies["rule_config"], "loaded");
        assert_eq!(ready.dependencies["pattern_db"], "compiled");
    }

    #[test]
    fn not_ready_without_rules_or_patterns() {
        let config = ConfigStore::with_config(Config::default());
        let orchestrator = DecisionOrchestrator::new(
            config,
            Arc::new(RuleEngine::new()),
            Arc::new(PatternMatcher::new(BackendPreference::Auto)),
            Arc::new(EngineMetrics::new().unwrap()),
        );

        let ready = orchestrator.ready();
        assert_eq!(ready.status, "not_ready");

        let health = orchestrator.health();
        assert_eq!(health.status, "degraded");
    }

    #[test]
    fn throughput_and_p99_sanity() {
        // Floors are deliberately conservative so the check holds on loaded
        // CI machines; override with MERIDIAN_MIN_QPS for a real run.
        let min_qps: f64 = std::env::var("MERIDIAN_MIN_QPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(200.0);
        let p99_ceiling = Duration::from_millis(50);

        let f = fixture();
        let input = body(500.0, "USD", 40.0, 10, "8.8.8.8");

        // Warm the per-worker compiled cache.
        f.orchestrator.process_decision(&input).unwrap();

        let iterations = 2_000;
        let mut latencies = Vec::with_capacity(iterations);
        let started = Instant::now();
        for _ in 0..iterations {
            let one = Instant::now();
            f.orchestrator.process_decision(&input).unwrap();
            latencies.push(one.elapsed());
        }
        let elapsed = started.elapsed();

        let qps = iterations as f64 / elapsed.as_secs_f64();
        assert!(qps >= min_qps, "throughput {qps:.0}/s below floor {min_qps}");

        latencies.sort();
        let p99 = latencies[iterations * 99 / 100];
        assert!(p99 <= p99_ceiling, "p99 {p99:?} above {p99_ceiling:?}");
    }

    #[test]
    fn decision_counter_incremented_per_outcome() {
        let f = fixture();
        f.orchestrator
            .process_decision(&body(100.0, "USD", 25.0, 365, "8.8.8.8"))
            .unwrap();
        f.orchestrator
            .process_decision(&body(15_000.0, "USD", 10.0, 365, "8.8.8.8"))
            .unwrap();

        let text = f.metrics.gather();
        assert!(text.contains("decision=\"APPROVE\""));
        assert!(text.contains("decision=\"DECLINE\""));
    }
}
