// =============================================================================
// Central Application State — Meridian Risk Engine
// =============================================================================
//
// Ties the config store, rule engine, pattern matcher, metrics, and the
// orchestrator together, and keeps the ring-buffered audit trails the
// dashboard API serves. Subsystems manage their own interior mutability;
// AppState adds a monotonic version counter so pollers can detect change.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::ConfigStore;
use crate::error::DecisionError;
use crate::metrics::EngineMetrics;
use crate::orchestrator::{DecisionOrchestrator, HealthReport, ReadyReport, Response};
use crate::patterns::{MatcherStatistics, PatternMatcher};
use crate::rules::{RuleEngine, RuleStatisticsSnapshot};

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;
/// Maximum number of recent decisions to retain.
const MAX_RECENT_DECISIONS: usize = 100;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable error message.
    pub message: String,
    /// Component that produced the error.
    pub component: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

/// Central state shared across API handlers via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, incremented on every
    /// meaningful state mutation.
    pub state_version: AtomicU64,

    pub config: Arc<ConfigStore>,
    pub rules: Arc<RuleEngine>,
    pub patterns: Arc<PatternMatcher>,
    pub metrics: Arc<EngineMetrics>,

    orchestrator: DecisionOrchestrator,

    pub recent_decisions: RwLock<Vec<Response>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Instant when the engine was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigStore>,
        rules: Arc<RuleEngine>,
        patterns: Arc<PatternMatcher>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let orchestrator = DecisionOrchestrator::new(
            config.clone(),
            rules.clone(),
            patterns.clone(),
            metrics.clone(),
        );

        Self {
            state_version: AtomicU64::new(1),
            config,
            rules,
            patterns,
            metrics,
            orchestrator,
            recent_decisions: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Decision path ───────────────────────────────────────────────────

    /// Run one decision and record it (or its failure) in the audit trails.
    pub fn process_decision(&self, body: &str) -> Result<Response, DecisionError> {
        match self.orchestrator.process_decision(body) {
            Ok(response) => {
                self.push_decision(response.clone());
                Ok(response)
            }
            Err(e) => {
                self.push_error("orchestrator", e.to_string());
                Err(e)
            }
        }
    }

    pub fn health(&self) -> HealthReport {
        self.orchestrator.health()
    }

    pub fn ready(&self) -> ReadyReport {
        self.orchestrator.ready()
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Audit trails ────────────────────────────────────────────────────

    /// Record a decision. The ring buffer is capped at
    /// [`MAX_RECENT_DECISIONS`]; oldest entries are evicted.
    fn push_decision(&self, response: Response) {
        let mut decisions = self.recent_decisions.write();
        decisions.push(response);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.remove(0);
        }
        self.increment_version();
    }

    /// Record an error. The ring buffer is capped at [`MAX_RECENT_ERRORS`];
    /// oldest entries are evicted.
    pub fn push_error(&self, component: &str, message: String) {
        let record = ErrorRecord {
            message,
            component: component.to_string(),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        self.increment_version();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build a complete, serialisable snapshot of the engine state for the
    /// dashboard API.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let health = self.health();
        let ready = self.ready();

        let mut rule_statistics: Vec<RuleStatisticsSnapshot> =
            self.rules.get_rule_statistics().into_values().collect();
        rule_statistics.sort_by(|a, b| a.id.cmp(&b.id));

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            model_version: self.config.snapshot().model_version.clone(),
            status: health.status,
            ready: ready.status == "ready",
            components: health.components,
            rule_statistics,
            pattern_statistics: self.patterns.statistics(),
            recent_decisions: self.recent_decisions.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

/// Full engine state snapshot sent to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_seconds: u64,
    pub model_version: String,
    pub status: &'static str,
    pub ready: bool,
    pub components: std::collections::BTreeMap<String, String>,
    pub rule_statistics: Vec<RuleStatisticsSnapshot>,
    pub pattern_statistics: MatcherStatistics,
    pub recent_decisions: Vec<Response>,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::patterns::BackendPreference;

    fn state() -> AppState {
        let rules = Arc::new(RuleEngine::new());
        rules
            .load_rules_from_str(
                r#"{
                    "version": "t",
                    "rules": [{"id": "r1", "expression": "amount > 10000", "weight": 25}],
                    "thresholds": {"approve_threshold": 30, "review_threshold": 70}
                }"#,
            )
            .unwrap();

        let patterns = Arc::new(PatternMatcher::new(BackendPreference::Auto));
        // Minimal compiled corpus so the matcher reports Ready.
        patterns.add_pattern("placeholder-token", "blacklist").unwrap();
        patterns.compile().unwrap();

        AppState::new(
            ConfigStore::with_config(Config::default()),
            rules,
            patterns,
            Arc::new(EngineMetrics::new().unwrap()),
        )
    }

    fn body() -> String {
        serde_json::json!({
            "request_id": "req-1",
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "transaction": {"amount": 50.0, "currency": "USD", "merchant_id": "m", "merchant_category": 1},
            "card": {"token": "t", "issuer_country": "US", "card_brand": "visa"},
            "device": {"ip": "8.8.8.8", "fingerprint": "fp", "user_agent": "ua"},
            "customer": {"id": "c", "risk_score": 5.0, "account_age_days": 400}
        })
        .to_string()
    }

    #[test]
    fn decisions_land_in_audit_trail() {
        let state = state();
        let version_before = state.current_state_version();

        state.process_decision(&body()).unwrap();

        assert_eq!(state.recent_decisions.read().len(), 1);
        assert!(state.current_state_version() > version_before);
    }

    #[test]
    fn errors_land_in_error_trail() {
        let state = state();
        assert!(state.process_decision("not json").is_err());
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].component, "orchestrator");
    }

    #[test]
    fn decision_ring_buffer_is_capped() {
        let state = state();
        for _ in 0..(MAX_RECENT_DECISIONS + 10) {
            state.process_decision(&body()).unwrap();
        }
        assert_eq!(state.recent_decisions.read().len(), MAX_RECENT_DECISIONS);
    }

    #[test]
    fn snapshot_reflects_engine_state() {
        let state = state();
        state.process_decision(&body()).unwrap();

        let snapshot = state.build_snapshot();
        assert_eq!(snapshot.status, "healthy");
        assert!(snapshot.ready);
        assert_eq!(snapshot.recent_decisions.len(), 1);
        assert_eq!(snapshot.rule_statistics.len(), 1);
        assert_eq!(snapshot.rule_statistics[0].id, "r1");
        assert_eq!(snapshot.model_version, "meridian-v1");

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"state_version\""));
    }
}
