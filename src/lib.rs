// =============================================================================
// Meridian Risk Engine — real-time transaction risk decisioning
// =============================================================================
//
// Given a transaction request, produce APPROVE / REVIEW / DECLINE, a risk
// score in [0, 100], and an audit trail of contributing rules and pattern
// hits. The decision path is synchronous, lock-light, and does no I/O;
// configuration, rules, and pattern lists hot-reload on background threads
// with atomic snapshot swaps.
//
// The library contract for transport collaborators is
// `AppState::process_decision` / `health` / `ready`; `api::rest` is a thin
// axum binding over it.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod patterns;
pub mod reload;
pub mod request;
pub mod rules;
pub mod trace;

pub use app_state::AppState;
pub use config::{Config, ConfigStore};
pub use error::DecisionError;
pub use metrics::EngineMetrics;
pub use orchestrator::{Decision, DecisionOrchestrator, Response};
pub use patterns::{BackendPreference, PatternMatcher};
pub use request::Request;
pub use rules::{RuleContext, RuleEngine};
