pub mod context;
pub mod engine;
pub mod expr;

// Re-export the engine surface for convenient access (e.g. `use crate::rules::RuleEngine`).
pub use context::RuleContext;
pub use engine::{
    RuleConfig, RuleDef, RuleEngine, RuleEvaluationMetrics, RuleLoadError, RuleResult,
    RuleStatisticsSnapshot, Thresholds,
};
pub use expr::{CompileError, EvalError, Expr};
