// =============================================================================
// Rule Engine — prioritized weighted rules with per-worker compiled caches
// =============================================================================
//
// Rules load from a JSON document and are sorted by weight descending; that
// is the priority order. Each worker thread keeps a private cache of compiled
// expressions tagged with the active configuration's generation; a reload
// bumps the generation and workers rebuild lazily on next use.
//
// Evaluation is a single pass: for each enabled rule, ensure compiled,
// evaluate against the request's context, accumulate the weight when
// triggered, and update that rule's atomic counters. One rule failing never
// fails the evaluation.
// =============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::reload::FileWatcher;
use crate::rules::context::RuleContext;
use crate::rules::expr::{Expr, TRUTH_THRESHOLD};

// =============================================================================
// Errors
// =============================================================================

/// Failure loading a rule configuration artifact.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("rule file not found: {path}")]
    FileNotFound { path: String },

    #[error("rule file parse error: {0}")]
    Parse(String),

    #[error("rule config validation error: {0}")]
    Validation(String),
}

// =============================================================================
// Rule definitions (file-facing)
// =============================================================================

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

/// A rule as authored in the rule file. Unknown fields are tolerated;
/// `id` and `expression` are required (enforced after parse so one bad rule
/// is skipped instead of rejecting the file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub expression: String,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: String,
}

/// Decision thresholds. Invariant: `approve_threshold < review_threshold`,
/// both in [0, 100].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub approve_threshold: f64,
    pub review_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            approve_threshold: 30.0,
            review_threshold: 70.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RuleFileDoc {
    #[serde(default)]
    version: String,

    #[serde(default)]
    rules: Vec<serde_json::Value>,

    #[serde(default)]
    thresholds: Thresholds,
}

// =============================================================================
// Runtime state
// =============================================================================

/// Monotonic per-rule counters, shared across workers via atomics.
#[derive(Debug, Default)]
pub struct RuleStats {
    pub evaluation_count: AtomicU64,
    pub hit_count: AtomicU64,
    pub total_evaluation_time_ns: AtomicU64,
}

impl RuleStats {
    fn record(&self, triggered: bool, elapsed: Duration) {
        self.evaluation_count.fetch_add(1, Ordering::Relaxed);
        if triggered {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_evaluation_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.evaluation_count.store(0, Ordering::Relaxed);
        self.hit_count.store(0, Ordering::Relaxed);
        self.total_evaluation_time_ns.store(0, Ordering::Relaxed);
    }
}

/// A rule admitted into the active configuration.
#[derive(Debug)]
pub struct LoadedRule {
    pub def: RuleDef,
    pub stats: RuleStats,
    /// Set when the expression failed to compile at load; the rule stays in
    /// the config (stats initialized) but never contributes.
    pub compile_error: Option<String>,
}

/// The active, immutable rule configuration snapshot.
#[derive(Debug)]
pub struct RuleConfig {
    pub version: String,
    /// Sorted by weight descending (priority order).
    pub rules: Vec<Arc<LoadedRule>>,
    pub thresholds: Thresholds,
    pub loaded_at: DateTime<Utc>,
    /// Monotonic marker used to invalidate per-worker compiled caches.
    pub generation: u64,
    /// Per-rule problems found at load (skipped or compile-failed rules).
    pub load_warnings: Vec<String>,
}

/// Serialisable per-rule statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RuleStatisticsSnapshot {
    pub id: String,
    pub name: String,
    pub weight: f64,
    pub enabled: bool,
    pub evaluation_count: u64,
    pub hit_count: u64,
    pub total_evaluation_time_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
}

// =============================================================================
// Evaluation output
// =============================================================================

/// Outcome of one rule within one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub triggered: bool,
    pub contribution_score: f64,
    pub evaluation_time_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
}

/// Full outcome of a single-pass evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct RuleEvaluationMetrics {
    pub results: Vec<RuleResult>,
    pub total_score: f64,
    pub rules_triggered: u32,
    pub rules_evaluated: u32,
    pub total_evaluation_time_us: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True when an evaluation budget expired and remaining rules were
    /// short-circuited.
    pub truncated: bool,
    /// Thresholds in force for this evaluation (from the snapshot the pass
    /// started with — never a half-reloaded one).
    pub thresholds: Thresholds,
}

impl RuleEvaluationMetrics {
    fn empty(thresholds: Thresholds) -> Self {
        let now = Utc::now();
        Self {
            results: Vec::new(),
            total_score: 0.0,
            rules_triggered: 0,
            rules_evaluated: 0,
            total_evaluation_time_us: 0,
            started_at: now,
            finished_at: now,
            truncated: false,
            thresholds,
        }
    }
}

// =============================================================================
// Per-worker compiled cache
// =============================================================================

struct CompiledCache {
    /// Which engine instance and config generation the cache was built for.
    /// A mismatch on either clears the cache.
    engine_id: u64,
    generation: u64,
    exprs: HashMap<String, Expr>,
}

thread_local! {
    static COMPILED: RefCell<CompiledCache> = RefCell::new(CompiledCache {
        engine_id: 0,
        generation: 0,
        exprs: HashMap::new(),
    });
}

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// RuleEngine
// =============================================================================

/// Observer invoked after a successful hot reload with the fresh config.
pub type ReloadObserver = Box<dyn Fn(&RuleConfig) + Send + Sync>;

pub struct RuleEngine {
    instance_id: u64,
    current: RwLock<Option<Arc<RuleConfig>>>,
    generation: AtomicU64,
    path: RwLock<Option<PathBuf>>,
    watcher: Mutex<Option<FileWatcher>>,
    last_error: RwLock<Option<String>>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            instance_id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            path: RwLock::new(None),
            watcher: Mutex::new(None),
            last_error: RwLock::new(None),
        }
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Load (or reload) rules from a JSON file, replacing the active
    /// configuration atomically on success.
    pub fn load_rules(&self, path: impl AsRef<Path>) -> Result<(), RuleLoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuleLoadError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                RuleLoadError::Parse(format!("{}: {e}", path.display()))
            }
        })?;

        self.load_rules_from_str(&content)?;
        *self.path.write() = Some(path.to_path_buf());
        Ok(())
    }

    /// Load rules from raw JSON. Used by `load_rules` and by tests.
    pub fn load_rules_from_str(&self, content: &str) -> Result<(), RuleLoadError> {
        let config = self.build_config(content)?;
        let version = config.version.clone();
        let count = config.rules.len();
        let warnings = config.load_warnings.len();

        *self.current.write() = Some(Arc::new(config));
        *self.last_error.write() = None;

        info!(version = %version, rules = count, warnings, "rule config loaded");
        Ok(())
    }

    fn build_config(&self, content: &str) -> Result<RuleConfig, RuleLoadError> {
        let doc: RuleFileDoc =
            serde_json::from_str(content).map_err(|e| RuleLoadError::Parse(e.to_string()))?;

        let t = doc.thresholds;
        if !(0.0..=100.0).contains(&t.approve_threshold)
            || !(0.0..=100.0).contains(&t.review_threshold)
        {
            return Err(RuleLoadError::Validation(
                "thresholds must be in [0, 100]".to_string(),
            ));
        }
        if t.approve_threshold >= t.review_threshold {
            return Err(RuleLoadError::Validation(format!(
                "approve_threshold {} must be below review_threshold {}",
                t.approve_threshold, t.review_threshold
            )));
        }

        let mut warnings = Vec::new();
        let mut seen_ids = std::collections::HashSet::new();
        let mut rules: Vec<Arc<LoadedRule>> = Vec::with_capacity(doc.rules.len());

        for (index, raw) in doc.rules.into_iter().enumerate() {
            // A rule missing id or expression is skipped, not fatal.
            let def: RuleDef = match serde_json::from_value(raw) {
                Ok(def) => def,
                Err(e) => {
                    let msg = format!("rule #{index} skipped: {e}");
                    warn!("{msg}");
                    warnings.push(msg);
                    continue;
                }
            };

            if def.id.is_empty() {
                let msg = format!("rule #{index} skipped: empty id");
                warn!("{msg}");
                warnings.push(msg);
                continue;
            }
            if !seen_ids.insert(def.id.clone()) {
                let msg = format!("rule '{}' skipped: duplicate id", def.id);
                warn!("{msg}");
                warnings.push(msg);
                continue;
            }

            let compile_error = match Expr::compile(&def.expression) {
                Ok(_) => None,
                Err(e) => {
                    let msg = format!("rule '{}' failed to compile: {e}", def.id);
                    warn!("{msg}");
                    warnings.push(msg.clone());
                    Some(e.to_string())
                }
            };

            rules.push(Arc::new(LoadedRule {
                def,
                stats: RuleStats::default(),
                compile_error,
            }));
        }

        // Priority order: weight descending, stable for equal weights.
        rules.sort_by(|a, b| {
            b.def
                .weight
                .partial_cmp(&a.def.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(RuleConfig {
            version: doc.version,
            rules,
            thresholds: t,
            loaded_at: Utc::now(),
            generation,
            load_warnings: warnings,
        })
    }

    // -------------------------------------------------------------------------
    // Hot reload
    // -------------------------------------------------------------------------

    /// Start watching the rule file loaded by `load_rules`. Replaces any
    /// previous watcher. The observer fires after each successful swap.
    pub fn enable_hot_reload(
        self: &Arc<Self>,
        interval: Duration,
        observer: Option<ReloadObserver>,
    ) -> Result<(), RuleLoadError> {
        let Some(path) = self.path.read().clone() else {
            return Err(RuleLoadError::Validation(
                "no rule file loaded; call load_rules first".to_string(),
            ));
        };

        let observer = observer.map(Arc::new);
        let engine = Arc::downgrade(self);
        let watch_path = path.clone();

        let watcher = FileWatcher::spawn(path, interval, move || {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            match engine.load_rules(&watch_path) {
                Ok(()) => {
                    if let Some(config) = engine.get_current_config() {
                        if let Some(observer) = observer.as_deref() {
                            observer(&config);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "rule hot reload failed — keeping previous config");
                    *engine.last_error.write() = Some(e.to_string());
                }
            }
        });

        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Stop the watcher. Idempotent.
    pub fn disable_hot_reload(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Evaluate every enabled rule against `context` in priority order.
    pub fn evaluate_rules(&self, context: &RuleContext) -> RuleEvaluationMetrics {
        self.evaluate_rules_with_budget(context, None)
    }

    /// Evaluate with an optional wall-clock budget. When the budget expires
    /// the remaining rules are short-circuited and the result is flagged
    /// truncated.
    pub fn evaluate_rules_with_budget(
        &self,
        context: &RuleContext,
        budget: Option<Duration>,
    ) -> RuleEvaluationMetrics {
        // Pin the snapshot for the whole pass: a concurrent reload must not
        // change the rule set mid-evaluation.
        let Some(config) = self.current.read().clone() else {
            return RuleEvaluationMetrics::empty(Thresholds::default());
        };

        let started_at = Utc::now();
        let start = Instant::now();

        let mut results = Vec::with_capacity(config.rules.len());
        let mut total_score = 0.0;
        let mut rules_triggered = 0u32;
        let mut rules_evaluated = 0u32;
        let mut truncated = false;

        COMPILED.with(|cache| {
            let mut cache = cache.borrow_mut();
            if cache.engine_id != self.instance_id || cache.generation != config.generation {
                cache.exprs.clear();
                cache.engine_id = self.instance_id;
                cache.generation = config.generation;
            }

            for rule in &config.rules {
                if !rule.def.enabled {
                    continue;
                }
                if rule.compile_error.is_some() {
                    continue;
                }
                if let Some(budget) = budget {
                    if start.elapsed() >= budget {
                        truncated = true;
                        break;
                    }
                }

                // Ensure this worker holds a compiled form. Compilation was
                // validated at load, so a failure here is unexpected; skip
                // the rule and move on.
                if !cache.exprs.contains_key(&rule.def.id) {
                    match Expr::compile(&rule.def.expression) {
                        Ok(expr) => {
                            cache.exprs.insert(rule.def.id.clone(), expr);
                        }
                        Err(e) => {
                            warn!(rule_id = %rule.def.id, error = %e, "compile failed at evaluation time");
                            continue;
                        }
                    }
                }
                let expr = &cache.exprs[&rule.def.id];

                let rule_start = Instant::now();
                let outcome = expr.eval_number(context);
                let elapsed = rule_start.elapsed();
                rules_evaluated += 1;

                match outcome {
                    Ok(value) => {
                        let triggered = value > TRUTH_THRESHOLD;
                        let contribution = if triggered { rule.def.weight } else { 0.0 };
                        if triggered {
                            rules_triggered += 1;
                            total_score += contribution;
                        }
                        rule.stats.record(triggered, elapsed);
                        results.push(RuleResult {
                            rule_id: rule.def.id.clone(),
                            triggered,
                            contribution_score: contribution,
                            evaluation_time_us: elapsed.as_micros() as u64,
                            debug_info: None,
                        });
                    }
                    Err(e) => {
                        // Contained: the rule is excluded from this request's
                        // contribution and the pass continues.
                        debug!(rule_id = %rule.def.id, error = %e, "rule evaluation error");
                        rule.stats.record(false, elapsed);
                        results.push(RuleResult {
                            rule_id: rule.def.id.clone(),
                            triggered: false,
                            contribution_score: 0.0,
                            evaluation_time_us: elapsed.as_micros() as u64,
                            debug_info: Some(e.to_string()),
                        });
                    }
                }
            }
        });

        RuleEvaluationMetrics {
            results,
            total_score,
            rules_triggered,
            rules_evaluated,
            total_evaluation_time_us: start.elapsed().as_micros() as u64,
            started_at,
            finished_at: Utc::now(),
            truncated,
            thresholds: config.thresholds,
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Shared read of the active configuration snapshot.
    pub fn get_current_config(&self) -> Option<Arc<RuleConfig>> {
        self.current.read().clone()
    }

    /// Per-rule statistics keyed by rule id.
    pub fn get_rule_statistics(&self) -> HashMap<String, RuleStatisticsSnapshot> {
        let Some(config) = self.get_current_config() else {
            return HashMap::new();
        };

        config
            .rules
            .iter()
            .map(|rule| {
                (
                    rule.def.id.clone(),
                    RuleStatisticsSnapshot {
                        id: rule.def.id.clone(),
                        name: rule.def.name.clone(),
                        weight: rule.def.weight,
                        enabled: rule.def.enabled,
                        evaluation_count: rule.stats.evaluation_count.load(Ordering::Relaxed),
                        hit_count: rule.stats.hit_count.load(Ordering::Relaxed),
                        total_evaluation_time_us: rule
                            .stats
                            .total_evaluation_time_ns
                            .load(Ordering::Relaxed)
                            / 1_000,
                        compile_error: rule.compile_error.clone(),
                    },
                )
            })
            .collect()
    }

    /// Zero every counter on the active configuration.
    pub fn reset_statistics(&self) {
        if let Some(config) = self.get_current_config() {
            for rule in &config.rules {
                rule.stats.reset();
            }
            info!("rule statistics reset");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}
