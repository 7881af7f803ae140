// =============================================================================
// Pattern Matcher — compiled block/allow-list database with atomic swap
// =============================================================================
//
// Lifecycle: Uninit → Loaded → Compiled → Ready, back to Loaded on
// add_pattern, to Error on a failure with no database to fall back to.
// A failed re-compile with a Ready database in place keeps serving the old
// database and records the error.
//
// Matching pins the active database (Arc clone) for the duration of one
// scan, so a concurrent re-compile never tears a result set.
// =============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::patterns::backend::{
    compile_backend, BackendPreference, MatcherBackend, PatternMatch,
};
use crate::patterns::parser::{
    load_pattern_file, Pattern, PatternCategory, PatternError,
};
use crate::reload::FileWatcher;
use crate::request::Request;

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    Uninit,
    Loaded,
    Compiled,
    Ready,
    Error,
}

impl MatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninit => "uninit",
            Self::Loaded => "loaded",
            Self::Compiled => "compiled",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    fn can_match(&self) -> bool {
        matches!(self, Self::Compiled | Self::Ready)
    }
}

impl std::fmt::Display for MatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Results & statistics
// =============================================================================

/// Aggregated outcome of scanning one or more texts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchResults {
    pub matches: Vec<PatternMatch>,
    pub blacklist_matches: Vec<PatternMatch>,
    pub whitelist_matches: Vec<PatternMatch>,
    pub texts_processed: usize,
    pub patterns_checked: usize,
    pub evaluation_time_us: u64,
}

impl MatchResults {
    fn absorb(&mut self, hits: Vec<PatternMatch>) {
        for hit in hits {
            match hit.category {
                PatternCategory::Blacklist => self.blacklist_matches.push(hit.clone()),
                PatternCategory::Whitelist => self.whitelist_matches.push(hit.clone()),
            }
            self.matches.push(hit);
        }
    }

    fn merge(&mut self, other: MatchResults) {
        self.matches.extend(other.matches);
        self.blacklist_matches.extend(other.blacklist_matches);
        self.whitelist_matches.extend(other.whitelist_matches);
        self.texts_processed += other.texts_processed;
        self.patterns_checked += other.patterns_checked;
        self.evaluation_time_us += other.evaluation_time_us;
    }

    /// Informational score: +10 per blacklist hit, -5 per whitelist hit,
    /// floored at zero.
    pub fn score(&self) -> f64 {
        let raw = 10.0 * self.blacklist_matches.len() as f64
            - 5.0 * self.whitelist_matches.len() as f64;
        raw.max(0.0)
    }
}

/// Counters surfaced on the statistics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MatcherStatistics {
    pub backend: &'static str,
    pub state: String,
    pub pattern_count: usize,
    pub blacklist_patterns: usize,
    pub whitelist_patterns: usize,
    pub match_operations: u64,
    pub total_match_time_us: u64,
    pub blacklist_hits: u64,
    pub whitelist_hits: u64,
}

#[derive(Debug, Default)]
struct Counters {
    match_operations: AtomicU64,
    total_match_time_ns: AtomicU64,
    blacklist_hits: AtomicU64,
    whitelist_hits: AtomicU64,
}

// =============================================================================
// Matcher
// =============================================================================

struct CompiledDb {
    backend: Box<dyn MatcherBackend>,
    blacklist_patterns: usize,
    whitelist_patterns: usize,
}

struct Inner {
    patterns: Vec<Pattern>,
    next_id: u32,
    sources: Vec<(PathBuf, String)>,
    db: Option<Arc<CompiledDb>>,
    state: MatcherState,
    last_error: Option<String>,
}

pub struct PatternMatcher {
    preference: BackendPreference,
    inner: RwLock<Inner>,
    counters: Counters,
    watchers: Mutex<Vec<FileWatcher>>,
}

/// The request fields scanned by `match_transaction`, in scan order.
const SCANNED_FIELDS: [&str; 10] = [
    "ip_address",
    "device_fingerprint",
    "user_agent",
    "merchant_id",
    "card_token",
    "issuer_country",
    "card_brand",
    "customer_id",
    "currency",
    "pos_entry_mode",
];

impl PatternMatcher {
    pub fn new(preference: BackendPreference) -> Self {
        Self {
            preference,
            inner: RwLock::new(Inner {
                patterns: Vec::new(),
                next_id: 1,
                sources: Vec::new(),
                db: None,
                state: MatcherState::Uninit,
                last_error: None,
            }),
            counters: Counters::default(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Load a pattern file whose category comes from `tag` (must contain
    /// "blacklist" or "whitelist"). Returns the number of patterns added.
    pub fn load_file(
        &self,
        path: impl Into<PathBuf>,
        tag: &str,
    ) -> Result<usize, PatternError> {
        let path = path.into();
        let mut inner = self.inner.write();

        let loaded = match load_pattern_file(&path, tag, inner.next_id) {
            Ok(patterns) => patterns,
            Err(e) => {
                if inner.db.is_none() {
                    inner.state = MatcherState::Error;
                }
                inner.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let count = loaded.len();
        inner.next_id += count as u32;
        inner.patterns.extend(loaded);
        inner.sources.retain(|(p, _)| p != &path);
        inner.sources.push((path.clone(), tag.to_string()));
        inner.state = MatcherState::Loaded;

        info!(path = %path.display(), tag, count, "pattern file loaded");
        Ok(count)
    }

    /// Add a single pattern. The matcher drops back to Loaded and requires a
    /// re-compile before the pattern takes effect.
    pub fn add_pattern(&self, text: &str, tag: &str) -> Result<u32, PatternError> {
        let category = PatternCategory::from_tag(tag)?;
        let mut inner = self.inner.write();
        let id = inner.next_id;
        let priority = inner.patterns.len() as i32;
        inner.patterns.push(Pattern::new(id, text, category, priority));
        inner.next_id += 1;
        inner.state = MatcherState::Loaded;
        debug!(id, text, category = %category, "pattern added (re-compile required)");
        Ok(id)
    }

    /// Compile the loaded corpus into an active database.
    ///
    /// On failure with a previous database in place, the old database keeps
    /// serving and the error is recorded; with no fallback the matcher goes
    /// to Error (recoverable by loading again).
    pub fn compile(&self) -> Result<(), PatternError> {
        // Snapshot the corpus, then compile without holding the lock so
        // in-flight scans keep running against the old database.
        let patterns = {
            let mut inner = self.inner.write();
            if inner.patterns.is_empty() && inner.state == MatcherState::Uninit {
                return Err(PatternError::NotReady {
                    state: inner.state.to_string(),
                });
            }
            inner.state = MatcherState::Compiled;
            inner.patterns.clone()
        };

        match compile_backend(self.preference, &patterns) {
            Ok(backend) => {
                let blacklist_patterns = patterns
                    .iter()
                    .filter(|p| p.category == PatternCategory::Blacklist)
                    .count();
                let whitelist_patterns = patterns.len() - blacklist_patterns;
                let name = backend.name();

                let mut inner = self.inner.write();
                inner.db = Some(Arc::new(CompiledDb {
                    backend,
                    blacklist_patterns,
                    whitelist_patterns,
                }));
                inner.state = MatcherState::Ready;
                inner.last_error = None;

                info!(
                    backend = name,
                    patterns = patterns.len(),
                    blacklist = blacklist_patterns,
                    whitelist = whitelist_patterns,
                    "pattern database compiled"
                );
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.write();
                inner.last_error = Some(e.to_string());
                if inner.db.is_some() {
                    // Prior Ready database stays in place.
                    inner.state = MatcherState::Ready;
                    warn!(error = %e, "pattern compile failed — previous database retained");
                } else {
                    inner.state = MatcherState::Error;
                    warn!(error = %e, "pattern compile failed with no fallback database");
                }
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Matching
    // -------------------------------------------------------------------------

    /// Scan a single text. Per-text failures (including calling before the
    /// database is ready) are logged and reported as no-match, never
    /// propagated as a decision error.
    pub fn match_text(&self, text: &str, filter: Option<PatternCategory>) -> MatchResults {
        let Some(db) = self.active_db() else {
            debug!("match_text before database ready — treated as no-match");
            return MatchResults {
                texts_processed: 1,
                ..MatchResults::default()
            };
        };

        let start = Instant::now();
        let hits = db.backend.scan(text, filter);
        let elapsed = start.elapsed();

        let mut results = MatchResults {
            texts_processed: 1,
            patterns_checked: db.backend.pattern_count(),
            evaluation_time_us: elapsed.as_micros() as u64,
            ..MatchResults::default()
        };
        results.absorb(hits);

        self.record(&results, elapsed);
        results
    }

    /// Scan a batch of texts and merge the results.
    pub fn match_batch<T: AsRef<str>>(
        &self,
        texts: &[T],
        filter: Option<PatternCategory>,
    ) -> MatchResults {
        let mut merged = MatchResults::default();
        for text in texts {
            merged.merge(self.match_text(text.as_ref(), filter));
        }
        merged
    }

    /// Scan every text-bearing field of a request and merge the results.
    pub fn match_transaction(
        &self,
        request: &Request,
        filter: Option<PatternCategory>,
    ) -> MatchResults {
        let fields = Self::text_fields(request);
        debug_assert_eq!(fields.len(), SCANNED_FIELDS.len());
        self.match_batch(&fields, filter)
    }

    fn text_fields(request: &Request) -> Vec<&str> {
        vec![
            &request.device.ip,
            &request.device.fingerprint,
            &request.device.user_agent,
            &request.transaction.merchant_id,
            &request.card.token,
            &request.card.issuer_country,
            &request.card.card_brand,
            &request.customer.id,
            &request.transaction.currency,
            &request.transaction.pos_entry_mode,
        ]
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn state(&self) -> MatcherState {
        self.inner.read().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    pub fn active_backend(&self) -> Option<&'static str> {
        self.active_db().map(|db| db.backend.name())
    }

    pub fn statistics(&self) -> MatcherStatistics {
        let inner = self.inner.read();
        let (blacklist_patterns, whitelist_patterns) = inner
            .db
            .as_ref()
            .map(|db| (db.blacklist_patterns, db.whitelist_patterns))
            .unwrap_or((0, 0));

        MatcherStatistics {
            backend: inner
                .db
                .as_ref()
                .map(|db| db.backend.name())
                .unwrap_or("none"),
            state: inner.state.to_string(),
            pattern_count: inner.patterns.len(),
            blacklist_patterns,
            whitelist_patterns,
            match_operations: self.counters.match_operations.load(Ordering::Relaxed),
            total_match_time_us: self.counters.total_match_time_ns.load(Ordering::Relaxed)
                / 1_000,
            blacklist_hits: self.counters.blacklist_hits.load(Ordering::Relaxed),
            whitelist_hits: self.counters.whitelist_hits.load(Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Hot reload
    // -------------------------------------------------------------------------

    /// Watch every loaded source file; a change re-parses all sources and
    /// re-compiles. A failed reload keeps the active database.
    pub fn enable_hot_reload(self: &Arc<Self>, interval: Duration) {
        let sources = self.inner.read().sources.clone();
        let mut watchers = self.watchers.lock();
        watchers.clear();

        for (path, _) in sources {
            let matcher = Arc::downgrade(self);
            watchers.push(FileWatcher::spawn(path, interval, move || {
                if let Some(matcher) = matcher.upgrade() {
                    if let Err(e) = matcher.reload_sources() {
                        warn!(error = %e, "pattern reload failed — keeping previous database");
                    }
                }
            }));
        }
    }

    /// Stop watching. Idempotent.
    pub fn disable_hot_reload(&self) {
        self.watchers.lock().clear();
    }

    /// Re-parse every source file from scratch and compile the result.
    pub fn reload_sources(&self) -> Result<(), PatternError> {
        let sources = self.inner.read().sources.clone();

        let mut patterns = Vec::new();
        let mut next_id = 1u32;
        for (path, tag) in &sources {
            let loaded = load_pattern_file(path, tag, next_id)?;
            next_id += loaded.len() as u32;
            patterns.extend(loaded);
        }

        {
            let mut inner = self.inner.write();
            inner.patterns = patterns;
            inner.next_id = next_id;
            inner.state = MatcherState::Loaded;
        }

        self.compile()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn active_db(&self) -> Option<Arc<CompiledDb>> {
        let inner = self.inner.read();
        if !inner.state.can_match() {
            return None;
        }
        inner.db.clone()
    }

    fn record(&self, results: &MatchResults, elapsed: Duration) {
        self.counters.match_operations.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_match_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.counters
            .blacklist_hits
            .fetch_add(results.blacklist_matches.len() as u64, Ordering::Relaxed);
        self.counters
            .whitelist_hits
            .fetch_add(results.whitelist_matches.len() as u64, Ordering::Relaxed);
    }
}
