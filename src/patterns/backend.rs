// =============================================================================
// Matcher Backends — one contract, three engines
// =============================================================================
//
// Backend selection is a runtime choice:
//
//   HighPerf  RegexSet prefilter over the whole corpus, then per-pattern
//             confirmation for byte offsets. One pass over the text decides
//             which patterns can hit at all.
//   Std       Linear per-pattern scan. Predictable, no prefilter memory.
//   Alt       Literal fast path: exact patterns scan with substring search;
//             wildcard/CIDR patterns fall back to per-pattern regexes.
//
// Auto resolves to the fastest available backend (HighPerf).
// =============================================================================

use regex::{Regex, RegexSet};
use serde::Serialize;

use crate::patterns::parser::{Pattern, PatternCategory, PatternError, PatternKind};

// =============================================================================
// Preference & match records
// =============================================================================

/// Caller preference for the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    #[default]
    Auto,
    HighPerf,
    Std,
    Alt,
}

impl std::str::FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "high_perf" | "highperf" => Ok(Self::HighPerf),
            "std" => Ok(Self::Std),
            "alt" => Ok(Self::Alt),
            other => Err(format!("unknown backend preference '{other}'")),
        }
    }
}

/// A single pattern hit with byte offsets into the scanned text.
#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    pub pattern_id: u32,
    pub pattern_name: String,
    pub matched_text: String,
    pub start: usize,
    pub end: usize,
    pub category: PatternCategory,
}

/// Common contract all backends expose.
pub trait MatcherBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// All hits of all patterns in `text`, optionally restricted to one
    /// category. Offsets satisfy `text[start..end] == matched_text`.
    fn scan(&self, text: &str, filter: Option<PatternCategory>) -> Vec<PatternMatch>;

    /// Number of patterns consulted per text.
    fn pattern_count(&self) -> usize;
}

/// Compile `patterns` with the preferred engine.
pub fn compile_backend(
    preference: BackendPreference,
    patterns: &[Pattern],
) -> Result<Box<dyn MatcherBackend>, PatternError> {
    match preference {
        // Auto prefers the highest-performing engine.
        BackendPreference::Auto | BackendPreference::HighPerf => {
            Ok(Box::new(HighPerfBackend::compile(patterns)?))
        }
        BackendPreference::Std => Ok(Box::new(StdBackend::compile(patterns)?)),
        BackendPreference::Alt => Ok(Box::new(AltBackend::compile(patterns)?)),
    }
}

// =============================================================================
// Shared compilation helpers
// =============================================================================

struct CompiledPattern {
    regex: Regex,
    pattern: Pattern,
}

fn compile_regex(pattern: &Pattern) -> Result<Regex, PatternError> {
    let source = pattern.to_regex()?;
    Regex::new(&source).map_err(|e| PatternError::Compile {
        pattern_id: pattern.id,
        reason: e.to_string(),
    })
}

fn compile_all(patterns: &[Pattern]) -> Result<Vec<CompiledPattern>, PatternError> {
    patterns
        .iter()
        .map(|p| {
            Ok(CompiledPattern {
                regex: compile_regex(p)?,
                pattern: p.clone(),
            })
        })
        .collect()
}

fn collect_hits(
    compiled: &CompiledPattern,
    text: &str,
    filter: Option<PatternCategory>,
    out: &mut Vec<PatternMatch>,
) {
    if let Some(filter) = filter {
        if compiled.pattern.category != filter {
            return;
        }
    }
    for m in compiled.regex.find_iter(text) {
        out.push(PatternMatch {
            pattern_id: compiled.pattern.id,
            pattern_name: compiled.pattern.name.clone(),
            matched_text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
            category: compiled.pattern.category,
        });
    }
}

// =============================================================================
// HighPerf — RegexSet prefilter + per-pattern confirmation
// =============================================================================

pub struct HighPerfBackend {
    set: RegexSet,
    compiled: Vec<CompiledPattern>,
}

impl HighPerfBackend {
    pub fn compile(patterns: &[Pattern]) -> Result<Self, PatternError> {
        let compiled = compile_all(patterns)?;
        let sources: Vec<String> = patterns
            .iter()
            .map(|p| p.to_regex())
            .collect::<Result<_, _>>()?;
        let set = RegexSet::new(&sources).map_err(|e| PatternError::Compile {
            pattern_id: patterns.first().map(|p| p.id).unwrap_or(0),
            reason: e.to_string(),
        })?;
        Ok(Self { set, compiled })
    }
}

impl MatcherBackend for HighPerfBackend {
    fn name(&self) -> &'static str {
        "high_perf"
    }

    fn scan(&self, text: &str, filter: Option<PatternCategory>) -> Vec<PatternMatch> {
        let mut hits = Vec::new();
        for index in self.set.matches(text) {
            collect_hits(&self.compiled[index], text, filter, &mut hits);
        }
        hits
    }

    fn pattern_count(&self) -> usize {
        self.compiled.len()
    }
}

// =============================================================================
// Std — linear per-pattern scan
// =============================================================================

pub struct StdBackend {
    compiled: Vec<CompiledPattern>,
}

impl StdBackend {
    pub fn compile(patterns: &[Pattern]) -> Result<Self, PatternError> {
        Ok(Self {
            compiled: compile_all(patterns)?,
        })
    }
}

impl MatcherBackend for StdBackend {
    fn name(&self) -> &'static str {
        "std"
    }

    fn scan(&self, text: &str, filter: Option<PatternCategory>) -> Vec<PatternMatch> {
        let mut hits = Vec::new();
        for compiled in &self.compiled {
            collect_hits(compiled, text, filter, &mut hits);
        }
        hits
    }

    fn pattern_count(&self) -> usize {
        self.compiled.len()
    }
}

// =============================================================================
// Alt — literal fast path with regex fallback
// =============================================================================

pub struct AltBackend {
    literals: Vec<Pattern>,
    fallback: Vec<CompiledPattern>,
}

impl AltBackend {
    pub fn compile(patterns: &[Pattern]) -> Result<Self, PatternError> {
        let mut literals = Vec::new();
        let mut fallback = Vec::new();

        for pattern in patterns {
            if pattern.kind == PatternKind::Exact {
                literals.push(pattern.clone());
            } else {
                fallback.push(CompiledPattern {
                    regex: compile_regex(pattern)?,
                    pattern: pattern.clone(),
                });
            }
        }

        Ok(Self { literals, fallback })
    }

    fn scan_literal(
        pattern: &Pattern,
        text: &str,
        filter: Option<PatternCategory>,
        out: &mut Vec<PatternMatch>,
    ) {
        if let Some(filter) = filter {
            if pattern.category != filter {
                return;
            }
        }

        let needle = pattern.pattern_text.as_str();
        if needle.is_empty() {
            return;
        }

        if pattern.case_sensitive {
            for (start, matched) in text.match_indices(needle) {
                out.push(PatternMatch {
                    pattern_id: pattern.id,
                    pattern_name: pattern.name.clone(),
                    matched_text: matched.to_string(),
                    start,
                    end: start + matched.len(),
                    category: pattern.category,
                });
            }
        } else {
            // ASCII-case-insensitive sliding scan keeps byte offsets exact.
            let text_bytes = text.as_bytes();
            let needle_bytes = needle.as_bytes();
            if needle_bytes.len() > text_bytes.len() {
                return;
            }
            for start in 0..=(text_bytes.len() - needle_bytes.len()) {
                let window = &text_bytes[start..start + needle_bytes.len()];
                if window.eq_ignore_ascii_case(needle_bytes) {
                    if let Some(matched) = text.get(start..start + needle_bytes.len()) {
                        out.push(PatternMatch {
                            pattern_id: pattern.id,
                            pattern_name: pattern.name.clone(),
                            matched_text: matched.to_string(),
                            start,
                            end: start + needle_bytes.len(),
                            category: pattern.category,
                        });
                    }
                }
            }
        }
    }
}

impl MatcherBackend for AltBackend {
    fn name(&self) -> &'static str {
        "alt"
    }

    fn scan(&self, text: &str, filter: Option<PatternCategory>) -> Vec<PatternMatch> {
        let mut hits = Vec::new();
        for pattern in &self.literals {
            Self::scan_literal(pattern, text, filter, &mut hits);
        }
        for compiled in &self.fallback {
            collect_hits(compiled, text, filter, &mut hits);
        }
        hits
    }

    fn pattern_count(&self) -> usize {
        self.literals.len() + self.fallback.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Pattern> {
        vec![
            Pattern::new(1, "203.0.113.9", PatternCategory::Blacklist, 0),
            Pattern::new(2, "evil-*.example", PatternCategory::Blacklist, 1),
            Pattern::new(3, "198.51.100.0/24", PatternCategory::Blacklist, 2),
            Pattern::new(4, "trusted-merchant", PatternCategory::Whitelist, 0),
        ]
    }

    fn backends() -> Vec<Box<dyn MatcherBackend>> {
        vec![
            compile_backend(BackendPreference::HighPerf, &corpus()).unwrap(),
            compile_backend(BackendPreference::Std, &corpus()).unwrap(),
            compile_backend(BackendPreference::Alt, &corpus()).unwrap(),
        ]
    }

    #[test]
    fn auto_prefers_high_perf() {
        let backend = compile_backend(BackendPreference::Auto, &corpus()).unwrap();
        assert_eq!(backend.name(), "high_perf");
    }

    #[test]
    fn preference_parses_from_str() {
        assert_eq!("auto".parse::<BackendPreference>().unwrap(), BackendPreference::Auto);
        assert_eq!("HIGH_PERF".parse::<BackendPreference>().unwrap(), BackendPreference::HighPerf);
        assert_eq!("std".parse::<BackendPreference>().unwrap(), BackendPreference::Std);
        assert_eq!("alt".parse::<BackendPreference>().unwrap(), BackendPreference::Alt);
        assert!("fancy".parse::<BackendPreference>().is_err());
    }

    #[test]
    fn all_backends_agree_on_exact_substring_offsets() {
        for backend in backends() {
            let text = "src=203.0.113.9 dst=10.0.0.1";
            let hits = backend.scan(text, None);
            let hit = hits
                .iter()
                .find(|h| h.pattern_id == 1)
                .unwrap_or_else(|| panic!("{} missed exact pattern", backend.name()));
            assert_eq!(hit.matched_text, "203.0.113.9");
            assert_eq!(&text[hit.start..hit.end], "203.0.113.9");
        }
    }

    #[test]
    fn all_backends_match_wildcards_and_cidrs() {
        for backend in backends() {
            let hits = backend.scan("evil-bot.example", None);
            assert!(
                hits.iter().any(|h| h.pattern_id == 2),
                "{} missed wildcard",
                backend.name()
            );

            let hits = backend.scan("198.51.100.200", None);
            assert!(
                hits.iter().any(|h| h.pattern_id == 3),
                "{} missed CIDR",
                backend.name()
            );

            let hits = backend.scan("198.51.99.200", None);
            assert!(
                !hits.iter().any(|h| h.pattern_id == 3),
                "{} false-positive CIDR",
                backend.name()
            );
        }
    }

    #[test]
    fn category_filter_restricts_hits() {
        for backend in backends() {
            let text = "203.0.113.9 trusted-merchant";
            let all = backend.scan(text, None);
            assert_eq!(all.len(), 2, "{}", backend.name());

            let black = backend.scan(text, Some(PatternCategory::Blacklist));
            assert!(black.iter().all(|h| h.category == PatternCategory::Blacklist));
            assert_eq!(black.len(), 1);

            let white = backend.scan(text, Some(PatternCategory::Whitelist));
            assert_eq!(white.len(), 1);
            assert_eq!(white[0].pattern_id, 4);
        }
    }

    #[test]
    fn repeated_substring_yields_multiple_hits() {
        for backend in backends() {
            let text = "trusted-merchant and trusted-merchant";
            let hits = backend.scan(text, None);
            let count = hits.iter().filter(|h| h.pattern_id == 4).count();
            assert_eq!(count, 2, "{}", backend.name());
        }
    }

    #[test]
    fn compile_error_names_the_offending_pattern() {
        let bad = vec![Pattern::new(9, "10.0.0.0/40", PatternCategory::Blacklist, 0)];
        for pref in [
            BackendPreference::HighPerf,
            BackendPreference::Std,
            BackendPreference::Alt,
        ] {
            match compile_backend(pref, &bad) {
                Err(PatternError::Compile { pattern_id, .. }) => assert_eq!(pattern_id, 9),
                Ok(_) => panic!("expected compile error"),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn empty_corpus_compiles_and_matches_nothing() {
        for pref in [
            BackendPreference::HighPerf,
            BackendPreference::Std,
            BackendPreference::Alt,
        ] {
            let backend = compile_backend(pref, &[]).unwrap();
            assert!(backend.scan("anything", None).is_empty());
            assert_eq!(backend.pattern_count(), 0);
        }
    }
}
