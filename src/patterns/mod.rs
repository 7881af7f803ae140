pub mod backend;
pub mod matcher;
pub mod parser;

// Re-export the matcher surface (e.g. `use crate::patterns::PatternMatcher`).
pub use backend::{BackendPreference, MatcherBackend, PatternMatch};
pub use matcher::{MatchResults, MatcherState, MatcherStatistics, PatternMatcher};
pub use parser::{Pattern, PatternCategory, PatternError, PatternKind};
