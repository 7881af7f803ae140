// =============================================================================
// Error taxonomy — typed errors for the decision path
// =============================================================================
//
// Every error carries enough context to increment the per-component error
// counter. Per-rule and per-text failures never surface here: they are
// contained inside their component and the decision is still produced.
// =============================================================================

use thiserror::Error;

/// Errors surfaced to the transport collaborator by `process_decision`.
///
/// Only request-level failures reach the caller. Component-internal failures
/// (a rule that fails to compile, a pattern that fails to match one text)
/// are recorded and contained.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// The request violated a size limit, missed a required field, or carried
    /// an out-of-range value.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The request body failed to parse as a document.
    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },

    /// Unexpected internal failure. Recorded with component and trace id.
    #[error("internal error in {component}: {reason}")]
    Internal { component: String, reason: String },
}

impl DecisionError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    /// The error-kind label used for the `{component, kind}` error counter.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::InvalidDocument { .. } => ErrorKind::InvalidDocument,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Error kinds used to key the error counter. One label per taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidDocument,
    Config,
    RuleCompile,
    RuleEvaluation,
    PatternCompile,
    PatternMatch,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidDocument => "invalid_document",
            Self::Config => "config",
            Self::RuleCompile => "rule_compile",
            Self::RuleEvaluation => "rule_evaluation",
            Self::PatternCompile => "pattern_compile",
            Self::PatternMatch => "pattern_match",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
