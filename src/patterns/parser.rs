// =============================================================================
// Pattern Parsing — line files, auto-classification, regex conversion
// =============================================================================
//
// Pattern sources are line-oriented block/allow lists. Each line is trimmed;
// blanks and `#` comments are skipped. Classification per line:
//
//   CIDR      contains '/' and either a dotted quad or a ':'
//   Wildcard  contains '*' (also supports '?')
//   Exact     everything else (substring match)
//
// CIDR ranges convert to regexes over the textual address space by whole
// octet (IPv4) or whole 16-bit hextet group (IPv6). The approximation is by
// construction: a /20 matches like a /16.
// =============================================================================

use std::path::Path;

use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern file not found: {path}")]
    FileNotFound { path: String },

    #[error("pattern file read error: {0}")]
    Io(String),

    #[error("pattern category tag '{tag}' must contain 'blacklist' or 'whitelist'")]
    InvalidCategory { tag: String },

    #[error("pattern {pattern_id} failed to compile: {reason}")]
    Compile { pattern_id: u32, reason: String },

    #[error("matcher not ready: state is {state}")]
    NotReady { state: String },
}

// =============================================================================
// Categories & kinds
// =============================================================================

/// Whether a pattern raises or lowers risk when it hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternCategory {
    Blacklist,
    Whitelist,
}

impl PatternCategory {
    /// Derive the category from a source tag; the tag must contain either
    /// substring.
    pub fn from_tag(tag: &str) -> Result<Self, PatternError> {
        let lower = tag.to_ascii_lowercase();
        if lower.contains("blacklist") {
            Ok(Self::Blacklist)
        } else if lower.contains("whitelist") {
            Ok(Self::Whitelist)
        } else {
            Err(PatternError::InvalidCategory {
                tag: tag.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::Whitelist => "whitelist",
        }
    }
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Syntactic class of a pattern, auto-detected per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Exact,
    Wildcard,
    Cidr,
}

// =============================================================================
// Pattern
// =============================================================================

/// One compiled-form-pending pattern from a block/allow list.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: u32,
    pub name: String,
    pub pattern_text: String,
    pub category: PatternCategory,
    pub kind: PatternKind,
    /// True when `pattern_text` must be interpreted as a regex (wildcard and
    /// CIDR forms after conversion).
    pub is_regex: bool,
    pub case_sensitive: bool,
    /// Line order within the source; lower loads earlier.
    pub priority: i32,
}

impl Pattern {
    pub fn new(id: u32, text: &str, category: PatternCategory, priority: i32) -> Self {
        let kind = classify(text);
        Self {
            id,
            name: text.to_string(),
            pattern_text: text.to_string(),
            category,
            kind,
            is_regex: kind != PatternKind::Exact,
            case_sensitive: kind != PatternKind::Cidr,
            priority,
        }
    }

    /// The regex source this pattern compiles to. Exact patterns are fully
    /// escaped so they behave as substring literals.
    pub fn to_regex(&self) -> Result<String, PatternError> {
        let body = match self.kind {
            PatternKind::Exact => regex::escape(&self.pattern_text),
            PatternKind::Wildcard => wildcard_to_regex(&self.pattern_text),
            PatternKind::Cidr => cidr_to_regex(&self.pattern_text).map_err(|reason| {
                PatternError::Compile {
                    pattern_id: self.id,
                    reason,
                }
            })?,
        };
        if self.case_sensitive {
            Ok(body)
        } else {
            Ok(format!("(?i){body}"))
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Detect the syntactic class of one pattern line.
pub fn classify(text: &str) -> PatternKind {
    if text.contains('/') && (text.contains(':') || has_dotted_quad(text)) {
        return PatternKind::Cidr;
    }
    if text.contains('*') || text.contains('?') {
        return PatternKind::Wildcard;
    }
    PatternKind::Exact
}

/// True when the part before '/' looks like an IPv4 dotted quad.
fn has_dotted_quad(text: &str) -> bool {
    let addr = match text.split_once('/') {
        Some((addr, _)) => addr,
        None => text,
    };
    let parts: Vec<&str> = addr.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

// =============================================================================
// Regex conversion
// =============================================================================

/// Convert a glob-style pattern to a regex. `*` matches any sequence, `?`
/// one character; every other metacharacter is escaped.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if "\\.+()[]{}|^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Convert a CIDR range to a regex over the textual address space.
///
/// IPv4 prefixes are widened to whole octets: >=24 keeps three octets,
/// 16..=23 keeps two, 8..=15 keeps one, 0..=7 matches any dotted quad.
/// IPv6 prefixes are widened to whole 16-bit hextet groups.
pub fn cidr_to_regex(cidr: &str) -> Result<String, String> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("'{cidr}' is not a CIDR range"))?;

    let prefix_len: u32 = prefix
        .trim()
        .parse()
        .map_err(|_| format!("invalid prefix length '{prefix}'"))?;

    if addr.contains(':') {
        return ipv6_cidr_regex(addr, prefix_len);
    }
    ipv4_cidr_regex(addr, prefix_len)
}

fn ipv4_cidr_regex(addr: &str, prefix_len: u32) -> Result<String, String> {
    if prefix_len > 32 {
        return Err(format!("IPv4 prefix length {prefix_len} outside [0, 32]"));
    }

    let octets: Vec<u8> = addr
        .split('.')
        .map(|p| p.parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("invalid IPv4 address '{addr}'"))?;
    if octets.len() != 4 {
        return Err(format!("invalid IPv4 address '{addr}'"));
    }

    let any = r"\d{1,3}";
    let regex = if prefix_len >= 24 {
        format!(r"{}\.{}\.{}\.{any}", octets[0], octets[1], octets[2])
    } else if prefix_len >= 16 {
        format!(r"{}\.{}\.{any}\.{any}", octets[0], octets[1])
    } else if prefix_len >= 8 {
        format!(r"{}\.{any}\.{any}\.{any}", octets[0])
    } else {
        format!(r"{any}\.{any}\.{any}\.{any}")
    };
    Ok(regex)
}

fn ipv6_cidr_regex(addr: &str, prefix_len: u32) -> Result<String, String> {
    if prefix_len > 128 {
        return Err(format!("IPv6 prefix length {prefix_len} outside [0, 128]"));
    }

    let parsed: std::net::Ipv6Addr = addr
        .parse()
        .map_err(|_| format!("invalid IPv6 address '{addr}'"))?;

    let whole_groups = (prefix_len / 16) as usize;
    if whole_groups == 0 {
        // Anything that looks like an IPv6 address. Case folding is applied
        // by the caller via the pattern's case_sensitive flag.
        return Ok(r"[0-9a-fA-F]{0,4}(:[0-9a-fA-F]{0,4})+".to_string());
    }

    let groups: Vec<String> = parsed.segments()[..whole_groups]
        .iter()
        .map(|g| format!("0*{:x}", g))
        .collect();

    let mut regex = groups.join(":");
    if whole_groups < 8 {
        regex.push_str(":[0-9a-fA-F:]*");
    }
    Ok(regex)
}

// =============================================================================
// Line-file parsing
// =============================================================================

/// Parse pattern lines, assigning ids starting at `next_id`.
pub fn parse_lines(content: &str, category: PatternCategory, next_id: u32) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    let mut id = next_id;

    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        patterns.push(Pattern::new(id, line, category, line_no as i32));
        id += 1;
    }

    patterns
}

/// Read and parse a pattern file whose category is derived from `tag`.
pub fn load_pattern_file(
    path: impl AsRef<Path>,
    tag: &str,
    next_id: u32,
) -> Result<Vec<Pattern>, PatternError> {
    let path = path.as_ref();
    let category = PatternCategory::from_tag(tag)?;

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PatternError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            PatternError::Io(format!("{}: {e}", path.display()))
        }
    })?;

    Ok(parse_lines(&content, category, next_id))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    // ---- classification --------------------------------------------------

    #[test]
    fn classify_exact_wildcard_cidr() {
        assert_eq!(classify("bad-merchant-77"), PatternKind::Exact);
        assert_eq!(classify("203.0.113.9"), PatternKind::Exact);
        assert_eq!(classify("evil-*.example"), PatternKind::Wildcard);
        assert_eq!(classify("fp-????"), PatternKind::Wildcard);
        assert_eq!(classify("203.0.113.0/24"), PatternKind::Cidr);
        assert_eq!(classify("2001:db8::/32"), PatternKind::Cidr);
        // '/' without an address shape is not CIDR.
        assert_eq!(classify("path/to/thing"), PatternKind::Exact);
    }

    // ---- wildcard conversion ---------------------------------------------

    #[test]
    fn wildcard_conversion_escapes_metacharacters() {
        assert_eq!(wildcard_to_regex("a*b"), "a.*b");
        assert_eq!(wildcard_to_regex("a?b"), "a.b");
        assert_eq!(wildcard_to_regex("a.b*"), r"a\.b.*");
        assert_eq!(wildcard_to_regex("x+(y)"), r"x\+\(y\)");
    }

    #[test]
    fn wildcard_regex_matches_expected_strings() {
        let re = regex::Regex::new(&wildcard_to_regex("bot-*.crawler")).unwrap();
        assert!(re.is_match("bot-2000.crawler"));
        assert!(!re.is_match("bot:2000Xcrawler"));
    }

    // ---- CIDR conversion -------------------------------------------------

    #[test]
    fn ipv4_cidr_buckets() {
        assert_eq!(cidr_to_regex("203.0.113.0/24").unwrap(), r"203\.0\.113\.\d{1,3}");
        assert_eq!(cidr_to_regex("203.0.113.0/28").unwrap(), r"203\.0\.113\.\d{1,3}");
        assert_eq!(cidr_to_regex("10.20.0.0/16").unwrap(), r"10\.20\.\d{1,3}\.\d{1,3}");
        assert_eq!(cidr_to_regex("10.20.0.0/20").unwrap(), r"10\.20\.\d{1,3}\.\d{1,3}");
        assert_eq!(cidr_to_regex("10.0.0.0/8").unwrap(), r"10\.\d{1,3}\.\d{1,3}\.\d{1,3}");
        assert_eq!(
            cidr_to_regex("10.0.0.0/4").unwrap(),
            r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}"
        );
    }

    #[test]
    fn ipv4_cidr_regex_matches_members() {
        let re = regex::Regex::new(&cidr_to_regex("203.0.113.0/24").unwrap()).unwrap();
        assert!(re.is_match("203.0.113.77"));
        assert!(!re.is_match("203.0.112.77"));
    }

    #[test]
    fn invalid_cidr_rejected() {
        assert!(cidr_to_regex("203.0.113.0/33").is_err());
        assert!(cidr_to_regex("203.0.113.0/bad").is_err());
        assert!(cidr_to_regex("300.0.113.0/24").is_err());
        assert!(cidr_to_regex("203.0.113.0").is_err());
        assert!(cidr_to_regex("2001:db8::/129").is_err());
    }

    #[test]
    fn ipv6_cidr_matches_prefix_groups() {
        let re = regex::Regex::new(&cidr_to_regex("2001:db8::/32").unwrap()).unwrap();
        assert!(re.is_match("2001:db8:0:0:0:0:0:1"));
        assert!(re.is_match("2001:0db8:1:2:3:4:5:6"));
        assert!(!re.is_match("2001:dead:0:0:0:0:0:1"));
    }

    // ---- categories ------------------------------------------------------

    #[test]
    fn category_from_tag_substring() {
        assert_eq!(
            PatternCategory::from_tag("ip_blacklist").unwrap(),
            PatternCategory::Blacklist
        );
        assert_eq!(
            PatternCategory::from_tag("merchant-whitelist-v2").unwrap(),
            PatternCategory::Whitelist
        );
        assert!(PatternCategory::from_tag("greylist").is_err());
    }

    // ---- line parsing ----------------------------------------------------

    #[test]
    fn parse_skips_comments_and_blanks() {
        let content = "\n# header comment\n  203.0.113.9  \n\n   # indented comment\nevil-*.example\n";
        let patterns = parse_lines(content, PatternCategory::Blacklist, 1);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].pattern_text, "203.0.113.9");
        assert_eq!(patterns[0].id, 1);
        assert_eq!(patterns[1].pattern_text, "evil-*.example");
        assert_eq!(patterns[1].id, 2);
        assert_eq!(patterns[1].kind, PatternKind::Wildcard);
        assert!(patterns[1].is_regex);
    }

    #[test]
    fn exact_pattern_regex_is_fully_escaped() {
        let p = Pattern::new(1, "203.0.113.9", PatternCategory::Blacklist, 0);
        assert_eq!(p.to_regex().unwrap(), r"203\.0\.113\.9");
        let re = regex::Regex::new(&p.to_regex().unwrap()).unwrap();
        assert!(re.is_match("ip=203.0.113.9;"));
        assert!(!re.is_match("203a0.113.9"));
    }

    #[test]
    fn bad_cidr_reports_pattern_id() {
        let p = Pattern::new(42, "1.2.3.4/99", PatternCategory::Blacklist, 0);
        match p.to_regex().unwrap_err() {
            PatternError::Compile { pattern_id, .. } => assert_eq!(pattern_id, 42),
            other => panic!("unexpected error: {other}"),
        }
    }
}
