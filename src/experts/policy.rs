//! Output policy: length cap, then disallowed-content redaction
//!
//! The order is fixed. Truncation runs first so the redaction pass sees
//! exactly the text that will be returned. A sensitive span cut by the
//! truncation is redacted whole, and the cap is applied once more after
//! redaction since a placeholder can be longer than the span it replaces.

use regex::Regex;
use std::sync::OnceLock;

use crate::errors::{ChatError, Result};

pub const REDACTION_PLACEHOLDER: &str = "[redacted]";

const ELLIPSIS: char = '…';

/// Built-in heuristic PII and secret markers
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("email", r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}"),
    ("phone", r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b"),
    ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    (
        "credit_card",
        r"\b(?:4\d{3}|5[1-5]\d{2}|3[47]\d{2}|6(?:011|5\d{2}))[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{3,4}\b",
    ),
    ("aws_access_key", r"\bAKIA[0-9A-Z]{16}\b"),
    ("jwt", r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\b"),
    ("private_key", r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----"),
    ("github_token", r"\bgh[pousr]_[A-Za-z0-9]{36}\b"),
    (
        "assigned_secret",
        r#"(?i)(?:api[_-]?key|secret|token|password|passwd)\s*[=:]\s*['"]?[A-Za-z0-9_\-]{12,}['"]?"#,
    ),
];

fn builtin_regexes() -> &'static [(&'static str, Regex)] {
    static SET: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    SET.get_or_init(|| {
        BUILTIN_PATTERNS
            .iter()
            .map(|(name, pattern)| (*name, Regex::new(pattern).expect("built-in pattern is valid")))
            .collect()
    })
}

/// Result of applying the policy to one text
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub text: String,
    pub truncated: bool,
    pub redacted: bool,
    /// Number of spans replaced
    pub redactions: usize,
}

#[derive(Debug, Clone)]
pub struct OutputPolicy {
    max_chars: usize,
    extra: Vec<Regex>,
}

impl OutputPolicy {
    /// Build from the configured cap and extra patterns
    pub fn new(max_chars: usize, extra_patterns: &[String]) -> Result<Self> {
        let extra = extra_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ChatError::ConfigError(format!("Invalid redaction pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            max_chars: max_chars.max(1),
            extra,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn apply(&self, text: &str) -> PolicyOutcome {
        let (mut capped, mut truncated) = truncate(text, self.max_chars);
        let mut redactions = 0;

        if truncated {
            if let Some(start) = self.straddling_span(text, &capped) {
                capped = format!("{}{}{}", &text[..start], REDACTION_PLACEHOLDER, ELLIPSIS);
                redactions += 1;
            }
        }

        let (mut text, found) = self.redact(&capped);
        redactions += found;

        if text.chars().count() > self.max_chars {
            text = truncate(&text, self.max_chars).0;
            truncated = true;
        }

        PolicyOutcome {
            text,
            truncated,
            redacted: redactions > 0,
            redactions,
        }
    }

    fn patterns(&self) -> impl Iterator<Item = &Regex> {
        builtin_regexes().iter().map(|(_, re)| re).chain(self.extra.iter())
    }

    /// Start of the earliest match in `original` that the cut in `capped` splits
    fn straddling_span(&self, original: &str, capped: &str) -> Option<usize> {
        let kept = capped.strip_suffix(ELLIPSIS).unwrap_or(capped).len();
        self.patterns()
            .filter_map(|re| {
                re.find_iter(original)
                    .find(|m| m.start() < kept && m.end() > kept)
                    .map(|m| m.start())
            })
            .min()
    }

    fn redact(&self, text: &str) -> (String, usize) {
        let mut current = text.to_string();
        let mut count = 0;

        for re in self.patterns() {
            let hits = re.find_iter(&current).count();
            if hits > 0 {
                count += hits;
                current = re.replace_all(&current, REDACTION_PLACEHOLDER).into_owned();
            }
        }

        (current, count)
    }
}

/// Cap at `max` chars, backing off to a word boundary and marking the cut
pub fn truncate(text: &str, max: usize) -> (String, bool) {
    if text.chars().count() <= max {
        return (text.to_string(), false);
    }

    let keep = max.saturating_sub(1);
    let cut = text.char_indices().nth(keep).map_or(text.len(), |(idx, _)| idx);
    let mut head = &text[..cut];

    // Prefer a whitespace boundary in the second half of the kept text
    if let Some(space) = head.rfind(char::is_whitespace) {
        if space >= cut / 2 {
            head = &head[..space];
        }
    }

    let mut out = head.trim_end().to_string();
    out.push(ELLIPSIS);
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max: usize) -> OutputPolicy {
        OutputPolicy::new(max, &[]).unwrap()
    }

    #[test]
    fn test_short_text_untouched() {
        let outcome = policy(100).apply("A 3 bed home at $420,000 in 78701.");
        assert_eq!(outcome.text, "A 3 bed home at $420,000 in 78701.");
        assert!(!outcome.truncated);
        assert!(!outcome.redacted);
    }

    #[test]
    fn test_truncates_on_word_boundary() {
        let outcome = policy(20).apply("This lovely bungalow sits on a quiet street");
        assert!(outcome.truncated);
        assert!(outcome.text.chars().count() <= 20);
        assert_eq!(outcome.text, "This lovely…");
    }

    #[test]
    fn test_truncation_respects_multibyte() {
        let (text, truncated) = truncate("ééééééééé", 4);
        assert!(truncated);
        assert_eq!(text, "ééé…");
    }

    #[test]
    fn test_redacts_pii() {
        let outcome = policy(500).apply(
            "Call the agent at 512-555-0199 or mail jane.doe@example.com; SSN 123-45-6789.",
        );
        assert!(outcome.redacted);
        assert_eq!(outcome.redactions, 3);
        assert!(!outcome.text.contains("555-0199"));
        assert!(!outcome.text.contains("example.com"));
        assert!(!outcome.text.contains("6789"));
    }

    #[test]
    fn test_prices_and_ids_not_redacted() {
        let outcome = policy(500).apply("Listing 2087654321 at $1,250,000 with 4 beds, zip 78704.");
        assert!(!outcome.redacted);
    }

    #[test]
    fn test_span_outside_cap_is_cut_away() {
        let text = format!("{} contact jane@example.com", "word ".repeat(10));
        let outcome = policy(30).apply(&text);
        assert!(outcome.truncated);
        assert!(!outcome.redacted);
        assert!(!outcome.text.contains('@'));
    }

    #[test]
    fn test_span_split_by_cap_is_redacted() {
        let outcome = policy(20).apply("Email jane.doe.listings@austin-homes-realty.com today");
        assert!(outcome.truncated);
        assert!(outcome.redacted);
        assert_eq!(outcome.text, "Email [redacted]…");
        assert!(outcome.text.chars().count() <= 20);
    }

    #[test]
    fn test_placeholder_never_exceeds_cap() {
        let outcome = policy(8).apply("a@b.co x");
        assert!(outcome.redacted);
        assert!(outcome.truncated);
        assert!(!outcome.text.contains("a@b"));
        assert!(outcome.text.chars().count() <= 8);
    }

    #[test]
    fn test_extra_patterns() {
        let policy = OutputPolicy::new(500, &[r"(?i)lockbox code \d+".to_string()]).unwrap();
        let outcome = policy.apply("Use lockbox code 4417 at the door");
        assert_eq!(outcome.text, "Use [redacted] at the door");
        assert!(OutputPolicy::new(10, &["(".to_string()]).is_err());
    }
}
