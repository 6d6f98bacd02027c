// Lexical tokenization shared by the gate, re-ranker and merger
use std::collections::BTreeSet;

/// Words too common to carry topic or fact signal
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "this", "that", "there",
    "these", "those", "have", "has", "had", "what", "which", "who", "whom", "how", "about",
    "any", "can", "could", "would", "should", "will", "just", "also", "some", "more", "most",
    "very", "into", "from", "than", "then", "them", "they", "their", "its", "our", "out", "was",
    "were", "been", "being", "does", "did", "doing", "too", "all", "one", "ones", "get", "got",
    "like", "want", "need", "please", "thanks", "thank", "okay", "yes", "show", "tell", "give",
    "find", "let", "know", "here", "where", "when", "why", "much", "many", "such", "other",
];

/// Lowercase alphanumeric tokens in order, keeping digits and
/// treating `,` inside numbers as part of the number
pub fn raw_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        let numeric_comma = c == ','
            && !current.is_empty()
            && current.chars().all(|d| d.is_ascii_digit())
            && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit());

        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if numeric_comma {
            continue;
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Distinct content tokens: stop words and short alphabetic tokens removed,
/// numbers always kept
pub fn content_tokens(text: &str) -> BTreeSet<String> {
    raw_tokens(text)
        .into_iter()
        .filter(|t| {
            let numeric = t.chars().any(|c| c.is_ascii_digit());
            numeric || (t.chars().count() >= 3 && !STOP_WORDS.contains(&t.as_str()))
        })
        .collect()
}

/// Whitespace-collapsed, lowercased form used for cache keys
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_tokens_keep_grouped_numbers() {
        let tokens = raw_tokens("Homes under $450,000, 3-bed!");
        assert_eq!(tokens, vec!["homes", "under", "450000", "3", "bed"]);
    }

    #[test]
    fn test_content_tokens_drop_stop_words() {
        let tokens = content_tokens("What about the pool and 2 baths?");
        assert!(tokens.contains("pool"));
        assert!(tokens.contains("baths"));
        assert!(tokens.contains("2"));
        assert!(!tokens.contains("what"));
        assert!(!tokens.contains("the"));
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  3 Bed   Homes\tin AUSTIN "), "3 bed homes in austin");
    }
}
