//! Retrieval gate
//!
//! Pure, deterministic decision over the query and the conversation snapshot:
//! should similarity search run this turn, with which query and filter.
//!
//! Retrieval runs when any of the following holds:
//! - the query carries explicit numeric or location constraints
//! - topic drift against the recent window is below the threshold
//! - no assistant turn in the window ran retrieval yet
//!
//! Drift is `1 - |Q ∩ H| / |Q|` over content tokens, where `Q` is the query
//! and `H` the last `topic_window` turns. An empty `Q` has drift 1.0.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::RetrievalConfig;
use crate::rag::tokens::content_tokens;
use crate::types::{BoundingBox, ConversationContext, RetrievalFilter, TurnRole};

/// Why the gate decided the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    ExplicitConstraints,
    OnTopic,
    NotYetRetrieved,
    Skipped,
}

/// Signals the gate computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateFeatures {
    pub has_numeric_filter: bool,
    pub has_location: bool,
    pub drift: f64,
    pub retrieved_in_window: bool,
}

/// Gate output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub retrieve: bool,
    pub reason: GateReason,
    /// Query to send to search when it differs from the user's text
    pub reformulated: Option<String>,
    pub filter: Option<RetrievalFilter>,
    pub features: GateFeatures,
}

impl GateDecision {
    /// Query text that should reach similarity search
    pub fn search_query<'a>(&'a self, original: &'a str) -> &'a str {
        self.reformulated.as_deref().unwrap_or(original)
    }
}

/// Retrieval gate
#[derive(Debug, Clone)]
pub struct RetrievalGate {
    drift_threshold: f64,
    topic_window: usize,
}

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\$)?\s?(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)\s*(k|m|mm|million|thousand)?\b",
        )
        .expect("amount pattern is valid")
    })
}

fn beds_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?|one|two|three|four|five|six)\s*\+?\s*(?:-\s*)?(?:bedrooms?|beds?|br|bd)\b")
            .expect("beds pattern is valid")
    })
}

fn baths_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?|one|two|three|four|five|six)\s*\+?\s*(?:-\s*)?(?:bathrooms?|baths?|ba)\b")
            .expect("baths pattern is valid")
    })
}

fn zip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{5})(?:-\d{4})?\b").expect("zip pattern is valid"))
}

fn place_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:in|near|around)\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)*)")
            .expect("place pattern is valid")
    })
}

const LOCATION_WORDS: &[&str] = &[
    "neighborhood", "neighbourhood", "downtown", "suburb", "suburbs", "zip", "zipcode",
    "location", "located", "nearby", "district", "city", "county", "commute",
];

fn word_number(text: &str) -> Option<f64> {
    match text.to_lowercase().as_str() {
        "one" => Some(1.0),
        "two" => Some(2.0),
        "three" => Some(3.0),
        "four" => Some(4.0),
        "five" => Some(5.0),
        "six" => Some(6.0),
        other => other.parse().ok(),
    }
}

/// A money amount found in text
#[derive(Debug, Clone, Copy)]
struct Amount {
    value: f64,
    start: usize,
    end: usize,
}

fn find_amounts(query: &str) -> Vec<Amount> {
    amount_regex()
        .captures_iter(query)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let digits = caps.get(2)?.as_str().replace(',', "");
            let mut value: f64 = digits.parse().ok()?;
            let dollar = caps.get(1).is_some();
            match caps.get(3).map(|m| m.as_str().to_lowercase()) {
                Some(ref s) if s == "k" || s == "thousand" => value *= 1_000.0,
                Some(ref s) if s == "m" || s == "mm" || s == "million" => value *= 1_000_000.0,
                Some(_) => {}
                None if dollar || value >= 10_000.0 => {}
                // Bare small numbers are counts, not prices
                None => return None,
            }
            // A five-digit bare number is more likely a zip code
            if !dollar && caps.get(3).is_none() && digits.len() == 5 {
                return None;
            }
            Some(Amount {
                value,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

fn qualifier_before(query: &str, start: usize) -> Option<&'static str> {
    let prefix = query[..start].to_lowercase();
    let window: String = prefix.chars().rev().take(16).collect::<Vec<_>>().into_iter().rev().collect();
    const MAX: &[&str] = &["under", "below", "less than", "max", "up to", "at most", "budget", "within"];
    const MIN: &[&str] = &["over", "above", "more than", "at least", "min", "starting at", "from"];
    if MAX.iter().any(|q| window.contains(q)) {
        Some("max")
    } else if MIN.iter().any(|q| window.contains(q)) {
        Some("min")
    } else {
        None
    }
}

/// Extract structured constraints from free text
pub fn extract_filter(query: &str) -> RetrievalFilter {
    let mut filter = RetrievalFilter::default();

    let amounts = find_amounts(query);
    match amounts.as_slice() {
        [] => {}
        [single] => match qualifier_before(query, single.start) {
            Some("max") => filter.price_max = Some(single.value),
            Some(_) => filter.price_min = Some(single.value),
            None => {
                filter.price_min = Some(single.value * 0.9);
                filter.price_max = Some(single.value * 1.1);
            }
        },
        [first, second, ..] => {
            filter.price_min = Some(first.value.min(second.value));
            filter.price_max = Some(first.value.max(second.value));
        }
    }

    if let Some(caps) = beds_regex().captures(query) {
        filter.beds_min = caps.get(1).and_then(|m| word_number(m.as_str()));
    }
    if let Some(caps) = baths_regex().captures(query) {
        filter.baths_min = caps.get(1).and_then(|m| word_number(m.as_str()));
    }

    for caps in zip_regex().captures_iter(query) {
        let Some(m) = caps.get(1) else { continue };
        let claimed = amounts.iter().any(|a| m.start() >= a.start && m.start() < a.end);
        let dollar = query[..m.start()].ends_with('$');
        if !claimed && !dollar {
            let zip = m.as_str().to_string();
            if !filter.zip_allow.contains(&zip) {
                filter.zip_allow.push(zip);
            }
        }
    }

    filter
}

/// Whether the text names a place, zip or location concept
pub fn mentions_location(query: &str) -> bool {
    if place_regex().is_match(query) {
        return true;
    }
    if !extract_filter(query).zip_allow.is_empty() {
        return true;
    }
    let tokens = content_tokens(query);
    LOCATION_WORDS.iter().any(|w| tokens.contains(*w))
}

fn place_phrase(text: &str) -> Option<String> {
    place_regex()
        .captures(text)
        .and_then(|caps| caps.get(0))
        .map(|m| m.as_str().to_string())
}

/// Token-overlap drift between the query and the recent window
pub fn topic_drift(query: &str, context: &ConversationContext, window: usize) -> f64 {
    let query_tokens = content_tokens(query);
    if query_tokens.is_empty() {
        return 1.0;
    }

    let mut history = std::collections::BTreeSet::new();
    for turn in context.recent(window) {
        history.extend(content_tokens(&turn.content));
    }

    let shared = query_tokens.intersection(&history).count();
    1.0 - shared as f64 / query_tokens.len() as f64
}

impl RetrievalGate {
    pub fn new(drift_threshold: f64, topic_window: usize) -> Self {
        Self {
            drift_threshold,
            topic_window: topic_window.max(1),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.drift_threshold, config.topic_window)
    }

    /// Decide retrieval for one turn. `context` holds prior turns only.
    pub fn decide(
        &self,
        query: &str,
        context: &ConversationContext,
        bounds: Option<BoundingBox>,
    ) -> GateDecision {
        let mut filter = extract_filter(query);
        if bounds.is_some() {
            filter.bounds = bounds;
        }

        let has_numeric_filter = filter.price_min.is_some()
            || filter.price_max.is_some()
            || filter.beds_min.is_some()
            || filter.baths_min.is_some();
        let has_location = bounds.is_some() || mentions_location(query);
        let drift = topic_drift(query, context, self.topic_window);
        let retrieved_in_window = context
            .recent(self.topic_window)
            .any(|t| t.role == TurnRole::Assistant && t.retrieved);

        let features = GateFeatures {
            has_numeric_filter,
            has_location,
            drift,
            retrieved_in_window,
        };

        let reason = if has_numeric_filter || has_location {
            GateReason::ExplicitConstraints
        } else if drift < self.drift_threshold {
            GateReason::OnTopic
        } else if !retrieved_in_window {
            GateReason::NotYetRetrieved
        } else {
            GateReason::Skipped
        };

        if reason == GateReason::Skipped {
            return GateDecision {
                retrieve: false,
                reason,
                reformulated: None,
                filter: None,
                features,
            };
        }

        // Follow-ups on the same topic inherit earlier constraints and place.
        let mut reformulated = None;
        if drift < self.drift_threshold {
            self.inherit_constraints(context, &mut filter);
            if !has_location {
                let carried = context
                    .recent(self.topic_window)
                    .filter(|t| t.role == TurnRole::User)
                    .filter_map(|t| place_phrase(&t.content))
                    .last();
                if let Some(place) = carried {
                    reformulated = Some(format!("{} {}", query.trim(), place));
                }
            }
        }

        GateDecision {
            retrieve: true,
            reason,
            reformulated,
            filter: if filter.is_empty() { None } else { Some(filter) },
            features,
        }
    }

    fn inherit_constraints(&self, context: &ConversationContext, filter: &mut RetrievalFilter) {
        for turn in context
            .recent(self.topic_window)
            .filter(|t| t.role == TurnRole::User)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
        {
            let earlier = extract_filter(&turn.content);
            if filter.price_min.is_none() && filter.price_max.is_none() {
                filter.price_min = earlier.price_min;
                filter.price_max = earlier.price_max;
            }
            if filter.beds_min.is_none() {
                filter.beds_min = earlier.beds_min;
            }
            if filter.baths_min.is_none() {
                filter.baths_min = earlier.baths_min;
            }
            if filter.zip_allow.is_empty() {
                filter.zip_allow = earlier.zip_allow;
            }
        }
    }
}
