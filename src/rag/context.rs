// Evidence block assembly for expert prompts
use serde::{Deserialize, Serialize};

use crate::rag::reranking::RankedCandidate;

/// Evidence assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum tokens for the evidence block
    pub max_context_tokens: usize,
    /// Include fused scores next to each listing
    pub include_scores: bool,
    /// Format for evidence presentation
    pub format: ContextFormat,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 1200,
            include_scores: true,
            format: ContextFormat::Numbered,
        }
    }
}

/// Format for presenting evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextFormat {
    /// One block per listing with its description
    Structured,
    /// Compact single line
    Inline,
    /// Numbered summary lines
    Numbered,
}

/// Assembled evidence for prompt augmentation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub listing_count: usize,
    /// Estimated token count
    pub estimated_tokens: usize,
    pub listing_ids: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.listing_count == 0
    }
}

/// Builds the evidence block from ranked listings
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Create new context builder with default config
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Build evidence from ranked listings, stopping at the token budget
    pub fn build(&self, listings: &[RankedCandidate]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut total_tokens = 0;
        let mut ids = Vec::new();

        for ranked in listings {
            let formatted = self.format_listing(parts.len() + 1, ranked);

            // Rough estimate: ~4 chars per token
            let tokens = formatted.len() / 4;
            if total_tokens + tokens > self.config.max_context_tokens {
                break;
            }

            parts.push(formatted);
            total_tokens += tokens;
            ids.push(ranked.candidate.id.clone());
        }

        if parts.is_empty() {
            return AssembledContext::default();
        }

        let text = match self.config.format {
            ContextFormat::Structured => {
                format!("Retrieved listings ({}):\n\n{}", parts.len(), parts.join("\n\n"))
            }
            ContextFormat::Inline => format!("Listings: {}", parts.join(" | ")),
            ContextFormat::Numbered => format!("Listings:\n{}", parts.join("\n")),
        };

        AssembledContext {
            text,
            listing_count: parts.len(),
            estimated_tokens: total_tokens,
            listing_ids: ids,
        }
    }

    fn format_listing(&self, index: usize, ranked: &RankedCandidate) -> String {
        let summary = ranked.candidate.summary();
        let description = ranked.candidate.metadata.description.trim();

        match self.config.format {
            ContextFormat::Structured => {
                let header = if self.config.include_scores {
                    format!("[Listing {}] (score: {:.2}) {}", index, ranked.fused_score, summary)
                } else {
                    format!("[Listing {}] {}", index, summary)
                };
                if description.is_empty() {
                    header
                } else {
                    format!("{}\n{}", header, description)
                }
            }
            ContextFormat::Inline => summary,
            ContextFormat::Numbered => {
                let mut line = if self.config.include_scores {
                    format!("{}. (score: {:.2}) {}", index, ranked.fused_score, summary)
                } else {
                    format!("{}. {}", index, summary)
                };
                if !description.is_empty() {
                    line.push_str(" | ");
                    line.push_str(&truncate_chars(description, 160));
                }
                line
            }
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
