//! Role-specific prompt templates and completion parsing

use regex::Regex;
use std::sync::OnceLock;

use crate::clients::CompletionRequest;
use crate::rag::RagResult;
use crate::types::{ConversationContext, ExpertRole, TurnRole};

/// Prior turns included in every prompt
pub const HISTORY_TURNS: usize = 6;

const RESPONSE_FORMAT: &str = "Respond in exactly this format:\n\
RATIONALE: <one or two sentences on what you focused on>\n\
ANSWER: <your answer for the user>";

const SHARED_RULES: &str = "Only cite listing facts that appear in the provided listings. \
If the listings do not cover the question, say so plainly. Never include personal contact \
details.";

/// System template for a role
pub fn system_template(role: ExpertRole) -> String {
    let lens = match role {
        ExpertRole::Data => {
            "You are the data expert of a real-estate assistant. Answer with concrete listing \
             facts and market statistics: prices, sizes, bedroom counts and how they compare."
        }
        ExpertRole::Finance => {
            "You are the finance expert of a real-estate assistant. Focus on affordability, \
             price per square foot, price positioning within the market and what a buyer's \
             budget can get."
        }
        ExpertRole::Lifestyle => {
            "You are the lifestyle expert of a real-estate assistant. Focus on day-to-day \
             living: space, layout, outdoor areas, amenities and the feel of each home."
        }
        ExpertRole::Neighborhood => {
            "You are the neighborhood expert of a real-estate assistant. Focus on location: \
             cities, zip codes, schools, commute and the character of the area."
        }
        ExpertRole::Cluster => {
            "You are the similar-homes expert of a real-estate assistant. Group the listings \
             into comparable segments and recommend homes similar to what the user likes."
        }
    };
    format!("{}\n\n{}\n\n{}", lens, SHARED_RULES, RESPONSE_FORMAT)
}

/// Builds one completion request per selected role
pub struct PromptBuilder {
    history_turns: usize,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            history_turns: HISTORY_TURNS,
        }
    }

    pub fn build(
        &self,
        role: ExpertRole,
        query: &str,
        context: &ConversationContext,
        rag: &RagResult,
    ) -> CompletionRequest {
        let mut sections = Vec::new();

        let history: Vec<String> = context
            .recent(self.history_turns)
            .map(|turn| {
                let speaker = match turn.role {
                    TurnRole::User => "User",
                    TurnRole::Assistant => "Assistant",
                };
                format!("{}: {}", speaker, turn.content.trim())
            })
            .collect();
        if !history.is_empty() {
            sections.push(format!("Conversation so far:\n{}", history.join("\n")));
        }

        if rag.evidence.is_empty() {
            sections.push("No listings were retrieved for this question.".to_string());
        } else {
            sections.push(rag.evidence.text.clone());
        }

        if matches!(role, ExpertRole::Data | ExpertRole::Finance) && !rag.insights.is_empty() {
            sections.push(format!("Market summary:\n{}", rag.insights.render()));
        }

        if matches!(role, ExpertRole::Cluster | ExpertRole::Lifestyle) {
            if let Some(hint) = rag.cluster.hint_text() {
                let mut block = format!("Closest segment: {}", hint);
                if !rag.cluster.similar_homes.is_empty() {
                    block.push_str(&format!("\nSimilar homes: {}", rag.cluster.similar_homes.join(", ")));
                }
                sections.push(block);
            }
        }

        sections.push(format!("Question: {}", query.trim()));

        CompletionRequest {
            role,
            system: system_template(role),
            prompt: sections.join("\n\n"),
        }
    }

    pub fn build_all(
        &self,
        roles: &[ExpertRole],
        query: &str,
        context: &ConversationContext,
        rag: &RagResult,
    ) -> Vec<CompletionRequest> {
        roles
            .iter()
            .map(|role| self.build(*role, query, context, rag))
            .collect()
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(rationale|answer)\s*:").expect("marker pattern is valid"))
}

/// Split completion text into (rationale, answer).
///
/// Text without an `ANSWER:` marker is taken whole as the answer.
pub fn parse_completion(text: &str) -> (String, String) {
    let markers: Vec<(bool, usize, usize)> = marker_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let is_answer = caps.get(1)?.as_str().eq_ignore_ascii_case("answer");
            Some((is_answer, whole.start(), whole.end()))
        })
        .collect();

    let Some(&(_, answer_start, answer_end)) = markers.iter().find(|m| m.0) else {
        return (String::new(), text.trim().to_string());
    };

    let answer = text[answer_end..].trim().to_string();
    let rationale = match markers.iter().find(|m| !m.0 && m.1 < answer_start) {
        Some(&(_, _, end)) => text[end..answer_start].trim().to_string(),
        None => text[..answer_start].trim().to_string(),
    };

    (rationale, answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::gate::{GateDecision, GateFeatures, GateReason};
    use crate::types::Turn;

    fn skipped_rag() -> RagResult {
        RagResult::skipped(
            GateDecision {
                retrieve: false,
                reason: GateReason::Skipped,
                reformulated: None,
                filter: None,
                features: GateFeatures {
                    has_numeric_filter: false,
                    has_location: false,
                    drift: 1.0,
                    retrieved_in_window: true,
                },
            },
            "thanks",
        )
    }

    #[test]
    fn test_parse_structured_completion() {
        let (rationale, answer) =
            parse_completion("RATIONALE: focused on price.\nANSWER: The cheapest is $390,000.");
        assert_eq!(rationale, "focused on price.");
        assert_eq!(answer, "The cheapest is $390,000.");
    }

    #[test]
    fn test_parse_unstructured_completion() {
        let (rationale, answer) = parse_completion("  Just a plain answer.  ");
        assert!(rationale.is_empty());
        assert_eq!(answer, "Just a plain answer.");
    }

    #[test]
    fn test_prompt_contains_history_and_question() {
        let context = ConversationContext::new("c1")
            .with_turn(Turn::user("homes in Austin"))
            .with_turn(Turn::assistant("Here are three.", true));
        let request = PromptBuilder::new().build(ExpertRole::Finance, "which is cheapest?", &context, &skipped_rag());

        assert_eq!(request.role, ExpertRole::Finance);
        assert!(request.system.contains("finance expert"));
        assert!(request.system.contains("ANSWER:"));
        assert!(request.prompt.contains("User: homes in Austin"));
        assert!(request.prompt.contains("No listings were retrieved"));
        assert!(request.prompt.ends_with("Question: which is cheapest?"));
    }

    #[test]
    fn test_templates_differ_per_role() {
        let templates: std::collections::HashSet<String> =
            ExpertRole::ALL.iter().map(|r| system_template(*r)).collect();
        assert_eq!(templates.len(), ExpertRole::COUNT);
    }
}
