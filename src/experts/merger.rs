//! Response merger
//!
//! Slice score = routed weight × (1 + overlap_bonus × cited evidence tokens).
//! Overlap is plain token counting against the retrieved listings so the
//! ordering is deterministic. The best slice becomes the reply body; up to
//! `max_auxiliary` others are kept as panes. The output policy runs last.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::MergerConfig;
use crate::errors::Result;
use crate::experts::policy::OutputPolicy;
use crate::rag::tokens::content_tokens;
use crate::rag::RagResult;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{ExpertRole, ExpertSlice, MergedReply};
use crate::weights::ExpertWeightVector;

/// Listings quoted in an evidence-only reply
const EVIDENCE_ONLY_LISTINGS: usize = 3;

/// A usable slice with its merge score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSlice {
    pub slice: ExpertSlice,
    pub weight: f64,
    pub overlap: usize,
    pub score: f64,
}

pub struct ResponseMerger {
    max_auxiliary: usize,
    overlap_bonus: f64,
    fallback_text: String,
    policy: OutputPolicy,
    telemetry: TelemetryCollector,
}

impl ResponseMerger {
    pub fn new(config: &MergerConfig, telemetry: TelemetryCollector) -> Result<Self> {
        Ok(Self {
            max_auxiliary: config.max_auxiliary,
            overlap_bonus: config.overlap_bonus.max(0.0),
            fallback_text: config.fallback_text.clone(),
            policy: OutputPolicy::new(config.max_reply_chars, &config.redaction_patterns)?,
            telemetry,
        })
    }

    /// Distinct content tokens across the retrieved listings
    pub fn evidence_tokens(rag: &RagResult) -> BTreeSet<String> {
        rag.raw_candidates()
            .flat_map(|c| {
                content_tokens(&format!("{} {}", c.summary(), c.metadata.description))
            })
            .collect()
    }

    /// Usable slices ordered by score desc, then weight desc, then role
    pub fn score(
        &self,
        slices: &[ExpertSlice],
        distribution: &ExpertWeightVector,
        evidence: &BTreeSet<String>,
    ) -> Vec<ScoredSlice> {
        let mut scored: Vec<ScoredSlice> = slices
            .iter()
            .filter(|s| s.is_usable())
            .map(|slice| {
                let weight = distribution.get(slice.role);
                let overlap = content_tokens(&slice.content).intersection(evidence).count();
                ScoredSlice {
                    slice: slice.clone(),
                    weight,
                    overlap,
                    score: weight * (1.0 + self.overlap_bonus * overlap as f64),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal))
                .then_with(|| a.slice.role.cmp(&b.slice.role))
        });
        scored
    }

    /// Compose the reply for one turn. Never fails.
    pub fn merge(
        &self,
        conversation_id: &str,
        slices: &[ExpertSlice],
        distribution: &ExpertWeightVector,
        rag: &RagResult,
    ) -> MergedReply {
        let unavailable: Vec<ExpertRole> = slices
            .iter()
            .filter(|s| !s.is_usable())
            .map(|s| s.role)
            .collect();

        let evidence = Self::evidence_tokens(rag);
        let mut scored = self.score(slices, distribution, &evidence).into_iter();

        let mut reply = match scored.next() {
            Some(primary) => {
                debug!(
                    role = %primary.slice.role,
                    score = primary.score,
                    overlap = primary.overlap,
                    "primary slice chosen"
                );
                let mut reply = MergedReply::new(conversation_id, primary.slice.content.clone());
                reply.primary_role = Some(primary.slice.role);
                reply.auxiliary = scored.take(self.max_auxiliary).map(|s| s.slice).collect();
                reply
            }
            None if rag.is_empty() => {
                info!(conversation_id, "no usable expert output and no evidence; using fallback");
                MergedReply::fallback(conversation_id, self.fallback_text.clone())
            }
            None => {
                info!(conversation_id, "no usable expert output; replying with evidence only");
                MergedReply::fallback(conversation_id, self.evidence_only_text(rag))
            }
        };

        reply.similar_homes = rag.cluster.similar_homes.clone();
        reply.unavailable_experts = unavailable;
        reply.retrieved = rag.retrieved();
        self.enforce_policy(&mut reply);
        reply
    }

    fn evidence_only_text(&self, rag: &RagResult) -> String {
        let lines: Vec<String> = rag
            .raw_candidates()
            .take(EVIDENCE_ONLY_LISTINGS)
            .map(|c| format!("- {}", c.summary()))
            .collect();
        format!(
            "I couldn't reach the experts for a full answer, but these listings match your question:\n{}",
            lines.join("\n")
        )
    }

    fn enforce_policy(&self, reply: &mut MergedReply) {
        let body = self.policy.apply(&reply.text);
        reply.text = body.text;
        reply.truncated = body.truncated;
        let mut redactions = body.redactions;

        for slice in &mut reply.auxiliary {
            let pane = self.policy.apply(&slice.content);
            slice.content = pane.text;
            reply.truncated |= pane.truncated;
            redactions += pane.redactions;
        }

        reply.redacted = redactions > 0;
        if reply.truncated {
            self.telemetry.record(TelemetryEvent::ReplyTruncated {
                timestamp: Instant::now(),
            });
        }
        if reply.redacted {
            self.telemetry.record(TelemetryEvent::ReplyRedacted {
                matches: redactions,
                timestamp: Instant::now(),
            });
        }
    }
}
