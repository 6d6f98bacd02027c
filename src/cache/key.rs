//! Deterministic response cache keys

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::rag::tokens::normalize_query;
use crate::types::{ExpertRole, RetrievalFilter};
use crate::weights::ExpertWeightVector;

/// Hex-encoded SHA-256 over the normalized request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key over (normalized query, filter, selected experts, coarse weights).
    ///
    /// The expert set is sorted so selection order does not matter; weights
    /// are rounded to two decimals so tiny drifts still share a key.
    pub fn derive(
        query: &str,
        filter: Option<&RetrievalFilter>,
        selected: &[ExpertRole],
        weights: &ExpertWeightVector,
    ) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(normalize_query(query).as_bytes());
        hasher.update([0u8]);

        let filter_json = filter
            .filter(|f| !f.is_empty())
            .and_then(|f| serde_json::to_string(f).ok())
            .unwrap_or_default();
        hasher.update(filter_json.as_bytes());
        hasher.update([0u8]);

        let mut roles: Vec<ExpertRole> = selected.to_vec();
        roles.sort();
        roles.dedup();
        let roles: Vec<&str> = roles.iter().map(|r| r.name()).collect();
        hasher.update(roles.join(",").as_bytes());
        hasher.update([0u8]);

        hasher.update(Self::fingerprint(weights).as_bytes());

        CacheKey(format!("{:x}", hasher.finalize()))
    }

    /// Weights rounded to 2 decimals, in role order
    pub fn fingerprint(weights: &ExpertWeightVector) -> String {
        weights
            .iter()
            .map(|(role, w)| format!("{}={:.2}", role, w))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
