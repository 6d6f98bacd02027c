//! Normalized distribution over the expert roles
//!
//! Invariants: every weight is finite and ≥ 0, and the weights sum to 1.0
//! (within floating tolerance) after every operation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{ChatError, Result};
use crate::types::ExpertRole;

const UNIFORM: f64 = 1.0 / ExpertRole::COUNT as f64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<ExpertRole, f64>", into = "BTreeMap<ExpertRole, f64>")]
pub struct ExpertWeightVector {
    weights: [f64; ExpertRole::COUNT],
}

impl ExpertWeightVector {
    pub fn uniform() -> Self {
        Self {
            weights: [UNIFORM; ExpertRole::COUNT],
        }
    }

    /// Build from raw non-negative weights; normalizes, and an all-zero
    /// input becomes uniform
    pub fn from_weights(raw: [f64; ExpertRole::COUNT]) -> Result<Self> {
        if let Some(bad) = raw.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ChatError::WeightStoreError(format!(
                "Invalid expert weight: {}",
                bad
            )));
        }
        let mut vector = Self { weights: raw };
        vector.renormalize();
        Ok(vector)
    }

    pub fn get(&self, role: ExpertRole) -> f64 {
        self.weights[role.index()]
    }

    pub fn as_array(&self) -> [f64; ExpertRole::COUNT] {
        self.weights
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExpertRole, f64)> + '_ {
        ExpertRole::ALL.iter().map(move |role| (*role, self.get(*role)))
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn is_uniform(&self) -> bool {
        self.weights.iter().all(|w| (w - UNIFORM).abs() < 1e-12)
    }

    /// Roles by descending weight; equal weights fall back to lexical order
    pub fn ranked(&self) -> Vec<(ExpertRole, f64)> {
        let mut ranked: Vec<(ExpertRole, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    /// Add `delta` to one role, clamp at zero, renormalize
    pub fn apply_delta(&mut self, role: ExpertRole, delta: f64) {
        let slot = &mut self.weights[role.index()];
        *slot = (*slot + delta).max(0.0);
        self.renormalize();
    }

    /// Pull every weight toward uniform: `w += rate * (1/n - w)`, `steps` times
    pub fn decay(&mut self, rate: f64, steps: u32) {
        if steps == 0 || rate <= 0.0 {
            return;
        }
        let keep = (1.0 - rate.min(1.0)).powi(steps as i32);
        for w in self.weights.iter_mut() {
            *w = UNIFORM + (*w - UNIFORM) * keep;
        }
        self.renormalize();
    }

    /// Element-wise multiplier followed by renormalization
    pub fn scaled(&self, factors: &[f64; ExpertRole::COUNT]) -> Self {
        let mut next = *self;
        for (w, f) in next.weights.iter_mut().zip(factors.iter()) {
            *w = (*w * f.max(0.0)).max(0.0);
        }
        next.renormalize();
        next
    }

    fn renormalize(&mut self) {
        let total: f64 = self.weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            self.weights = [UNIFORM; ExpertRole::COUNT];
            return;
        }
        for w in self.weights.iter_mut() {
            *w /= total;
        }
    }
}

impl Default for ExpertWeightVector {
    fn default() -> Self {
        Self::uniform()
    }
}

impl fmt::Display for ExpertWeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(role, w)| format!("{}: {:.3}", role, w))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl From<ExpertWeightVector> for BTreeMap<ExpertRole, f64> {
    fn from(vector: ExpertWeightVector) -> Self {
        vector.iter().collect()
    }
}

impl TryFrom<BTreeMap<ExpertRole, f64>> for ExpertWeightVector {
    type Error = ChatError;

    /// Missing roles count as zero
    fn try_from(map: BTreeMap<ExpertRole, f64>) -> Result<Self> {
        let mut raw = [0.0; ExpertRole::COUNT];
        for (role, w) in map {
            raw[role.index()] = w;
        }
        Self::from_weights(raw)
    }
}
