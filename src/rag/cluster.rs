//! Deterministic k-means over retrieved listings
//!
//! Candidates are projected to `[price, beds, baths, area]`, each scaled to
//! [0, 1] with fixed bounds. Seeds are taken at evenly spaced positions of
//! the id-sorted candidate list, so identical inputs always produce identical
//! assignments. The cluster closest to the query's implied preferences yields
//! the "similar homes" hint list.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::config::ClusteringConfig;
use crate::types::{PropertyMetadata, RetrievalCandidate, RetrievalFilter};

pub const FEATURE_DIM: usize = 4;

pub type FeatureVector = [f64; FEATURE_DIM];

/// Fixed per-field normalization bounds: price, beds, baths, living area
const FEATURE_BOUNDS: [(f64, f64); FEATURE_DIM] = [
    (0.0, 2_000_000.0),
    (0.0, 8.0),
    (0.0, 6.0),
    (0.0, 6_000.0),
];

/// Value used for a missing field
const MISSING_FEATURE: f64 = 0.5;

/// Largest supported `k`
pub const MAX_CLUSTERS: usize = 6;

/// Distance slack within which a previously recommended cluster is kept
const STABILITY_MARGIN: f64 = 0.05;

fn normalize(value: Option<f64>, dim: usize) -> f64 {
    let (lo, hi) = FEATURE_BOUNDS[dim];
    match value {
        Some(v) if v.is_finite() => ((v - lo) / (hi - lo)).clamp(0.0, 1.0),
        _ => MISSING_FEATURE,
    }
}

fn denormalize(value: f64, dim: usize) -> f64 {
    let (lo, hi) = FEATURE_BOUNDS[dim];
    lo + value * (hi - lo)
}

pub fn feature_vector(meta: &PropertyMetadata) -> FeatureVector {
    [
        normalize(meta.price, 0),
        normalize(meta.bedrooms, 1),
        normalize(meta.bathrooms, 2),
        normalize(meta.living_area, 3),
    ]
}

/// Partially specified point; `None` dimensions are ignored in distances
pub type PreferencePoint = [Option<f64>; FEATURE_DIM];

/// Preferences implied by a filter, if it constrains any feature
pub fn preference_point(filter: &RetrievalFilter) -> Option<PreferencePoint> {
    let price = match (filter.price_min, filter.price_max) {
        (Some(lo), Some(hi)) => Some((lo + hi) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    };
    let point = [
        price.map(|p| normalize(Some(p), 0)),
        filter.beds_min.map(|b| normalize(Some(b), 1)),
        filter.baths_min.map(|b| normalize(Some(b), 2)),
        None,
    ];
    point.iter().any(Option::is_some).then_some(point)
}

pub fn euclidean(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn preference_distance(pref: &PreferencePoint, centroid: &FeatureVector) -> f64 {
    pref.iter()
        .zip(centroid.iter())
        .filter_map(|(p, c)| p.map(|p| (p - c).powi(2)))
        .sum::<f64>()
        .sqrt()
}

/// One cluster's centroid and its human-scale descriptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub label: usize,
    pub centroid: FeatureVector,
    pub size: usize,
}

impl ClusterCentroid {
    pub fn describe(&self) -> String {
        format!(
            "cluster {} ({} homes): ~${:.0}, {:.1} bd / {:.1} ba, ~{:.0} sqft",
            self.label,
            self.size,
            denormalize(self.centroid[0], 0),
            denormalize(self.centroid[1], 1),
            denormalize(self.centroid[2], 2),
            denormalize(self.centroid[3], 3),
        )
    }
}

/// Candidate id → cluster label plus centroids. Recomputed per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub labels: BTreeMap<String, usize>,
    pub centroids: Vec<ClusterCentroid>,
    pub iterations: usize,
    pub converged: bool,
}

impl ClusterAssignment {
    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }

    pub fn label_of(&self, id: &str) -> Option<usize> {
        self.labels.get(id).copied()
    }

    pub fn members(&self, label: usize) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|(_, l)| **l == label)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Clustering result with the chosen hint cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterAdvice {
    pub assignment: ClusterAssignment,
    pub hint_cluster: Option<usize>,
    /// Candidate ids nearest the hint cluster's centroid
    pub similar_homes: Vec<String>,
}

impl ClusterAdvice {
    /// Short prompt-ready description of the hint cluster
    pub fn hint_text(&self) -> Option<String> {
        let label = self.hint_cluster?;
        self.assignment
            .centroids
            .iter()
            .find(|c| c.label == label)
            .map(ClusterCentroid::describe)
    }
}

pub struct ClusterAdvisor {
    k: usize,
    max_iterations: usize,
    epsilon: f64,
    max_hints: usize,
}

impl ClusterAdvisor {
    pub fn new(config: &ClusteringConfig) -> Self {
        Self {
            k: config.k.clamp(1, MAX_CLUSTERS),
            max_iterations: config.max_iterations.max(1),
            epsilon: config.epsilon,
            max_hints: config.max_hints,
        }
    }

    /// Lloyd's k-means with id-ordered seeding
    pub fn cluster(&self, candidates: &[RetrievalCandidate]) -> ClusterAssignment {
        let n = candidates.len();
        if n < 2 {
            return trivial_assignment(candidates);
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|a, b| candidates[*a].id.cmp(&candidates[*b].id));
        let points: Vec<FeatureVector> = order
            .iter()
            .map(|i| feature_vector(&candidates[*i].metadata))
            .collect();

        let k = self.k.min(n);
        let mut centroids: Vec<FeatureVector> = (0..k).map(|i| points[i * n / k]).collect();
        let mut labels = vec![0usize; n];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;

            for (point, label) in points.iter().zip(labels.iter_mut()) {
                *label = nearest_centroid(point, &centroids);
            }

            let mut sums = vec![[0.0; FEATURE_DIM]; k];
            let mut counts = vec![0usize; k];
            for (point, label) in points.iter().zip(labels.iter()) {
                counts[*label] += 1;
                for (sum, value) in sums[*label].iter_mut().zip(point.iter()) {
                    *sum += value;
                }
            }

            let mut movement: f64 = 0.0;
            for (c, centroid) in centroids.iter_mut().enumerate() {
                // Empty clusters keep their previous centroid
                if counts[c] == 0 {
                    continue;
                }
                let mut next = sums[c];
                for value in next.iter_mut() {
                    *value /= counts[c] as f64;
                }
                movement = movement.max(euclidean(centroid, &next));
                *centroid = next;
            }

            if movement < self.epsilon {
                converged = true;
                break;
            }
        }

        // Final assignment against the settled centroids
        for (point, label) in points.iter().zip(labels.iter_mut()) {
            *label = nearest_centroid(point, &centroids);
        }

        let mut sizes = vec![0usize; k];
        for label in &labels {
            sizes[*label] += 1;
        }

        ClusterAssignment {
            labels: order
                .iter()
                .zip(labels.iter())
                .map(|(i, label)| (candidates[*i].id.clone(), *label))
                .collect(),
            centroids: centroids
                .into_iter()
                .enumerate()
                .map(|(label, centroid)| ClusterCentroid {
                    label,
                    centroid,
                    size: sizes[label],
                })
                .collect(),
            iterations,
            converged,
        }
    }

    /// Cluster and pick the hint cluster for this query
    pub fn advise(
        &self,
        candidates: &[RetrievalCandidate],
        filter: Option<&RetrievalFilter>,
        last_recommended: &[String],
    ) -> ClusterAdvice {
        let assignment = self.cluster(candidates);
        let preference = filter.and_then(preference_point);
        let hint_cluster = choose_cluster(&assignment, preference.as_ref(), last_recommended);

        let similar_homes = match hint_cluster {
            Some(label) => self.nearest_members(candidates, &assignment, label),
            None => Vec::new(),
        };

        ClusterAdvice {
            assignment,
            hint_cluster,
            similar_homes,
        }
    }

    /// Members of `label` ordered by distance to its centroid
    fn nearest_members(
        &self,
        candidates: &[RetrievalCandidate],
        assignment: &ClusterAssignment,
        label: usize,
    ) -> Vec<String> {
        let Some(centroid) = assignment.centroids.iter().find(|c| c.label == label) else {
            return Vec::new();
        };

        let mut members: Vec<(f64, &str)> = candidates
            .iter()
            .filter(|c| assignment.label_of(&c.id) == Some(label))
            .map(|c| (euclidean(&feature_vector(&c.metadata), &centroid.centroid), c.id.as_str()))
            .collect();
        members.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });
        members.dedup_by(|a, b| a.1 == b.1);

        members
            .into_iter()
            .take(self.max_hints)
            .map(|(_, id)| id.to_string())
            .collect()
    }
}

fn trivial_assignment(candidates: &[RetrievalCandidate]) -> ClusterAssignment {
    let centroid = candidates
        .first()
        .map(|c| feature_vector(&c.metadata))
        .unwrap_or([MISSING_FEATURE; FEATURE_DIM]);

    ClusterAssignment {
        labels: candidates.iter().map(|c| (c.id.clone(), 0)).collect(),
        centroids: vec![ClusterCentroid {
            label: 0,
            centroid,
            size: candidates.len(),
        }],
        iterations: 0,
        converged: true,
    }
}

/// Nearest centroid; ties go to the lowest label
fn nearest_centroid(point: &FeatureVector, centroids: &[FeatureVector]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (label, centroid) in centroids.iter().enumerate() {
        let distance = euclidean(point, centroid);
        if distance < best_distance {
            best = label;
            best_distance = distance;
        }
    }
    best
}

/// Pick the hint cluster among non-empty clusters.
///
/// With preferences: nearest centroid, ties to the larger cluster, but a
/// cluster holding a previously recommended home wins when it is within
/// `STABILITY_MARGIN` of the best distance. Without preferences: the largest
/// cluster, ties to one holding a previous recommendation.
fn choose_cluster(
    assignment: &ClusterAssignment,
    preference: Option<&PreferencePoint>,
    last_recommended: &[String],
) -> Option<usize> {
    let recommended: HashSet<usize> = last_recommended
        .iter()
        .filter_map(|id| assignment.label_of(id))
        .collect();
    let populated = assignment.centroids.iter().filter(|c| c.size > 0);

    match preference {
        Some(pref) => {
            let mut scored: Vec<(f64, &ClusterCentroid)> = populated
                .map(|c| (preference_distance(pref, &c.centroid), c))
                .collect();
            scored.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.1.size.cmp(&a.1.size))
                    .then_with(|| a.1.label.cmp(&b.1.label))
            });

            let (best_distance, best) = scored.first()?;
            let stable = scored.iter().find(|(distance, c)| {
                recommended.contains(&c.label) && *distance <= best_distance + STABILITY_MARGIN
            });
            Some(stable.map_or(best.label, |(_, c)| c.label))
        }
        None => populated
            .max_by(|a, b| {
                a.size
                    .cmp(&b.size)
                    .then_with(|| recommended.contains(&a.label).cmp(&recommended.contains(&b.label)))
                    .then_with(|| b.label.cmp(&a.label))
            })
            .map(|c| c.label),
    }
}
