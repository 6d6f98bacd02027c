//! Expert roles and the slices they produce

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of expert lenses.
///
/// Variant order is lexical by name so the derived `Ord` doubles as the
/// router's tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertRole {
    /// Similar-homes / market segment lens
    Cluster,
    /// Listing facts and market statistics
    Data,
    /// Affordability, mortgage and pricing
    Finance,
    /// Daily living, amenities and commute
    Lifestyle,
    /// Location, schools and safety
    Neighborhood,
}

impl ExpertRole {
    /// Every role, in lexical order
    pub const ALL: [ExpertRole; 5] = [
        ExpertRole::Cluster,
        ExpertRole::Data,
        ExpertRole::Finance,
        ExpertRole::Lifestyle,
        ExpertRole::Neighborhood,
    ];

    /// Number of experts in the closed set
    pub const COUNT: usize = 5;

    pub fn name(&self) -> &'static str {
        match self {
            ExpertRole::Cluster => "cluster",
            ExpertRole::Data => "data",
            ExpertRole::Finance => "finance",
            ExpertRole::Lifestyle => "lifestyle",
            ExpertRole::Neighborhood => "neighborhood",
        }
    }

    /// Dense index used by fixed-size weight arrays
    pub fn index(&self) -> usize {
        match self {
            ExpertRole::Cluster => 0,
            ExpertRole::Data => 1,
            ExpertRole::Finance => 2,
            ExpertRole::Lifestyle => 3,
            ExpertRole::Neighborhood => 4,
        }
    }
}

impl fmt::Display for ExpertRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExpertRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cluster" => Ok(ExpertRole::Cluster),
            "data" => Ok(ExpertRole::Data),
            "finance" => Ok(ExpertRole::Finance),
            "lifestyle" => Ok(ExpertRole::Lifestyle),
            "neighborhood" => Ok(ExpertRole::Neighborhood),
            other => Err(format!("Unknown expert role: {}", other)),
        }
    }
}

/// Why an expert produced no usable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unavailability {
    /// Individual expert timeout elapsed
    TimedOut { after_ms: u64 },
    /// Completion service returned an error
    Failed { reason: String },
    /// Global turn budget elapsed before the expert finished
    Abandoned,
    /// Expert answered with nothing usable
    Empty,
}

/// Output of one expert invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertSlice {
    pub role: ExpertRole,
    pub rationale: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<Unavailability>,
}

impl ExpertSlice {
    pub fn new(role: ExpertRole, rationale: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            rationale: rationale.into(),
            content: content.into(),
            unavailable: None,
        }
    }

    /// Placeholder slice for an expert that did not deliver
    pub fn unavailable(role: ExpertRole, reason: Unavailability) -> Self {
        Self {
            role,
            rationale: String::new(),
            content: String::new(),
            unavailable: Some(reason),
        }
    }

    /// Usable slices are available and carry non-blank content
    pub fn is_usable(&self) -> bool {
        self.unavailable.is_none() && !self.content.trim().is_empty()
    }
}
