//! Market summary over a set of listings
//!
//! Rendered into the data and finance expert prompts, and printed by the
//! `insights` subcommand.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{PropertyMetadata, RetrievalCandidate};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySummary {
    pub city: String,
    pub count: usize,
    pub average_price: Option<f64>,
    pub average_living_area: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeTypeSummary {
    pub home_type: String,
    pub count: usize,
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedroomBand {
    /// "0".."4", "5+" or "Unknown"
    pub band: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuartiles {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl PriceQuartiles {
    /// Quartiles with linear interpolation between closest ranks
    pub fn from_prices(prices: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        Some(Self {
            min: percentile(&sorted, 0.0),
            q1: percentile(&sorted, 0.25),
            median: percentile(&sorted, 0.5),
            q3: percentile(&sorted, 0.75),
            max: percentile(&sorted, 1.0),
        })
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (position - lo as f64)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn label(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

fn bedroom_band(bedrooms: Option<f64>) -> String {
    match bedrooms.filter(|b| b.is_finite()) {
        Some(b) => {
            let rounded = b.round().max(0.0) as u32;
            if rounded >= 5 {
                "5+".to_string()
            } else {
                rounded.to_string()
            }
        }
        None => UNKNOWN.to_string(),
    }
}

/// Market-level aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketInsights {
    pub total_listings: usize,
    pub average_price: Option<f64>,
    pub average_living_area: Option<f64>,
    pub average_price_per_sqft: Option<f64>,
    pub price_quartiles: Option<PriceQuartiles>,
    /// Largest cities first
    pub cities: Vec<CitySummary>,
    pub home_types: Vec<HomeTypeSummary>,
    pub bedroom_bands: Vec<BedroomBand>,
}

impl MarketInsights {
    pub fn from_candidates(candidates: &[RetrievalCandidate]) -> Self {
        Self::from_listings(candidates.iter().map(|c| &c.metadata))
    }

    pub fn from_listings<'a>(listings: impl IntoIterator<Item = &'a PropertyMetadata>) -> Self {
        let listings: Vec<&PropertyMetadata> = listings.into_iter().collect();
        if listings.is_empty() {
            return Self::default();
        }

        let prices: Vec<f64> = listings.iter().filter_map(|m| m.price).collect();

        let mut by_city: BTreeMap<String, Vec<&PropertyMetadata>> = BTreeMap::new();
        let mut by_type: BTreeMap<String, Vec<&PropertyMetadata>> = BTreeMap::new();
        let mut bands: BTreeMap<String, usize> = BTreeMap::new();
        for meta in &listings {
            by_city.entry(label(&meta.city)).or_default().push(*meta);
            by_type.entry(label(&meta.home_type)).or_default().push(*meta);
            *bands.entry(bedroom_band(meta.bedrooms)).or_default() += 1;
        }

        let mut cities: Vec<CitySummary> = by_city
            .into_iter()
            .map(|(city, group)| CitySummary {
                city,
                count: group.len(),
                average_price: mean(group.iter().filter_map(|m| m.price)),
                average_living_area: mean(group.iter().filter_map(|m| m.living_area)),
            })
            .collect();
        cities.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.city.cmp(&b.city)));

        let mut home_types: Vec<HomeTypeSummary> = by_type
            .into_iter()
            .map(|(home_type, group)| HomeTypeSummary {
                home_type,
                count: group.len(),
                average_price: mean(group.iter().filter_map(|m| m.price)),
            })
            .collect();
        home_types.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.home_type.cmp(&b.home_type)));

        // "0".."4" < "5+" < "Unknown" already sorts correctly as strings
        let bedroom_bands = bands
            .into_iter()
            .map(|(band, count)| BedroomBand { band, count })
            .collect();

        Self {
            total_listings: listings.len(),
            average_price: mean(prices.iter().copied()),
            average_living_area: mean(listings.iter().filter_map(|m| m.living_area)),
            average_price_per_sqft: mean(listings.iter().filter_map(|m| m.price_per_sqft())),
            price_quartiles: PriceQuartiles::from_prices(&prices),
            cities,
            home_types,
            bedroom_bands,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_listings == 0
    }

    /// Compact multi-line text for prompts and terminal output
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "No listings to summarize.".to_string();
        }

        let mut lines = vec![format!("Listings: {}", self.total_listings)];
        if let Some(price) = self.average_price {
            lines.push(format!("Average price: ${:.0}", price));
        }
        if let Some(q) = &self.price_quartiles {
            lines.push(format!(
                "Price range: min ${:.0}, Q1 ${:.0}, median ${:.0}, Q3 ${:.0}, max ${:.0}",
                q.min, q.q1, q.median, q.q3, q.max
            ));
        }
        if let Some(pps) = self.average_price_per_sqft {
            lines.push(format!("Average price per sqft: ${:.0}", pps));
        }
        if let Some(area) = self.average_living_area {
            lines.push(format!("Average living area: {:.0} sqft", area));
        }

        let cities: Vec<String> = self
            .cities
            .iter()
            .take(5)
            .map(|c| match c.average_price {
                Some(p) => format!("{} ({}, avg ${:.0})", c.city, c.count, p),
                None => format!("{} ({})", c.city, c.count),
            })
            .collect();
        lines.push(format!("Cities: {}", cities.join("; ")));

        let types: Vec<String> = self
            .home_types
            .iter()
            .map(|t| format!("{} {}", t.home_type, t.count))
            .collect();
        lines.push(format!("Home types: {}", types.join(", ")));

        let bands: Vec<String> = self
            .bedroom_bands
            .iter()
            .map(|b| format!("{} bd: {}", b.band, b.count))
            .collect();
        lines.push(format!("Bedrooms: {}", bands.join(", ")));

        lines.join("\n")
    }
}
