//! Listing records returned by similarity search

use serde::{Deserialize, Serialize};

/// Structured listing metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMetadata {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub bedrooms: Option<f64>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub living_area: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub home_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub description: String,
}

impl PropertyMetadata {
    /// Human readable location, e.g. "Austin, TX 78701"
    pub fn location(&self) -> String {
        let mut parts = Vec::new();
        if let Some(city) = &self.city {
            parts.push(city.clone());
        }
        let mut tail = String::new();
        if let Some(state) = &self.state {
            tail.push_str(state);
        }
        if let Some(zip) = &self.zipcode {
            if !tail.is_empty() {
                tail.push(' ');
            }
            tail.push_str(zip);
        }
        if !tail.is_empty() {
            parts.push(tail);
        }
        parts.join(", ")
    }

    pub fn price_per_sqft(&self) -> Option<f64> {
        match (self.price, self.living_area) {
            (Some(price), Some(area)) if area > 0.0 => Some(price / area),
            _ => None,
        }
    }
}

/// One scored search hit. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub id: String,
    /// Cosine similarity in [0, 1]
    pub score: f64,
    #[serde(default)]
    pub metadata: PropertyMetadata,
}

impl RetrievalCandidate {
    pub fn new(id: impl Into<String>, score: f64, metadata: PropertyMetadata) -> Self {
        Self {
            id: id.into(),
            score: score.clamp(0.0, 1.0),
            metadata,
        }
    }

    /// One-line summary used in prompts and hint lists
    pub fn summary(&self) -> String {
        let m = &self.metadata;
        let mut parts = vec![self.id.clone()];
        if let Some(price) = m.price {
            parts.push(format!("${:.0}", price));
        }
        match (m.bedrooms, m.bathrooms) {
            (Some(beds), Some(baths)) => parts.push(format!("{} bd / {} ba", beds, baths)),
            (Some(beds), None) => parts.push(format!("{} bd", beds)),
            (None, Some(baths)) => parts.push(format!("{} ba", baths)),
            (None, None) => {}
        }
        if let Some(area) = m.living_area {
            parts.push(format!("{:.0} sqft", area));
        }
        let location = m.location();
        if !location.is_empty() {
            parts.push(location);
        }
        parts.join(" | ")
    }
}

/// Latitude/longitude rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Structured constraints for similarity search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baths_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zip_allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

impl RetrievalFilter {
    pub fn is_empty(&self) -> bool {
        self.price_min.is_none()
            && self.price_max.is_none()
            && self.beds_min.is_none()
            && self.baths_min.is_none()
            && self.zip_allow.is_empty()
            && self.bounds.is_none()
    }

    /// Number of independent constraints the filter carries
    pub fn constraint_count(&self) -> usize {
        let price = usize::from(self.price_min.is_some() || self.price_max.is_some());
        price
            + usize::from(self.beds_min.is_some())
            + usize::from(self.baths_min.is_some())
            + usize::from(!self.zip_allow.is_empty())
            + usize::from(self.bounds.is_some())
    }

    /// Number of constraints the listing satisfies exactly
    pub fn matched_constraints(&self, meta: &PropertyMetadata) -> usize {
        let mut matched = 0;

        if self.price_min.is_some() || self.price_max.is_some() {
            if let Some(price) = meta.price {
                let above = self.price_min.map_or(true, |min| price >= min);
                let below = self.price_max.map_or(true, |max| price <= max);
                if above && below {
                    matched += 1;
                }
            }
        }
        if let (Some(min), Some(beds)) = (self.beds_min, meta.bedrooms) {
            if beds >= min {
                matched += 1;
            }
        }
        if let (Some(min), Some(baths)) = (self.baths_min, meta.bathrooms) {
            if baths >= min {
                matched += 1;
            }
        }
        if !self.zip_allow.is_empty() {
            if let Some(zip) = &meta.zipcode {
                if self.zip_allow.iter().any(|z| z == zip) {
                    matched += 1;
                }
            }
        }
        if let (Some(bounds), Some(lat), Some(lon)) = (self.bounds, meta.latitude, meta.longitude) {
            if bounds.contains(lat, lon) {
                matched += 1;
            }
        }

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price: f64, beds: f64) -> PropertyMetadata {
        PropertyMetadata {
            price: Some(price),
            bedrooms: Some(beds),
            zipcode: Some("78701".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_matching() {
        let filter = RetrievalFilter {
            price_min: Some(300_000.0),
            price_max: Some(500_000.0),
            beds_min: Some(3.0),
            ..Default::default()
        };
        assert_eq!(filter.constraint_count(), 2);
        assert_eq!(filter.matched_constraints(&listing(400_000.0, 3.0)), 2);
        assert_eq!(filter.matched_constraints(&listing(400_000.0, 2.0)), 1);
        assert_eq!(filter.matched_constraints(&listing(650_000.0, 2.0)), 0);
    }

    #[test]
    fn test_missing_fields_never_match() {
        let filter = RetrievalFilter {
            beds_min: Some(2.0),
            zip_allow: vec!["78701".to_string()],
            ..Default::default()
        };
        assert_eq!(filter.matched_constraints(&PropertyMetadata::default()), 0);
    }

    #[test]
    fn test_summary_and_location() {
        let meta = PropertyMetadata {
            price: Some(425_000.0),
            bedrooms: Some(3.0),
            bathrooms: Some(2.0),
            living_area: Some(1800.0),
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            zipcode: Some("78704".to_string()),
            ..Default::default()
        };
        let candidate = RetrievalCandidate::new("zp-1", 0.9, meta);
        let summary = candidate.summary();
        assert!(summary.contains("$425000"));
        assert!(summary.contains("Austin, TX 78704"));
    }

    #[test]
    fn test_candidate_score_clamped() {
        let c = RetrievalCandidate::new("x", 1.7, PropertyMetadata::default());
        assert_eq!(c.score, 1.0);
    }
}
