//! Source point collection: confidence normalization and filtering.

use serde::{Deserialize, Serialize};

use crate::config::SelectionFilter;
use crate::models::{SourceKind, SourcePoint};
use crate::spatial::is_valid_coordinate;

/// Categorical certainty used by manual annotation tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertaintyLabel {
    Certain,
    Likely,
    Uncertain,
}

impl CertaintyLabel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "certain" | "high" => Some(Self::Certain),
            "likely" | "medium" => Some(Self::Likely),
            "uncertain" | "low" => Some(Self::Uncertain),
            _ => None,
        }
    }

    fn score(self) -> f64 {
        match self {
            Self::Certain => 0.95,
            Self::Likely => 0.75,
            Self::Uncertain => 0.45,
        }
    }
}

/// Stored confidence representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Confidence {
    Numeric(f64),
    Categorical(CertaintyLabel),
}

impl Confidence {
    /// Map to [0, 1]. Values in (1, 100] are read as percentages.
    pub fn normalize(self) -> Option<f64> {
        match self {
            Self::Numeric(value) if value.is_nan() => None,
            Self::Numeric(value) if value > 1.0 && value <= 100.0 => Some(value / 100.0),
            Self::Numeric(value) => Some(value.clamp(0.0, 1.0)),
            Self::Categorical(label) => Some(label.score()),
        }
    }
}

/// A point as stored by the detection/annotation store, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSourceRecord {
    pub source_id: String,
    pub source_kind: SourceKind,
    pub species: String,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub verified: bool,
}

/// Normalize and filter raw store records into source points.
///
/// Drops records of an excluded kind, unverified records (unless allowed),
/// species outside the allow-list, invalid coordinates, and confidence below
/// the floor. Annotations without a stored confidence count as certain.
pub fn collect_source_points(records: &[RawSourceRecord], filter: &SelectionFilter) -> Vec<SourcePoint> {
    records
        .iter()
        .filter_map(|record| normalize_record(record, filter))
        .collect()
}

fn normalize_record(record: &RawSourceRecord, filter: &SelectionFilter) -> Option<SourcePoint> {
    let kind_included = match record.source_kind {
        SourceKind::Detection => filter.include_ai_detections,
        SourceKind::Annotation => filter.include_manual_annotations,
    };
    if !kind_included {
        return None;
    }
    if !record.verified && !filter.include_unverified {
        return None;
    }

    let species = record.species.trim();
    if species.is_empty() || !filter.allows_species(species) {
        return None;
    }

    let (lat, lon) = (record.lat?, record.lon?);
    if !is_valid_coordinate(lat, lon) {
        return None;
    }

    let confidence = match (record.confidence, record.source_kind) {
        (Some(value), _) => value.normalize()?,
        (None, SourceKind::Annotation) => CertaintyLabel::Certain.score(),
        (None, SourceKind::Detection) => return None,
    };
    if confidence < filter.min_confidence {
        return None;
    }

    Some(SourcePoint {
        source_id: record.source_id.clone(),
        source_kind: record.source_kind,
        species: species.to_string(),
        confidence,
        lat,
        lon,
    })
}
