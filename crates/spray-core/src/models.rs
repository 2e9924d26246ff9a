//! Core data models for the spray planning engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compliance::ComplianceReport;
use crate::config::SprayPlanConfig;
use crate::summary::PlanSummary;
use crate::weather::WeatherReport;

// ========== SOURCE POINTS ==========

/// Where a geolocated point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Model output from the detection pipeline
    Detection,
    /// Manually placed annotation
    Annotation,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Annotation => "annotation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "detection" => Some(Self::Detection),
            "annotation" => Some(Self::Annotation),
            _ => None,
        }
    }
}

/// A normalized, filtered weed observation. Immutable once collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePoint {
    pub source_id: String,
    pub source_kind: SourceKind,
    pub species: String,
    /// Normalized to [0, 1]
    pub confidence: f64,
    pub lat: f64,
    pub lon: f64,
}

// ========== ZONES ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseSource {
    /// Species found in the chemical dosage reference table
    ReferenceTable,
    /// Species missing from the table, plan default used
    FallbackDefault,
}

/// A contiguous treatment area holding one species' clustered detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDraft {
    pub sequence: u32,
    pub species: String,
    pub member_point_ids: Vec<String>,
    pub detection_count: u32,
    pub average_confidence: f64,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    /// Closed [lon, lat] exterior ring (first == last, at least 4 vertices)
    pub polygon_ring: Vec<[f64; 2]>,
    /// Closed [lon, lat] holes left by exclusion areas inside the zone
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interior_rings: Vec<Vec<[f64; 2]>>,
    pub area_hectares: f64,
    pub dose_liters_per_ha: f64,
    pub dose_source: DoseSource,
    pub recommended_liters: f64,
    pub priority_score: f64,
}

/// `detectionCount × (0.4 + 0.6 × averageConfidence)`
pub fn priority_score(detection_count: u32, average_confidence: f64) -> f64 {
    detection_count as f64 * (0.4 + 0.6 * average_confidence)
}

/// Sort zones by descending priority and assign 1-based sequence numbers.
///
/// Ties fall back to species and then the first member id so the order is
/// stable for identical inputs.
pub fn resequence_by_priority(zones: &mut [ZoneDraft]) {
    zones.sort_by(|a, b| {
        b.priority_score
            .total_cmp(&a.priority_score)
            .then_with(|| a.species.cmp(&b.species))
            .then_with(|| a.member_point_ids.first().cmp(&b.member_point_ids.first()))
            .then_with(|| a.centroid_lat.total_cmp(&b.centroid_lat))
            .then_with(|| a.centroid_lon.total_cmp(&b.centroid_lon))
    });
    for (idx, zone) in zones.iter_mut().enumerate() {
        zone.sequence = idx as u32 + 1;
    }
}

// ========== COMPLIANCE LAYERS ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Spraying permitted only inside these areas
    Allowed,
    /// Spraying forbidden inside these areas (plus buffer)
    Exclusion,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Exclusion => "exclusion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allowed" => Some(Self::Allowed),
            "exclusion" => Some(Self::Exclusion),
            _ => None,
        }
    }
}

/// GeoJSON-style polygon geometry in degrees ([lon, lat] positions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum LayerGeometry {
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

impl LayerGeometry {
    /// Iterate polygons as lists of rings (exterior first).
    pub fn polygons(&self) -> Vec<&[Vec<[f64; 2]>]> {
        match self {
            Self::Polygon(rings) => vec![rings.as_slice()],
            Self::MultiPolygon(polys) => polys.iter().map(|rings| rings.as_slice()).collect(),
        }
    }
}

/// A legally or physically defined spraying boundary. Read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceLayer {
    pub id: String,
    pub name: String,
    pub kind: LayerKind,
    #[serde(default)]
    pub buffer_meters: f64,
    pub geometry: LayerGeometry,
}

// ========== MISSIONS ==========

/// One drone sortie covering a subset of zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDraft {
    pub sequence: u32,
    pub name: String,
    /// Indexes into the plan's zone list, in visit order
    pub ordered_zone_indexes: Vec<usize>,
    pub total_area_ha: f64,
    pub total_chemical_liters: f64,
    /// [lon, lat] line string including start and optional return
    pub route_coordinates: Vec<[f64; 2]>,
    pub baseline_distance_m: f64,
    pub optimized_distance_m: f64,
    pub estimated_duration_min: f64,
    /// Set when a single zone alone exceeds a mission limit
    #[serde(default)]
    pub exceeds_capacity: bool,
    #[serde(default)]
    pub refills_required: u32,
}

// ========== WEATHER ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub wind_speed_mps: f64,
    pub wind_gust_mps: f64,
    /// 0..=100
    pub precipitation_probability: f64,
    pub temperature_c: f64,
}

/// Hourly forecast fetched once per plan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecastSnapshot {
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub points: Vec<ForecastPoint>,
}

/// Flight decision, ordered from safest to worst.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherDecision {
    #[default]
    Go,
    Caution,
    NoGo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0.7 × max + 0.3 × avg of the point scores in the window
    pub risk_score: f64,
    pub decision: WeatherDecision,
    pub max_point_score: f64,
    pub avg_point_score: f64,
    pub sample_count: usize,
    pub max_wind_mps: f64,
    pub max_gust_mps: f64,
    pub max_precipitation_probability: f64,
    pub min_temperature_c: f64,
    pub max_temperature_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionWeatherSchedule {
    pub mission_sequence: u32,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub risk: RiskAssessment,
}

// ========== PLAN ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    /// Created, waiting for a worker
    Queued,
    /// A worker owns the run
    Processing,
    /// Zones, missions and summary committed
    Ready,
    /// Terminal failure, see error message
    Failed,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "QUEUED" => Some(Self::Queued),
            "PROCESSING" => Some(Self::Processing),
            "READY" => Some(Self::Ready),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// Top-level aggregate for one planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub project_id: String,
    pub status: PlanStatus,
    pub progress: u8,
    pub config: SprayPlanConfig,
    #[serde(default)]
    pub zones: Vec<ZoneDraft>,
    #[serde(default)]
    pub missions: Vec<MissionDraft>,
    #[serde(default)]
    pub compliance_report: Option<ComplianceReport>,
    #[serde(default)]
    pub weather_report: Option<WeatherReport>,
    #[serde(default)]
    pub summary: Option<PlanSummary>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// A fresh plan in the QUEUED state.
    pub fn queued(id: String, project_id: String, config: SprayPlanConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            status: PlanStatus::Queued,
            progress: 0,
            config,
            zones: Vec::new(),
            missions: Vec::new(),
            compliance_report: None,
            weather_report: None,
            summary: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
