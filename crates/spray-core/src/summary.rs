//! Plan summary: totals, route savings, reports and per-species breakdown.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compliance::ComplianceReport;
use crate::models::{MissionDraft, SourcePoint, ZoneDraft};
use crate::weather::WeatherReport;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub source_points: usize,
    pub zones: usize,
    pub missions: usize,
    pub area_ha: f64,
    pub chemical_liters: f64,
    pub distance_m: f64,
    pub duration_min: f64,
    pub skipped_clusters: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSavings {
    pub baseline_m: f64,
    pub optimized_m: f64,
    pub saved_m: f64,
    pub saved_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesBreakdown {
    pub source_points: usize,
    pub zones: usize,
    pub zone_detections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub totals: SummaryTotals,
    pub route_optimization: RouteSavings,
    pub compliance: ComplianceReport,
    pub weather: WeatherReport,
    /// Keyed by species display name
    pub species: BTreeMap<String, SpeciesBreakdown>,
    #[serde(default)]
    pub capacity_warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Everything the summary is computed from.
pub struct SummaryInputs<'a> {
    pub points: &'a [SourcePoint],
    pub zones: &'a [ZoneDraft],
    pub missions: &'a [MissionDraft],
    pub skipped_clusters: usize,
    pub compliance: &'a ComplianceReport,
    pub weather: &'a WeatherReport,
}

fn species_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn build_summary(inputs: SummaryInputs<'_>, generated_at: DateTime<Utc>) -> PlanSummary {
    let baseline_m: f64 = inputs.missions.iter().map(|m| m.baseline_distance_m).sum();
    let optimized_m: f64 = inputs.missions.iter().map(|m| m.optimized_distance_m).sum();
    let saved_m = (baseline_m - optimized_m).max(0.0);
    let saved_pct = if baseline_m > 0.0 {
        saved_m / baseline_m * 100.0
    } else {
        0.0
    };

    // Case-insensitive grouping, shown under the smallest spelling
    let mut display: BTreeMap<String, String> = BTreeMap::new();
    let mut breakdown: BTreeMap<String, SpeciesBreakdown> = BTreeMap::new();
    let names = inputs
        .points
        .iter()
        .map(|p| p.species.as_str())
        .chain(inputs.zones.iter().map(|z| z.species.as_str()));
    for name in names {
        let key = species_key(name);
        let entry = display.entry(key).or_insert_with(|| name.trim().to_string());
        if name.trim() < entry.as_str() {
            *entry = name.trim().to_string();
        }
    }
    for point in inputs.points {
        breakdown.entry(species_key(&point.species)).or_default().source_points += 1;
    }
    for zone in inputs.zones {
        let entry = breakdown.entry(species_key(&zone.species)).or_default();
        entry.zones += 1;
        entry.zone_detections += zone.detection_count;
    }
    let species = breakdown
        .into_iter()
        .map(|(key, value)| (display.get(&key).cloned().unwrap_or(key), value))
        .collect();

    let capacity_warnings = inputs
        .missions
        .iter()
        .filter(|m| m.exceeds_capacity)
        .map(|m| {
            format!(
                "{} exceeds a single-mission limit ({:.2} ha, {:.1} L); {} refill(s) required",
                m.name, m.total_area_ha, m.total_chemical_liters, m.refills_required
            )
        })
        .collect();

    PlanSummary {
        totals: SummaryTotals {
            source_points: inputs.points.len(),
            zones: inputs.zones.len(),
            missions: inputs.missions.len(),
            area_ha: inputs.zones.iter().map(|z| z.area_hectares).sum(),
            chemical_liters: inputs.zones.iter().map(|z| z.recommended_liters).sum(),
            distance_m: optimized_m,
            duration_min: inputs.missions.iter().map(|m| m.estimated_duration_min).sum(),
            skipped_clusters: inputs.skipped_clusters,
        },
        route_optimization: RouteSavings {
            baseline_m,
            optimized_m,
            saved_m,
            saved_pct,
        },
        compliance: inputs.compliance.clone(),
        weather: inputs.weather.clone(),
        species,
        capacity_warnings,
        generated_at,
    }
}
