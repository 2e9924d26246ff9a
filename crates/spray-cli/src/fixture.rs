//! Survey fixtures for offline planning.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use spray_core::source::RawSourceRecord;
use spray_core::{
    run_plan, ComplianceLayer, DoseReference, ForecastInput, GeoPlanarOps, PlanError, PlanInputs, PlanOutcome,
    SprayPlanConfig, SprayPlanRequest, WeatherForecastSnapshot,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Survey center in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// Everything one offline plan run needs, in one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyFixture {
    pub project_center: Option<Center>,
    pub records: Vec<RawSourceRecord>,
    /// Species → liters per hectare
    pub doses: BTreeMap<String, f64>,
    pub layers: Vec<ComplianceLayer>,
    pub request: SprayPlanRequest,
}

pub fn load_survey(path: &Path) -> Result<SurveyFixture> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing survey fixture {}", path.display()))
}

pub fn load_forecast(path: &Path) -> Result<WeatherForecastSnapshot> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing forecast {}", path.display()))
}

/// Run the engine over a fixture. Without a forecast the plan is built
/// without weather optimization.
pub fn plan_survey(
    fixture: &SurveyFixture,
    forecast: Option<WeatherForecastSnapshot>,
    now: DateTime<Utc>,
) -> Result<PlanOutcome, PlanError> {
    let config = SprayPlanConfig::from_request(&fixture.request);
    let doses = DoseReference::from_entries(fixture.doses.iter().map(|(species, dose)| (species, *dose)));
    let forecast = match forecast {
        Some(snapshot) => ForecastInput::Snapshot(snapshot),
        None => ForecastInput::Unavailable("No forecast supplied to offline planner".to_string()),
    };

    run_plan(
        PlanInputs {
            records: &fixture.records,
            doses: &doses,
            layers: &fixture.layers,
            project_center: fixture.project_center.map(|c| (c.lat, c.lon)),
        },
        &config,
        &GeoPlanarOps,
        &forecast,
        now,
    )
}

/// Zones as polygons and missions as line strings in one feature collection.
pub fn routes_document(outcome: &PlanOutcome) -> Value {
    let zones = outcome.zones.iter().map(|zone| {
        let mut rings = vec![zone.polygon_ring.clone()];
        rings.extend(zone.interior_rings.iter().cloned());
        json!({
            "type": "Feature",
            "geometry": { "type": "Polygon", "coordinates": rings },
            "properties": {
                "kind": "zone",
                "sequence": zone.sequence,
                "species": zone.species,
                "area_hectares": zone.area_hectares,
                "recommended_liters": zone.recommended_liters,
            }
        })
    });
    let missions = outcome.missions.iter().map(|mission| {
        json!({
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": mission.route_coordinates },
            "properties": {
                "kind": "mission",
                "sequence": mission.sequence,
                "name": mission.name,
                "zones": mission.ordered_zone_indexes,
                "optimized_distance_m": mission.optimized_distance_m,
                "estimated_duration_min": mission.estimated_duration_min,
                "exceeds_capacity": mission.exceeds_capacity,
            }
        })
    });

    json!({
        "type": "FeatureCollection",
        "features": zones.chain(missions).collect::<Vec<_>>(),
    })
}
