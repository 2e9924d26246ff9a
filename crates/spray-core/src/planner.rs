//! Planning pipeline stages and the synchronous end-to-end run.
//!
//! The server orchestrator calls the stages one by one so it can report
//! progress and fetch the forecast between them; offline tools use
//! [`run_plan`] with everything already in memory.

use chrono::{DateTime, Utc};

use crate::clustering::{cluster_zones, ClusterOutcome, DoseReference};
use crate::compliance::{clip_zones, ClipOutcome};
use crate::config::SprayPlanConfig;
use crate::error::PlanError;
use crate::geometry::PlanarOps;
use crate::models::{ComplianceLayer, MissionDraft, SourcePoint, WeatherForecastSnapshot, ZoneDraft};
use crate::packing::pack_missions;
use crate::route_optimizer::{build_missions, resolve_start};
use crate::source::{collect_source_points, RawSourceRecord};
use crate::summary::{build_summary, PlanSummary, SummaryInputs};
use crate::weather::{optimize_launch_window, WeatherReport};

/// Forecast available to a run.
#[derive(Debug, Clone)]
pub enum ForecastInput {
    Snapshot(WeatherForecastSnapshot),
    /// Fetch failed or no provider; the note explains why
    Unavailable(String),
}

pub struct PlanInputs<'a> {
    pub records: &'a [RawSourceRecord],
    pub doses: &'a DoseReference,
    pub layers: &'a [ComplianceLayer],
    pub project_center: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub points: Vec<SourcePoint>,
    pub zones: Vec<ZoneDraft>,
    pub missions: Vec<MissionDraft>,
    pub summary: PlanSummary,
}

pub fn collect_stage(records: &[RawSourceRecord], config: &SprayPlanConfig) -> Result<Vec<SourcePoint>, PlanError> {
    let points = collect_source_points(records, &config.selection);
    if points.is_empty() {
        return Err(PlanError::NoSourcePoints);
    }
    Ok(points)
}

pub fn cluster_stage(
    points: &[SourcePoint],
    config: &SprayPlanConfig,
    doses: &DoseReference,
) -> Result<ClusterOutcome, PlanError> {
    let outcome = cluster_zones(points, config, doses);
    if outcome.zones.is_empty() {
        return Err(PlanError::NoZonesAfterClustering {
            min_detections: config.min_detections_per_zone,
        });
    }
    Ok(outcome)
}

pub fn compliance_stage<O: PlanarOps>(
    zones: Vec<ZoneDraft>,
    layers: &[ComplianceLayer],
    config: &SprayPlanConfig,
    ops: &O,
) -> Result<ClipOutcome, PlanError> {
    let outcome = clip_zones(zones, layers, config.compliance_enabled, ops);
    if outcome.zones.is_empty() {
        return Err(PlanError::NoZonesAfterCompliance);
    }
    Ok(outcome)
}

/// Pack and route missions. Returns the launch point used, as (lat, lon).
pub fn mission_stage(
    zones: &[ZoneDraft],
    config: &SprayPlanConfig,
    project_center: Option<(f64, f64)>,
) -> (Option<(f64, f64)>, Vec<MissionDraft>) {
    let Some(start) = resolve_start(config, project_center, zones) else {
        return (None, Vec::new());
    };
    let packs = pack_missions(zones, config);
    (Some(start), build_missions(&packs, zones, start, config))
}

pub fn weather_stage(
    missions: &[MissionDraft],
    config: &SprayPlanConfig,
    forecast: &ForecastInput,
    now: DateTime<Utc>,
) -> WeatherReport {
    if !config.weather.enabled {
        return WeatherReport::disabled();
    }
    match forecast {
        ForecastInput::Snapshot(snapshot) => optimize_launch_window(missions, snapshot, &config.weather, now),
        ForecastInput::Unavailable(note) => WeatherReport::unavailable(note.clone()),
    }
}

/// Run every stage in order with in-memory inputs.
pub fn run_plan<O: PlanarOps>(
    inputs: PlanInputs<'_>,
    config: &SprayPlanConfig,
    ops: &O,
    forecast: &ForecastInput,
    now: DateTime<Utc>,
) -> Result<PlanOutcome, PlanError> {
    let points = collect_stage(inputs.records, config)?;
    let clustered = cluster_stage(&points, config, inputs.doses)?;
    let clipped = compliance_stage(clustered.zones, inputs.layers, config, ops)?;
    let (_, missions) = mission_stage(&clipped.zones, config, inputs.project_center);
    let weather = weather_stage(&missions, config, forecast, now);

    let summary = build_summary(
        SummaryInputs {
            points: &points,
            zones: &clipped.zones,
            missions: &missions,
            skipped_clusters: clustered.skipped_clusters,
            compliance: &clipped.report,
            weather: &weather,
        },
        now,
    );

    Ok(PlanOutcome {
        points,
        zones: clipped.zones,
        missions,
        summary,
    })
}
