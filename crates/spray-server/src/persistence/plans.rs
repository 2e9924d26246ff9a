//! Spray plan persistence: the plan state machine row plus its zone and
//! mission records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spray_core::{
    DoseSource, MissionDraft, MissionWeatherSchedule, Plan, PlanStatus, PlanSummary,
    SprayPlanConfig, ZoneDraft,
};
use sqlx::SqlitePool;

/// A mission with the weather window chosen for it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRecord {
    #[serde(flatten)]
    pub mission: MissionDraft,
    pub weather: Option<MissionWeatherSchedule>,
}

pub async fn insert_plan(pool: &SqlitePool, plan: &Plan) -> Result<()> {
    let config_json = serde_json::to_string(&plan.config)?;
    sqlx::query(
        r#"
        INSERT INTO spray_plans (
            plan_id, project_id, status, progress, config,
            summary, error_message, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, ?7)
        "#,
    )
    .bind(&plan.id)
    .bind(&plan.project_id)
    .bind(plan.status.as_str())
    .bind(i64::from(plan.progress))
    .bind(&config_json)
    .bind(plan.created_at.to_rfc3339())
    .bind(plan.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load the plan row. Zones and missions are loaded separately.
pub async fn load_plan(pool: &SqlitePool, plan_id: &str) -> Result<Option<Plan>> {
    let row = sqlx::query_as::<_, PlanRow>(
        "SELECT plan_id, project_id, status, progress, config, summary, error_message, created_at, updated_at FROM spray_plans WHERE plan_id = ?1",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => Ok(Some(r.try_into()?)),
        None => Ok(None),
    }
}

pub async fn plan_ids_with_status(pool: &SqlitePool, status: PlanStatus) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT plan_id FROM spray_plans WHERE status = ?1 ORDER BY created_at, plan_id")
            .bind(status.as_str())
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Atomically move a QUEUED plan to PROCESSING.
///
/// Returns false when the plan is missing or another worker already took it.
pub async fn claim(pool: &SqlitePool, plan_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE spray_plans SET status = 'PROCESSING', progress = 0, updated_at = ?2
        WHERE plan_id = ?1 AND status = 'QUEUED'
        "#,
    )
    .bind(plan_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record progress on a PROCESSING plan.
///
/// Returns false when the plan is missing or not processing.
pub async fn update_progress(pool: &SqlitePool, plan_id: &str, progress: u8) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE spray_plans SET progress = ?2, updated_at = ?3
        WHERE plan_id = ?1 AND status = 'PROCESSING'
        "#,
    )
    .bind(plan_id)
    .bind(i64::from(progress.min(100)))
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn mark_failed(pool: &SqlitePool, plan_id: &str, message: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE spray_plans SET status = 'FAILED', progress = 100, error_message = ?2, updated_at = ?3
        WHERE plan_id = ?1 AND status IN ('QUEUED', 'PROCESSING')
        "#,
    )
    .bind(plan_id)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Write zones, missions and summary and mark the plan READY, atomically.
pub async fn commit_ready(
    pool: &SqlitePool,
    plan_id: &str,
    zones: &[ZoneDraft],
    missions: &[MissionRecord],
    summary: &PlanSummary,
) -> Result<()> {
    let summary_json = serde_json::to_string(summary)?;
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM spray_plan_zones WHERE plan_id = ?1")
        .bind(plan_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM spray_plan_missions WHERE plan_id = ?1")
        .bind(plan_id)
        .execute(&mut *tx)
        .await?;

    for zone in zones {
        let mut rings = Vec::with_capacity(1 + zone.interior_rings.len());
        rings.push(&zone.polygon_ring);
        rings.extend(zone.interior_rings.iter());
        sqlx::query(
            r#"
            INSERT INTO spray_plan_zones (
                plan_id, sequence, species, member_point_ids, detection_count,
                average_confidence, centroid_lat, centroid_lon, polygon, area_hectares,
                dose_liters_per_ha, dose_source, recommended_liters, priority_score
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(plan_id)
        .bind(i64::from(zone.sequence))
        .bind(&zone.species)
        .bind(serde_json::to_string(&zone.member_point_ids)?)
        .bind(i64::from(zone.detection_count))
        .bind(zone.average_confidence)
        .bind(zone.centroid_lat)
        .bind(zone.centroid_lon)
        .bind(serde_json::to_string(&rings)?)
        .bind(zone.area_hectares)
        .bind(zone.dose_liters_per_ha)
        .bind(dose_source_str(zone.dose_source))
        .bind(zone.recommended_liters)
        .bind(zone.priority_score)
        .execute(&mut *tx)
        .await?;
    }

    for record in missions {
        let mission = &record.mission;
        let weather_json = match &record.weather {
            Some(weather) => Some(serde_json::to_string(weather)?),
            None => None,
        };
        sqlx::query(
            r#"
            INSERT INTO spray_plan_missions (
                plan_id, sequence, name, zone_indexes, total_area_ha, total_chemical_liters,
                route, baseline_distance_m, optimized_distance_m, estimated_duration_min,
                exceeds_capacity, refills_required, weather
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(plan_id)
        .bind(i64::from(mission.sequence))
        .bind(&mission.name)
        .bind(serde_json::to_string(&mission.ordered_zone_indexes)?)
        .bind(mission.total_area_ha)
        .bind(mission.total_chemical_liters)
        .bind(serde_json::to_string(&mission.route_coordinates)?)
        .bind(mission.baseline_distance_m)
        .bind(mission.optimized_distance_m)
        .bind(mission.estimated_duration_min)
        .bind(mission.exceeds_capacity)
        .bind(i64::from(mission.refills_required))
        .bind(&weather_json)
        .execute(&mut *tx)
        .await?;
    }

    let updated = sqlx::query(
        r#"
        UPDATE spray_plans SET status = 'READY', progress = 100, summary = ?2,
            error_message = NULL, updated_at = ?3
        WHERE plan_id = ?1 AND status = 'PROCESSING'
        "#,
    )
    .bind(plan_id)
    .bind(&summary_json)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        anyhow::bail!("plan {} is not processing; refusing to commit results", plan_id);
    }

    tx.commit().await?;
    Ok(())
}

pub async fn load_zones(pool: &SqlitePool, plan_id: &str) -> Result<Vec<ZoneDraft>> {
    let rows = sqlx::query_as::<_, ZoneRow>(
        r#"
        SELECT sequence, species, member_point_ids, detection_count, average_confidence,
            centroid_lat, centroid_lon, polygon, area_hectares, dose_liters_per_ha,
            dose_source, recommended_liters, priority_score
        FROM spray_plan_zones WHERE plan_id = ?1 ORDER BY sequence
        "#,
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

pub async fn load_missions(pool: &SqlitePool, plan_id: &str) -> Result<Vec<MissionRecord>> {
    let rows = sqlx::query_as::<_, MissionRow>(
        r#"
        SELECT sequence, name, zone_indexes, total_area_ha, total_chemical_liters, route,
            baseline_distance_m, optimized_distance_m, estimated_duration_min,
            exceeds_capacity, refills_required, weather
        FROM spray_plan_missions WHERE plan_id = ?1 ORDER BY sequence
        "#,
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

fn dose_source_str(source: DoseSource) -> &'static str {
    match source {
        DoseSource::ReferenceTable => "reference_table",
        DoseSource::FallbackDefault => "fallback_default",
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Internal row types for SQLx
#[derive(sqlx::FromRow)]
struct PlanRow {
    plan_id: String,
    project_id: String,
    status: String,
    progress: i64,
    config: String,
    summary: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PlanRow> for Plan {
    type Error = anyhow::Error;

    fn try_from(row: PlanRow) -> Result<Self> {
        let status = PlanStatus::parse(&row.status)
            .with_context(|| format!("unknown plan status '{}'", row.status))?;
        let config: SprayPlanConfig = serde_json::from_str(&row.config)?;
        let summary: Option<PlanSummary> = match row.summary {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };

        Ok(Plan {
            id: row.plan_id,
            project_id: row.project_id,
            status,
            progress: row.progress.clamp(0, 100) as u8,
            config,
            zones: Vec::new(),
            missions: Vec::new(),
            compliance_report: summary.as_ref().map(|s| s.compliance.clone()),
            weather_report: summary.as_ref().map(|s| s.weather.clone()),
            summary,
            error_message: row.error_message,
            created_at: parse_time(&row.created_at),
            updated_at: parse_time(&row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ZoneRow {
    sequence: i64,
    species: String,
    member_point_ids: String,
    detection_count: i64,
    average_confidence: f64,
    centroid_lat: f64,
    centroid_lon: f64,
    polygon: String,
    area_hectares: f64,
    dose_liters_per_ha: f64,
    dose_source: String,
    recommended_liters: f64,
    priority_score: f64,
}

impl TryFrom<ZoneRow> for ZoneDraft {
    type Error = anyhow::Error;

    fn try_from(row: ZoneRow) -> Result<Self> {
        let mut rings: Vec<Vec<[f64; 2]>> = serde_json::from_str(&row.polygon)?;
        if rings.is_empty() {
            anyhow::bail!("zone {} has no polygon ring", row.sequence);
        }
        let polygon_ring = rings.remove(0);
        let dose_source = match row.dose_source.as_str() {
            "reference_table" => DoseSource::ReferenceTable,
            _ => DoseSource::FallbackDefault,
        };

        Ok(ZoneDraft {
            sequence: u32::try_from(row.sequence)?,
            species: row.species,
            member_point_ids: serde_json::from_str(&row.member_point_ids)?,
            detection_count: u32::try_from(row.detection_count)?,
            average_confidence: row.average_confidence,
            centroid_lat: row.centroid_lat,
            centroid_lon: row.centroid_lon,
            polygon_ring,
            interior_rings: rings,
            area_hectares: row.area_hectares,
            dose_liters_per_ha: row.dose_liters_per_ha,
            dose_source,
            recommended_liters: row.recommended_liters,
            priority_score: row.priority_score,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MissionRow {
    sequence: i64,
    name: String,
    zone_indexes: String,
    total_area_ha: f64,
    total_chemical_liters: f64,
    route: String,
    baseline_distance_m: f64,
    optimized_distance_m: f64,
    estimated_duration_min: f64,
    exceeds_capacity: bool,
    refills_required: i64,
    weather: Option<String>,
}

impl TryFrom<MissionRow> for MissionRecord {
    type Error = anyhow::Error;

    fn try_from(row: MissionRow) -> Result<Self> {
        let weather = match row.weather {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        Ok(MissionRecord {
            mission: MissionDraft {
                sequence: u32::try_from(row.sequence)?,
                name: row.name,
                ordered_zone_indexes: serde_json::from_str(&row.zone_indexes)?,
                total_area_ha: row.total_area_ha,
                total_chemical_liters: row.total_chemical_liters,
                route_coordinates: serde_json::from_str(&row.route)?,
                baseline_distance_m: row.baseline_distance_m,
                optimized_distance_m: row.optimized_distance_m,
                estimated_duration_min: row.estimated_duration_min,
                exceeds_capacity: row.exceeds_capacity,
                refills_required: u32::try_from(row.refills_required)?,
            },
            weather,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use spray_core::{ComplianceReport, WeatherReport};
    use std::collections::BTreeMap;

    fn zone() -> ZoneDraft {
        ZoneDraft {
            sequence: 1,
            species: "Lantana".into(),
            member_point_ids: vec!["a".into(), "b".into()],
            detection_count: 2,
            average_confidence: 0.7,
            centroid_lat: -27.47,
            centroid_lon: 153.02,
            polygon_ring: vec![[153.02, -27.47], [153.021, -27.47], [153.021, -27.471], [153.02, -27.47]],
            interior_rings: Vec::new(),
            area_hectares: 0.4,
            dose_liters_per_ha: 2.0,
            dose_source: DoseSource::ReferenceTable,
            recommended_liters: 0.8,
            priority_score: 1.64,
        }
    }

    fn mission() -> MissionRecord {
        MissionRecord {
            mission: MissionDraft {
                sequence: 1,
                name: "Mission 1".into(),
                ordered_zone_indexes: vec![0],
                total_area_ha: 0.4,
                total_chemical_liters: 0.8,
                route_coordinates: vec![[153.02, -27.47], [153.0205, -27.4705], [153.02, -27.47]],
                baseline_distance_m: 140.0,
                optimized_distance_m: 140.0,
                estimated_duration_min: 2.3,
                exceeds_capacity: false,
                refills_required: 0,
            },
            weather: None,
        }
    }

    fn summary() -> PlanSummary {
        PlanSummary {
            totals: Default::default(),
            route_optimization: Default::default(),
            compliance: ComplianceReport::default(),
            weather: WeatherReport::disabled(),
            species: BTreeMap::new(),
            capacity_warnings: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn commit_requires_processing_and_writes_everything() {
        let db = init_database(":memory:", 1).await.unwrap();
        let plan = Plan::queued("plan-1".into(), "farm-1".into(), SprayPlanConfig::default());
        insert_plan(db.pool(), &plan).await.unwrap();

        // Still QUEUED: the commit must be rejected and leave nothing behind
        let err = commit_ready(db.pool(), "plan-1", &[zone()], &[mission()], &summary()).await;
        assert!(err.is_err());
        assert!(load_zones(db.pool(), "plan-1").await.unwrap().is_empty());

        assert!(!update_progress(db.pool(), "plan-1", 25).await.unwrap());
        assert!(claim(db.pool(), "plan-1").await.unwrap());
        assert!(update_progress(db.pool(), "plan-1", 25).await.unwrap());
        commit_ready(db.pool(), "plan-1", &[zone()], &[mission()], &summary()).await.unwrap();

        let stored = load_plan(db.pool(), "plan-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PlanStatus::Ready);
        assert_eq!(stored.progress, 100);
        assert!(stored.summary.is_some());
        assert_eq!(stored.config, SprayPlanConfig::default());
        assert_eq!(load_zones(db.pool(), "plan-1").await.unwrap(), vec![zone()]);
        assert_eq!(load_missions(db.pool(), "plan-1").await.unwrap(), vec![mission()]);

        // Terminal plans never move again
        assert!(!update_progress(db.pool(), "plan-1", 10).await.unwrap());
        assert!(!claim(db.pool(), "plan-1").await.unwrap());
    }

    #[tokio::test]
    async fn only_one_claim_wins() {
        let db = init_database(":memory:", 1).await.unwrap();
        let plan = Plan::queued("plan-3".into(), "farm-1".into(), SprayPlanConfig::default());
        insert_plan(db.pool(), &plan).await.unwrap();

        assert!(claim(db.pool(), "plan-3").await.unwrap());
        assert!(!claim(db.pool(), "plan-3").await.unwrap());
        assert!(!claim(db.pool(), "missing").await.unwrap());

        let stored = load_plan(db.pool(), "plan-3").await.unwrap().unwrap();
        assert_eq!(stored.status, PlanStatus::Processing);
    }

    #[tokio::test]
    async fn failed_plans_keep_their_message() {
        let db = init_database(":memory:", 1).await.unwrap();
        let plan = Plan::queued("plan-2".into(), "farm-1".into(), SprayPlanConfig::default());
        insert_plan(db.pool(), &plan).await.unwrap();
        assert_eq!(
            plan_ids_with_status(db.pool(), PlanStatus::Queued).await.unwrap(),
            vec!["plan-2".to_string()]
        );

        mark_failed(db.pool(), "plan-2", "no source points").await.unwrap();
        let stored = load_plan(db.pool(), "plan-2").await.unwrap().unwrap();
        assert_eq!(stored.status, PlanStatus::Failed);
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.error_message.as_deref(), Some("no source points"));
        assert!(plan_ids_with_status(db.pool(), PlanStatus::Queued).await.unwrap().is_empty());
    }
}
