//! Survey persistence: projects and their detection/annotation points.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spray_core::source::{CertaintyLabel, Confidence, RawSourceRecord};
use spray_core::SourceKind;
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Survey center as (lat, lon) when both halves are stored.
    pub fn center(&self) -> Option<(f64, f64)> {
        match (self.center_lat, self.center_lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

pub async fn upsert_project(pool: &SqlitePool, project: &Project) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO projects (project_id, name, center_lat, center_lon, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(project_id) DO UPDATE SET
            name = ?2, center_lat = ?3, center_lon = ?4
        "#,
    )
    .bind(&project.project_id)
    .bind(&project.name)
    .bind(project.center_lat)
    .bind(project.center_lon)
    .bind(project.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_project(pool: &SqlitePool, project_id: &str) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(
        "SELECT project_id, name, center_lat, center_lon, created_at FROM projects WHERE project_id = ?1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Project::from))
}

/// Insert or replace survey points for a project in one transaction.
pub async fn upsert_source_records(
    pool: &SqlitePool,
    project_id: &str,
    records: &[RawSourceRecord],
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;
    for record in records {
        let confidence = match &record.confidence {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        sqlx::query(
            r#"
            INSERT INTO detections (
                source_id, project_id, source_kind, species, confidence,
                lat, lon, verified, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(source_id) DO UPDATE SET
                project_id = ?2, source_kind = ?3, species = ?4, confidence = ?5,
                lat = ?6, lon = ?7, verified = ?8
            "#,
        )
        .bind(&record.source_id)
        .bind(project_id)
        .bind(record.source_kind.as_str())
        .bind(&record.species)
        .bind(&confidence)
        .bind(record.lat)
        .bind(record.lon)
        .bind(record.verified)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Load every stored point for a project, unfiltered.
pub async fn load_source_records(pool: &SqlitePool, project_id: &str) -> Result<Vec<RawSourceRecord>> {
    let rows = sqlx::query_as::<_, DetectionRow>(
        "SELECT source_id, source_kind, species, confidence, lat, lon, verified FROM detections WHERE project_id = ?1 ORDER BY source_id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(DetectionRow::into_record).collect())
}

/// Stored confidence is JSON (number or label); bare labels are accepted too.
fn parse_confidence(raw: &str) -> Option<Confidence> {
    serde_json::from_str::<Confidence>(raw)
        .ok()
        .or_else(|| CertaintyLabel::parse(raw).map(Confidence::Categorical))
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    project_id: String,
    name: String,
    center_lat: Option<f64>,
    center_lon: Option<f64>,
    created_at: String,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Project {
            project_id: row.project_id,
            name: row.name,
            center_lat: row.center_lat,
            center_lon: row.center_lon,
            created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DetectionRow {
    source_id: String,
    source_kind: String,
    species: String,
    confidence: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    verified: bool,
}

impl DetectionRow {
    fn into_record(self) -> Option<RawSourceRecord> {
        let Some(source_kind) = SourceKind::parse(&self.source_kind) else {
            tracing::warn!(source_id = %self.source_id, kind = %self.source_kind, "Skipping point with unknown source kind");
            return None;
        };
        Some(RawSourceRecord {
            source_id: self.source_id,
            source_kind,
            species: self.species,
            confidence: self.confidence.as_deref().and_then(parse_confidence),
            lat: self.lat,
            lon: self.lon,
            verified: self.verified,
        })
    }
}
