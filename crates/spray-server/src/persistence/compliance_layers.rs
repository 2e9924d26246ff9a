//! Compliance layer persistence.

use anyhow::Result;
use spray_core::{ComplianceLayer, LayerGeometry, LayerKind};
use sqlx::SqlitePool;

pub async fn upsert_layer(pool: &SqlitePool, project_id: &str, layer: &ComplianceLayer, active: bool) -> Result<()> {
    let geometry_json = serde_json::to_string(&layer.geometry)?;
    sqlx::query(
        r#"
        INSERT INTO compliance_layers (layer_id, project_id, name, kind, buffer_meters, geometry, active)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(layer_id) DO UPDATE SET
            project_id = ?2, name = ?3, kind = ?4, buffer_meters = ?5, geometry = ?6, active = ?7
        "#,
    )
    .bind(&layer.id)
    .bind(project_id)
    .bind(&layer.name)
    .bind(layer.kind.as_str())
    .bind(layer.buffer_meters)
    .bind(&geometry_json)
    .bind(active)
    .execute(pool)
    .await?;

    Ok(())
}

/// Active layers for a project. Rows with an unknown kind or unreadable
/// geometry are skipped with a warning.
pub async fn load_active_layers(pool: &SqlitePool, project_id: &str) -> Result<Vec<ComplianceLayer>> {
    let rows = sqlx::query_as::<_, LayerRow>(
        "SELECT layer_id, name, kind, buffer_meters, geometry FROM compliance_layers WHERE project_id = ?1 AND active = 1 ORDER BY layer_id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(LayerRow::into_layer).collect())
}

#[derive(sqlx::FromRow)]
struct LayerRow {
    layer_id: String,
    name: String,
    kind: String,
    buffer_meters: f64,
    geometry: String,
}

impl LayerRow {
    fn into_layer(self) -> Option<ComplianceLayer> {
        let Some(kind) = LayerKind::parse(&self.kind) else {
            tracing::warn!(layer_id = %self.layer_id, kind = %self.kind, "Skipping layer with unknown kind");
            return None;
        };
        let geometry: LayerGeometry = match serde_json::from_str(&self.geometry) {
            Ok(geometry) => geometry,
            Err(err) => {
                tracing::warn!(layer_id = %self.layer_id, "Skipping layer with unreadable geometry: {}", err);
                return None;
            }
        };
        Some(ComplianceLayer {
            id: self.layer_id,
            name: self.name,
            kind,
            buffer_meters: if self.buffer_meters.is_finite() { self.buffer_meters.max(0.0) } else { 0.0 },
            geometry,
        })
    }
}
