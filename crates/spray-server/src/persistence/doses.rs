//! Chemical dose reference table.

use anyhow::Result;
use spray_core::DoseReference;
use sqlx::SqlitePool;

pub async fn upsert_dose(pool: &SqlitePool, species: &str, liters_per_ha: f64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dose_reference (species, liters_per_ha)
        VALUES (?1, ?2)
        ON CONFLICT(species) DO UPDATE SET liters_per_ha = ?2
        "#,
    )
    .bind(species.trim().to_lowercase())
    .bind(liters_per_ha)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_dose_reference(pool: &SqlitePool) -> Result<DoseReference> {
    let rows: Vec<(String, f64)> = sqlx::query_as("SELECT species, liters_per_ha FROM dose_reference")
        .fetch_all(pool)
        .await?;

    Ok(DoseReference::from_entries(rows))
}
