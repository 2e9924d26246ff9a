//! Replaceable collaborator interfaces consumed by the plan orchestrator.
//!
//! The SQLite implementations back the running server; the in-memory ones
//! back tests and offline tooling.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use spray_core::source::RawSourceRecord;
use spray_core::{ComplianceLayer, DoseReference, Plan, PlanStatus, PlanSummary, WeatherForecastSnapshot, ZoneDraft};

use crate::forecast::ForecastError;
use crate::persistence::{MissionRecord, Project};

pub use memory::{FixedForecast, MemoryStore};
pub use sqlite::SqliteStore;

/// Detection/annotation store.
#[async_trait]
pub trait SurveyStore: Send + Sync {
    async fn project(&self, project_id: &str) -> Result<Option<Project>>;
    /// Every stored point for the project, before filtering.
    async fn source_records(&self, project_id: &str) -> Result<Vec<RawSourceRecord>>;
}

/// Species → liters per hectare.
#[async_trait]
pub trait DoseTable: Send + Sync {
    async fn dose_reference(&self) -> Result<DoseReference>;
}

#[async_trait]
pub trait ComplianceLayerStore: Send + Sync {
    async fn active_layers(&self, project_id: &str) -> Result<Vec<ComplianceLayer>>;
}

/// Hourly forecast source.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn hourly_forecast(
        &self,
        lat: f64,
        lon: f64,
        hours: u32,
    ) -> std::result::Result<WeatherForecastSnapshot, ForecastError>;
}

/// Durable plan state machine plus zone/mission records.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn insert_plan(&self, plan: &Plan) -> Result<()>;
    async fn load_plan(&self, plan_id: &str) -> Result<Option<Plan>>;
    async fn plan_ids_with_status(&self, status: PlanStatus) -> Result<Vec<String>>;
    /// QUEUED → PROCESSING as one atomic step. False when the plan is
    /// missing or was already claimed.
    async fn claim(&self, plan_id: &str) -> Result<bool>;
    /// False unless the plan is PROCESSING.
    async fn update_progress(&self, plan_id: &str, progress: u8) -> Result<bool>;
    async fn mark_failed(&self, plan_id: &str, message: &str) -> Result<()>;
    /// Zones, missions, summary and READY land together or not at all.
    async fn commit_ready(
        &self,
        plan_id: &str,
        zones: &[ZoneDraft],
        missions: &[MissionRecord],
        summary: &PlanSummary,
    ) -> Result<()>;
    async fn load_zones(&self, plan_id: &str) -> Result<Vec<ZoneDraft>>;
    async fn load_missions(&self, plan_id: &str) -> Result<Vec<MissionRecord>>;
}
