//! SQLite-backed collaborators.

use anyhow::Result;
use async_trait::async_trait;
use spray_core::source::RawSourceRecord;
use spray_core::{ComplianceLayer, DoseReference, Plan, PlanStatus, PlanSummary, ZoneDraft};

use super::{ComplianceLayerStore, DoseTable, PlanStore, SurveyStore};
use crate::persistence::{compliance_layers, doses, plans, surveys, Database, MissionRecord, Project};

/// Every store interface over one connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SurveyStore for SqliteStore {
    async fn project(&self, project_id: &str) -> Result<Option<Project>> {
        surveys::load_project(self.db.pool(), project_id).await
    }

    async fn source_records(&self, project_id: &str) -> Result<Vec<RawSourceRecord>> {
        surveys::load_source_records(self.db.pool(), project_id).await
    }
}

#[async_trait]
impl DoseTable for SqliteStore {
    async fn dose_reference(&self) -> Result<DoseReference> {
        doses::load_dose_reference(self.db.pool()).await
    }
}

#[async_trait]
impl ComplianceLayerStore for SqliteStore {
    async fn active_layers(&self, project_id: &str) -> Result<Vec<ComplianceLayer>> {
        compliance_layers::load_active_layers(self.db.pool(), project_id).await
    }
}

#[async_trait]
impl PlanStore for SqliteStore {
    async fn insert_plan(&self, plan: &Plan) -> Result<()> {
        plans::insert_plan(self.db.pool(), plan).await
    }

    async fn load_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        plans::load_plan(self.db.pool(), plan_id).await
    }

    async fn plan_ids_with_status(&self, status: PlanStatus) -> Result<Vec<String>> {
        plans::plan_ids_with_status(self.db.pool(), status).await
    }

    async fn claim(&self, plan_id: &str) -> Result<bool> {
        plans::claim(self.db.pool(), plan_id).await
    }

    async fn update_progress(&self, plan_id: &str, progress: u8) -> Result<bool> {
        plans::update_progress(self.db.pool(), plan_id, progress).await
    }

    async fn mark_failed(&self, plan_id: &str, message: &str) -> Result<()> {
        plans::mark_failed(self.db.pool(), plan_id, message).await
    }

    async fn commit_ready(
        &self,
        plan_id: &str,
        zones: &[ZoneDraft],
        missions: &[MissionRecord],
        summary: &PlanSummary,
    ) -> Result<()> {
        plans::commit_ready(self.db.pool(), plan_id, zones, missions, summary).await
    }

    async fn load_zones(&self, plan_id: &str) -> Result<Vec<ZoneDraft>> {
        plans::load_zones(self.db.pool(), plan_id).await
    }

    async fn load_missions(&self, plan_id: &str) -> Result<Vec<MissionRecord>> {
        plans::load_missions(self.db.pool(), plan_id).await
    }
}
