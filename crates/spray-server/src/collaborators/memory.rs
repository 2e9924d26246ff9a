//! In-memory collaborators using DashMap.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use spray_core::source::RawSourceRecord;
use spray_core::{
    ComplianceLayer, DoseReference, Plan, PlanStatus, PlanSummary, WeatherForecastSnapshot, ZoneDraft,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{ComplianceLayerStore, DoseTable, ForecastProvider, PlanStore, SurveyStore};
use crate::forecast::ForecastError;
use crate::persistence::{MissionRecord, Project};

struct StoredPlan {
    plan: Plan,
    zones: Vec<ZoneDraft>,
    missions: Vec<MissionRecord>,
}

/// Thread-safe store for every collaborator interface except forecasts.
#[derive(Default)]
pub struct MemoryStore {
    projects: DashMap<String, Project>,
    records: DashMap<String, Vec<RawSourceRecord>>,
    layers: DashMap<String, Vec<ComplianceLayer>>,
    doses: RwLock<DoseReference>,
    plans: DashMap<String, StoredPlan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&self, project: Project, records: Vec<RawSourceRecord>) {
        self.records.insert(project.project_id.clone(), records);
        self.projects.insert(project.project_id.clone(), project);
    }

    pub fn set_layers(&self, project_id: &str, layers: Vec<ComplianceLayer>) {
        self.layers.insert(project_id.to_string(), layers);
    }

    pub fn set_doses(&self, doses: DoseReference) {
        if let Ok(mut guard) = self.doses.write() {
            *guard = doses;
        }
    }
}

#[async_trait]
impl SurveyStore for MemoryStore {
    async fn project(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.projects.get(project_id).map(|p| p.value().clone()))
    }

    async fn source_records(&self, project_id: &str) -> Result<Vec<RawSourceRecord>> {
        Ok(self
            .records
            .get(project_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DoseTable for MemoryStore {
    async fn dose_reference(&self) -> Result<DoseReference> {
        self.doses
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow::anyhow!("dose table lock poisoned"))
    }
}

#[async_trait]
impl ComplianceLayerStore for MemoryStore {
    async fn active_layers(&self, project_id: &str) -> Result<Vec<ComplianceLayer>> {
        Ok(self
            .layers
            .get(project_id)
            .map(|l| l.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn insert_plan(&self, plan: &Plan) -> Result<()> {
        if self.plans.contains_key(&plan.id) {
            anyhow::bail!("plan {} already exists", plan.id);
        }
        self.plans.insert(
            plan.id.clone(),
            StoredPlan {
                plan: plan.clone(),
                zones: Vec::new(),
                missions: Vec::new(),
            },
        );
        Ok(())
    }

    async fn load_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        Ok(self.plans.get(plan_id).map(|stored| stored.plan.clone()))
    }

    async fn plan_ids_with_status(&self, status: PlanStatus) -> Result<Vec<String>> {
        let mut plans: Vec<(chrono::DateTime<Utc>, String)> = self
            .plans
            .iter()
            .filter(|entry| entry.plan.status == status)
            .map(|entry| (entry.plan.created_at, entry.key().clone()))
            .collect();
        plans.sort();
        Ok(plans.into_iter().map(|(_, id)| id).collect())
    }

    async fn claim(&self, plan_id: &str) -> Result<bool> {
        let Some(mut stored) = self.plans.get_mut(plan_id) else {
            return Ok(false);
        };
        if stored.plan.status != PlanStatus::Queued {
            return Ok(false);
        }
        stored.plan.status = PlanStatus::Processing;
        stored.plan.progress = 0;
        stored.plan.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_progress(&self, plan_id: &str, progress: u8) -> Result<bool> {
        let Some(mut stored) = self.plans.get_mut(plan_id) else {
            return Ok(false);
        };
        if stored.plan.status != PlanStatus::Processing {
            return Ok(false);
        }
        stored.plan.progress = progress.min(100);
        stored.plan.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(&self, plan_id: &str, message: &str) -> Result<()> {
        if let Some(mut stored) = self.plans.get_mut(plan_id) {
            if !stored.plan.status.is_terminal() {
                stored.plan.status = PlanStatus::Failed;
                stored.plan.progress = 100;
                stored.plan.error_message = Some(message.to_string());
                stored.plan.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn commit_ready(
        &self,
        plan_id: &str,
        zones: &[ZoneDraft],
        missions: &[MissionRecord],
        summary: &PlanSummary,
    ) -> Result<()> {
        let Some(mut stored) = self.plans.get_mut(plan_id) else {
            anyhow::bail!("plan {} not found", plan_id);
        };
        if stored.plan.status != PlanStatus::Processing {
            anyhow::bail!("plan {} is not processing; refusing to commit results", plan_id);
        }
        stored.zones = zones.to_vec();
        stored.missions = missions.to_vec();
        stored.plan.status = PlanStatus::Ready;
        stored.plan.progress = 100;
        stored.plan.compliance_report = Some(summary.compliance.clone());
        stored.plan.weather_report = Some(summary.weather.clone());
        stored.plan.summary = Some(summary.clone());
        stored.plan.error_message = None;
        stored.plan.updated_at = Utc::now();
        Ok(())
    }

    async fn load_zones(&self, plan_id: &str) -> Result<Vec<ZoneDraft>> {
        Ok(self
            .plans
            .get(plan_id)
            .map(|stored| stored.zones.clone())
            .unwrap_or_default())
    }

    async fn load_missions(&self, plan_id: &str) -> Result<Vec<MissionRecord>> {
        Ok(self
            .plans
            .get(plan_id)
            .map(|stored| stored.missions.clone())
            .unwrap_or_default())
    }
}

/// Forecast provider returning a canned snapshot or a canned failure.
pub struct FixedForecast {
    snapshot: Option<WeatherForecastSnapshot>,
    failure: String,
    calls: AtomicUsize,
}

impl FixedForecast {
    pub fn snapshot(snapshot: WeatherForecastSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            failure: String::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            snapshot: None,
            failure: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastProvider for FixedForecast {
    async fn hourly_forecast(
        &self,
        _lat: f64,
        _lon: f64,
        _hours: u32,
    ) -> std::result::Result<WeatherForecastSnapshot, ForecastError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .clone()
            .ok_or_else(|| ForecastError::Unavailable(self.failure.clone()))
    }
}
