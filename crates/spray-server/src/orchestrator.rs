//! Plan orchestrator: drives one plan through QUEUED → PROCESSING → READY/FAILED.
//!
//! Each run loads its inputs through the collaborator traits, calls the
//! core stages in order, reports progress between them and commits the
//! results in a single store call. Any error before the commit leaves the
//! plan FAILED with the error text and nothing else written.

use chrono::Utc;
use spray_core::planner::{cluster_stage, collect_stage, compliance_stage, mission_stage, weather_stage};
use spray_core::summary::SummaryInputs;
use spray_core::{
    build_summary, ForecastInput, GeoPlanarOps, MissionDraft, Plan, PlanError, PlanStatus, SprayPlanConfig,
    SprayPlanRequest, WeatherReport,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

use crate::collaborators::{
    ComplianceLayerStore, DoseTable, ForecastProvider, MemoryStore, PlanStore, SqliteStore, SurveyStore,
};
use crate::persistence::MissionRecord;

const PROGRESS_STARTED: u8 = 5;
const PROGRESS_POINTS: u8 = 25;
const PROGRESS_CLUSTERED: u8 = 55;
const PROGRESS_CLIPPED: u8 = 65;
const PROGRESS_ROUTED: u8 = 82;

/// Forecast hours requested beyond the lookahead so late windows still have samples.
const FORECAST_MARGIN_HOURS: u32 = 2;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("plan {0} not found")]
    NotFound(String),
    #[error("project {0} not found")]
    ProjectNotFound(String),
    #[error("store error: {0:#}")]
    Store(anyhow::Error),
    #[error("failed to persist plan results: {0:#}")]
    Persistence(anyhow::Error),
}

/// Every external dependency of a plan run.
#[derive(Clone)]
pub struct Collaborators {
    pub surveys: Arc<dyn SurveyStore>,
    pub doses: Arc<dyn DoseTable>,
    pub layers: Arc<dyn ComplianceLayerStore>,
    pub forecasts: Arc<dyn ForecastProvider>,
    pub plans: Arc<dyn PlanStore>,
}

impl Collaborators {
    pub fn sqlite(store: SqliteStore, forecasts: Arc<dyn ForecastProvider>) -> Self {
        let store = Arc::new(store);
        Self {
            surveys: store.clone(),
            doses: store.clone(),
            layers: store.clone(),
            forecasts,
            plans: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>, forecasts: Arc<dyn ForecastProvider>) -> Self {
        Self {
            surveys: store.clone(),
            doses: store.clone(),
            layers: store.clone(),
            forecasts,
            plans: store,
        }
    }
}

pub struct Orchestrator {
    collaborators: Collaborators,
    ops: GeoPlanarOps,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            ops: GeoPlanarOps,
        }
    }

    pub fn plans(&self) -> &Arc<dyn PlanStore> {
        &self.collaborators.plans
    }

    /// Normalize the request and store a QUEUED plan for an existing project.
    pub async fn create_plan(&self, project_id: &str, request: &SprayPlanRequest) -> Result<Plan, RunError> {
        let project = self
            .collaborators
            .surveys
            .project(project_id)
            .await
            .map_err(RunError::Store)?;
        if project.is_none() {
            return Err(RunError::ProjectNotFound(project_id.to_string()));
        }

        let config = SprayPlanConfig::from_request(request);
        let plan = Plan::queued(uuid::Uuid::new_v4().to_string(), project_id.to_string(), config);
        self.collaborators
            .plans
            .insert_plan(&plan)
            .await
            .map_err(RunError::Store)?;

        tracing::info!(plan_id = %plan.id, project_id, "Spray plan queued");
        Ok(plan)
    }

    /// Run a QUEUED plan to a terminal state and return that state.
    ///
    /// The plan is claimed atomically first, so a plan delivered twice runs
    /// once and plans that are not QUEUED are left untouched. Planning
    /// failures are recorded on the plan and reported as
    /// `Ok(PlanStatus::Failed)`; only store failures while loading, claiming
    /// or marking the plan surface as errors.
    pub async fn run(&self, plan_id: &str) -> Result<PlanStatus, RunError> {
        let plan = self.load(plan_id).await?;
        if plan.status != PlanStatus::Queued {
            tracing::debug!(plan_id, status = plan.status.as_str(), "Skipping plan that is not queued");
            return Ok(plan.status);
        }

        let claimed = self
            .collaborators
            .plans
            .claim(plan_id)
            .await
            .map_err(RunError::Store)?;
        if !claimed {
            let current = self.load(plan_id).await?;
            tracing::debug!(plan_id, status = current.status.as_str(), "Plan already claimed by another run");
            return Ok(current.status);
        }

        let span = tracing::info_span!("plan_run", plan_id = %plan.id, project_id = %plan.project_id);
        self.run_claimed(&plan).instrument(span).await
    }

    async fn load(&self, plan_id: &str) -> Result<Plan, RunError> {
        self.collaborators
            .plans
            .load_plan(plan_id)
            .await
            .map_err(RunError::Store)?
            .ok_or_else(|| RunError::NotFound(plan_id.to_string()))
    }

    async fn run_claimed(&self, plan: &Plan) -> Result<PlanStatus, RunError> {
        let started = std::time::Instant::now();
        match self.execute(plan).await {
            Ok(()) => {
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Spray plan ready");
                Ok(PlanStatus::Ready)
            }
            Err(err) => {
                tracing::error!(error = %err, "Spray plan failed");
                self.collaborators
                    .plans
                    .mark_failed(&plan.id, &err.to_string())
                    .await
                    .map_err(RunError::Store)?;
                Ok(PlanStatus::Failed)
            }
        }
    }

    async fn execute(&self, plan: &Plan) -> Result<(), RunError> {
        let config = &plan.config;
        self.advance(plan, PROGRESS_STARTED).await?;

        let project = self
            .collaborators
            .surveys
            .project(&plan.project_id)
            .await
            .map_err(RunError::Store)?
            .ok_or_else(|| RunError::ProjectNotFound(plan.project_id.clone()))?;
        let records = self
            .collaborators
            .surveys
            .source_records(&plan.project_id)
            .await
            .map_err(RunError::Store)?;
        let points = collect_stage(&records, config)?;
        tracing::debug!(records = records.len(), points = points.len(), "Source points collected");
        self.advance(plan, PROGRESS_POINTS).await?;

        let doses = self
            .collaborators
            .doses
            .dose_reference()
            .await
            .map_err(RunError::Store)?;
        let clustered = cluster_stage(&points, config, &doses)?;
        tracing::debug!(
            zones = clustered.zones.len(),
            skipped = clustered.skipped_clusters,
            "Zones clustered"
        );
        self.advance(plan, PROGRESS_CLUSTERED).await?;

        let layers = if config.compliance_enabled {
            self.collaborators
                .layers
                .active_layers(&plan.project_id)
                .await
                .map_err(RunError::Store)?
        } else {
            Vec::new()
        };
        let clipped = compliance_stage(clustered.zones, &layers, config, &self.ops)?;
        tracing::debug!(
            zones = clipped.zones.len(),
            excluded_ha = clipped.report.excluded_area_ha,
            "Compliance clipping applied"
        );
        self.advance(plan, PROGRESS_CLIPPED).await?;

        let (start, missions) = mission_stage(&clipped.zones, config, project.center());
        let now = Utc::now();
        let forecast = self.fetch_forecast(config, start).await;
        let weather = weather_stage(&missions, config, &forecast, now);
        tracing::debug!(
            missions = missions.len(),
            weather_used = weather.used,
            "Missions packed and routed"
        );
        self.advance(plan, PROGRESS_ROUTED).await?;

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
        let records = mission_records(missions, &weather);

        self.collaborators
            .plans
            .commit_ready(&plan.id, &clipped.zones, &records, &summary)
            .await
            .map_err(RunError::Persistence)
    }

    async fn advance(&self, plan: &Plan, progress: u8) -> Result<(), RunError> {
        let updated = self
            .collaborators
            .plans
            .update_progress(&plan.id, progress)
            .await
            .map_err(RunError::Store)?;
        if !updated {
            tracing::warn!(progress, "Plan is no longer active; progress not recorded");
        }
        Ok(())
    }

    /// One forecast per run, fetched at the launch point. Failures degrade to
    /// a plan without weather optimization.
    async fn fetch_forecast(&self, config: &SprayPlanConfig, start: Option<(f64, f64)>) -> ForecastInput {
        if !config.weather.enabled {
            return ForecastInput::Unavailable("Weather optimization disabled for this plan".to_string());
        }
        let Some((lat, lon)) = start else {
            return ForecastInput::Unavailable("No launch coordinate available for a forecast".to_string());
        };

        let hours = config.weather.lookahead_hours + FORECAST_MARGIN_HOURS;
        match self.collaborators.forecasts.hourly_forecast(lat, lon, hours).await {
            Ok(snapshot) => ForecastInput::Snapshot(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "Forecast fetch failed; planning without weather");
                ForecastInput::Unavailable(format!("Forecast unavailable: {err}"))
            }
        }
    }
}

fn mission_records(missions: Vec<MissionDraft>, weather: &WeatherReport) -> Vec<MissionRecord> {
    missions
        .into_iter()
        .map(|mission| {
            let schedule = weather
                .missions
                .iter()
                .find(|s| s.mission_sequence == mission.sequence)
                .cloned();
            MissionRecord {
                mission,
                weather: schedule,
            }
        })
        .collect()
}
