//! Plan orchestrator and worker tests against in-memory collaborators.

use chrono::{Duration, Utc};
use async_trait::async_trait;
use spray_core::source::{Confidence, RawSourceRecord};
use spray_core::{
    ForecastPoint, Plan, PlanStatus, PlanSummary, SourceKind, SprayPlanRequest, WeatherDecision,
    WeatherForecastSnapshot, ZoneDraft,
};
use spray_server::collaborators::{FixedForecast, MemoryStore, PlanStore};
use spray_server::loops::plan_worker_loop::{recover_pending_plans, run_plan_worker_loop, INTERRUPTED_MESSAGE};
use spray_server::orchestrator::{Collaborators, Orchestrator};
use spray_server::persistence::{MissionRecord, Project};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const PROJECT: &str = "farm-1";
const LAT: f64 = -27.47;
const LON: f64 = 153.02;

fn record(id: usize, species: &str, dlat: f64, dlon: f64) -> RawSourceRecord {
    RawSourceRecord {
        source_id: format!("{species}-{id}"),
        source_kind: SourceKind::Detection,
        species: species.to_string(),
        confidence: Some(Confidence::Numeric(0.85)),
        lat: Some(LAT + dlat),
        lon: Some(LON + dlon),
        verified: true,
    }
}

/// Two patches about 500m apart.
fn survey() -> Vec<RawSourceRecord> {
    let mut records: Vec<RawSourceRecord> = (0..12)
        .map(|i| record(i, "Lantana", (i % 4) as f64 * 2e-5, (i / 4) as f64 * 2e-5))
        .collect();
    records.extend((0..6).map(|i| record(i, "Parthenium", 0.0045 + (i % 3) as f64 * 2e-5, (i / 3) as f64 * 2e-5)));
    records
}

fn calm_forecast() -> WeatherForecastSnapshot {
    let start = Utc::now() - Duration::hours(1);
    WeatherForecastSnapshot {
        provider: "open-meteo".to_string(),
        fetched_at: Utc::now(),
        latitude: LAT,
        longitude: LON,
        timezone: "UTC".to_string(),
        points: (0..30)
            .map(|h| ForecastPoint {
                timestamp: start + Duration::hours(h),
                wind_speed_mps: 2.0,
                wind_gust_mps: 3.5,
                precipitation_probability: 5.0,
                temperature_c: 22.0,
            })
            .collect(),
    }
}

fn setup(records: Vec<RawSourceRecord>, forecast: FixedForecast) -> (Arc<MemoryStore>, Arc<FixedForecast>, Orchestrator) {
    let store = Arc::new(MemoryStore::new());
    store.add_project(
        Project {
            project_id: PROJECT.to_string(),
            name: "North paddock".to_string(),
            center_lat: Some(LAT),
            center_lon: Some(LON),
            created_at: Utc::now(),
        },
        records,
    );
    let forecast = Arc::new(forecast);
    let orchestrator = Orchestrator::new(Collaborators::memory(store.clone(), forecast.clone()));
    (store, forecast, orchestrator)
}

/// Plan store whose commits always fail, as a broken database would.
struct BrokenCommits(Arc<MemoryStore>);

#[async_trait]
impl PlanStore for BrokenCommits {
    async fn insert_plan(&self, plan: &Plan) -> anyhow::Result<()> {
        self.0.insert_plan(plan).await
    }

    async fn load_plan(&self, plan_id: &str) -> anyhow::Result<Option<Plan>> {
        self.0.load_plan(plan_id).await
    }

    async fn plan_ids_with_status(&self, status: PlanStatus) -> anyhow::Result<Vec<String>> {
        self.0.plan_ids_with_status(status).await
    }

    async fn claim(&self, plan_id: &str) -> anyhow::Result<bool> {
        self.0.claim(plan_id).await
    }

    async fn update_progress(&self, plan_id: &str, progress: u8) -> anyhow::Result<bool> {
        self.0.update_progress(plan_id, progress).await
    }

    async fn mark_failed(&self, plan_id: &str, message: &str) -> anyhow::Result<()> {
        self.0.mark_failed(plan_id, message).await
    }

    async fn commit_ready(
        &self,
        _plan_id: &str,
        _zones: &[ZoneDraft],
        _missions: &[MissionRecord],
        _summary: &PlanSummary,
    ) -> anyhow::Result<()> {
        anyhow::bail!("disk I/O error")
    }

    async fn load_zones(&self, plan_id: &str) -> anyhow::Result<Vec<ZoneDraft>> {
        self.0.load_zones(plan_id).await
    }

    async fn load_missions(&self, plan_id: &str) -> anyhow::Result<Vec<MissionRecord>> {
        self.0.load_missions(plan_id).await
    }
}

#[tokio::test]
async fn plan_runs_to_ready_with_weather_schedule() {
    let (store, forecast, orchestrator) = setup(survey(), FixedForecast::snapshot(calm_forecast()));

    let plan = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Queued);

    let status = orchestrator.run(&plan.id).await.unwrap();
    assert_eq!(status, PlanStatus::Ready);
    assert_eq!(forecast.calls(), 1);

    let stored = store.load_plan(&plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::Ready);
    assert_eq!(stored.progress, 100);
    assert!(stored.error_message.is_none());

    let summary = stored.summary.unwrap();
    assert_eq!(summary.totals.zones, 2);
    assert!(summary.weather.used);
    assert_eq!(summary.weather.overall_decision, Some(WeatherDecision::Go));

    let zones = store.load_zones(&plan.id).await.unwrap();
    let missions = store.load_missions(&plan.id).await.unwrap();
    assert_eq!(zones.len(), 2);
    assert!(!missions.is_empty());
    for record in &missions {
        let schedule = record.weather.as_ref().expect("mission schedule");
        assert_eq!(schedule.mission_sequence, record.mission.sequence);
        assert!(record.mission.optimized_distance_m <= record.mission.baseline_distance_m + 1e-6);
    }

    // Terminal plans are not run again
    assert_eq!(orchestrator.run(&plan.id).await.unwrap(), PlanStatus::Ready);
    assert_eq!(forecast.calls(), 1);
}

#[tokio::test]
async fn forecast_failure_degrades_without_failing_the_plan() {
    let (store, _forecast, orchestrator) = setup(survey(), FixedForecast::failing("timeout"));

    let plan = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    assert_eq!(orchestrator.run(&plan.id).await.unwrap(), PlanStatus::Ready);

    let stored = store.load_plan(&plan.id).await.unwrap().unwrap();
    let weather = stored.summary.unwrap().weather;
    assert!(!weather.used);
    assert!(weather.notes.iter().any(|note| note.contains("Forecast unavailable")));
    assert!(store
        .load_missions(&plan.id)
        .await
        .unwrap()
        .iter()
        .all(|record| record.weather.is_none()));
}

#[tokio::test]
async fn disabled_weather_skips_the_forecast_fetch() {
    let (_store, forecast, orchestrator) = setup(survey(), FixedForecast::snapshot(calm_forecast()));
    let request = SprayPlanRequest {
        weather_enabled: Some(false),
        ..Default::default()
    };

    let plan = orchestrator.create_plan(PROJECT, &request).await.unwrap();
    assert_eq!(orchestrator.run(&plan.id).await.unwrap(), PlanStatus::Ready);
    assert_eq!(forecast.calls(), 0);
}

#[tokio::test]
async fn persistence_failure_fails_plan_without_partial_rows() {
    let (store, forecast, _) = setup(survey(), FixedForecast::failing("offline"));
    let mut collaborators = Collaborators::memory(store.clone(), forecast);
    collaborators.plans = Arc::new(BrokenCommits(store.clone()));
    let orchestrator = Orchestrator::new(collaborators);

    let plan = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    assert_eq!(orchestrator.run(&plan.id).await.unwrap(), PlanStatus::Failed);

    let stored = store.load_plan(&plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::Failed);
    assert_eq!(stored.progress, 100);
    assert!(stored.summary.is_none());
    assert!(stored
        .error_message
        .unwrap()
        .contains("failed to persist plan results"));
    assert!(store.load_zones(&plan.id).await.unwrap().is_empty());
    assert!(store.load_missions(&plan.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn plan_delivered_twice_runs_once() {
    let (store, forecast, orchestrator) = setup(survey(), FixedForecast::snapshot(calm_forecast()));

    let plan = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    let (first, second) = tokio::join!(orchestrator.run(&plan.id), orchestrator.run(&plan.id));
    let statuses = [first.unwrap(), second.unwrap()];
    assert!(statuses.contains(&PlanStatus::Ready));
    assert_eq!(forecast.calls(), 1);

    let zones = store.load_zones(&plan.id).await.unwrap();
    assert_eq!(zones.len(), 2);
}

#[tokio::test]
async fn plan_claimed_elsewhere_is_left_alone() {
    let (store, forecast, orchestrator) = setup(survey(), FixedForecast::snapshot(calm_forecast()));

    let plan = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    assert!(store.claim(&plan.id).await.unwrap());
    assert!(!store.claim(&plan.id).await.unwrap());

    assert_eq!(orchestrator.run(&plan.id).await.unwrap(), PlanStatus::Processing);
    assert_eq!(forecast.calls(), 0);
    assert!(store.load_zones(&plan.id).await.unwrap().is_empty());
    let stored = store.load_plan(&plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::Processing);
    assert_eq!(stored.progress, 0);
}

#[tokio::test]
async fn empty_survey_fails_with_input_message() {
    let (store, _forecast, orchestrator) = setup(Vec::new(), FixedForecast::failing("unused"));

    let plan = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    assert_eq!(orchestrator.run(&plan.id).await.unwrap(), PlanStatus::Failed);

    let stored = store.load_plan(&plan.id).await.unwrap().unwrap();
    assert_eq!(
        stored.error_message.as_deref(),
        Some("no source points matched the selection filters")
    );
}

#[tokio::test]
async fn unknown_project_is_rejected_before_queueing() {
    let (store, _forecast, orchestrator) = setup(survey(), FixedForecast::failing("unused"));

    assert!(orchestrator
        .create_plan("missing", &SprayPlanRequest::default())
        .await
        .is_err());
    assert!(store
        .plan_ids_with_status(PlanStatus::Queued)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn restart_recovery_requeues_and_fails_interrupted_plans() {
    let (store, _forecast, orchestrator) = setup(survey(), FixedForecast::failing("unused"));

    let queued = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    let interrupted = orchestrator
        .create_plan(PROJECT, &SprayPlanRequest::default())
        .await
        .unwrap();
    assert!(store.claim(&interrupted.id).await.unwrap());

    let (tx, mut rx) = mpsc::channel(4);
    let count = recover_pending_plans(&orchestrator, &tx).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(rx.try_recv().unwrap(), queued.id);

    let failed = store.load_plan(&interrupted.id).await.unwrap().unwrap();
    assert_eq!(failed.status, PlanStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
}

#[tokio::test]
async fn worker_loop_runs_queued_plans() {
    let (store, _forecast, orchestrator) = setup(survey(), FixedForecast::failing("offline"));
    let orchestrator = Arc::new(orchestrator);

    let (tx, rx) = mpsc::channel(4);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let worker = tokio::spawn(run_plan_worker_loop(
        orchestrator.clone(),
        rx,
        2,
        std::time::Duration::from_secs(60),
        shutdown_tx.subscribe(),
    ));

    let mut ids = Vec::new();
    for _ in 0..3 {
        let plan = orchestrator
            .create_plan(PROJECT, &SprayPlanRequest::default())
            .await
            .unwrap();
        tx.send(plan.id.clone()).await.unwrap();
        ids.push(plan.id);
    }

    let mut finished = false;
    for _ in 0..200 {
        let ready = store.plan_ids_with_status(PlanStatus::Ready).await.unwrap();
        if ids.iter().all(|id| ready.contains(id)) {
            finished = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    assert!(finished, "worker did not finish every plan");

    shutdown_tx.send(()).unwrap();
    worker.await.unwrap();
}

#[tokio::test]
async fn worker_sweep_runs_plans_the_queue_never_carried() {
    let (store, _forecast, orchestrator) = setup(survey(), FixedForecast::failing("offline"));
    let orchestrator = Arc::new(orchestrator);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let plan = orchestrator
            .create_plan(PROJECT, &SprayPlanRequest::default())
            .await
            .unwrap();
        ids.push(plan.id);
    }

    // Recovery fills the one free slot without waiting for the rest
    let (tx, rx) = mpsc::channel(1);
    let enqueued = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        recover_pending_plans(&orchestrator, &tx),
    )
    .await
    .expect("recovery blocked on a full queue")
    .unwrap();
    assert_eq!(enqueued, 1);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let worker = tokio::spawn(run_plan_worker_loop(
        orchestrator.clone(),
        rx,
        1,
        std::time::Duration::from_millis(50),
        shutdown_tx.subscribe(),
    ));

    let mut finished = false;
    for _ in 0..200 {
        let ready = store.plan_ids_with_status(PlanStatus::Ready).await.unwrap();
        if ids.iter().all(|id| ready.contains(id)) {
            finished = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    assert!(finished, "sweep did not pick up every queued plan");
    assert!(store.plan_ids_with_status(PlanStatus::Failed).await.unwrap().is_empty());

    shutdown_tx.send(()).unwrap();
    worker.await.unwrap();
}
