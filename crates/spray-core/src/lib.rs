pub mod clustering;
pub mod compliance;
pub mod config;
pub mod error;
pub mod geometry;
pub mod models;
pub mod packing;
pub mod planner;
pub mod route_optimizer;
pub mod source;
pub mod spatial;
pub mod summary;
pub mod weather;

pub use clustering::{cluster_zones, ClusterOutcome, DoseReference};
pub use compliance::{clip_zones, ClipOutcome, ComplianceReport};
pub use config::{SprayPlanConfig, SprayPlanRequest, StartCoordinate};
pub use error::PlanError;
pub use geometry::{GeoPlanarOps, GeometryError, PlanarOps};
pub use models::{
    ComplianceLayer, DoseSource, ForecastPoint, LayerGeometry, LayerKind, MissionDraft,
    MissionWeatherSchedule, Plan, PlanStatus, RiskAssessment, SourceKind, SourcePoint,
    WeatherDecision, WeatherForecastSnapshot, ZoneDraft,
};
pub use packing::{pack_missions, MissionPack};
pub use planner::{run_plan, ForecastInput, PlanInputs, PlanOutcome};
pub use route_optimizer::{build_missions, optimize_route, resolve_start};
pub use source::{collect_source_points, CertaintyLabel, Confidence, RawSourceRecord};
pub use spatial::haversine_distance;
pub use summary::{build_summary, PlanSummary};
pub use weather::{optimize_launch_window, WeatherReport};
