//! Input-exhaustion failures that end a plan run.

use thiserror::Error;

/// Terminal planning errors. The display text is stored on FAILED plans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no source points matched the selection filters")]
    NoSourcePoints,
    #[error("no zones met the minimum of {min_detections} detections per zone")]
    NoZonesAfterClustering { min_detections: u32 },
    #[error("all zones were removed by compliance clipping")]
    NoZonesAfterCompliance,
}
