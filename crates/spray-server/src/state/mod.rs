//! Shared application state for the HTTP layer.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::orchestrator::Orchestrator;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    queue: mpsc::Sender<String>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, queue: mpsc::Sender<String>) -> Self {
        Self { orchestrator, queue }
    }

    /// Hand a queued plan to the worker without waiting.
    ///
    /// A full queue is not an error: the plan stays QUEUED and the worker's
    /// sweep picks it up. Returns false only when the worker is gone.
    pub fn enqueue(&self, plan_id: String) -> bool {
        match self.queue.try_send(plan_id) {
            Ok(()) => true,
            Err(TrySendError::Full(plan_id)) => {
                tracing::debug!(plan_id = %plan_id, "Plan queue full; leaving plan for the sweep");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
