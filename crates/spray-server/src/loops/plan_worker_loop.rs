//! Plan worker loop.
//!
//! Receives plan ids from the API queue and runs them through the
//! orchestrator, at most `concurrency` at a time. The QUEUED row is the
//! durable handoff: on startup, queued plans are re-enqueued and plans that
//! were mid-run when the process stopped are failed. While running, the
//! worker also sweeps QUEUED rows on an interval so plans the API could not
//! fit into a full queue still get picked up.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;

use crate::orchestrator::Orchestrator;
use spray_core::PlanStatus;

pub const INTERRUPTED_MESSAGE: &str = "plan run interrupted by server restart; submit a new plan";

pub async fn run_plan_worker_loop(
    orchestrator: Arc<Orchestrator>,
    mut queue: mpsc::Receiver<String>,
    concurrency: usize,
    sweep_every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut sweep = tokio::time::interval(sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; startup recovery covers it
    sweep.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Plan worker shutting down");
                break;
            }
            next = queue.recv() => {
                let Some(plan_id) = next else {
                    tracing::info!("Plan queue closed; worker exiting");
                    break;
                };
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                dispatch(&orchestrator, plan_id, permit);
            }
            _ = sweep.tick() => {
                let queued = match orchestrator.plans().plan_ids_with_status(PlanStatus::Queued).await {
                    Ok(queued) => queued,
                    Err(err) => {
                        tracing::error!(error = %err, "Queued plan sweep failed");
                        continue;
                    }
                };
                if !queued.is_empty() {
                    tracing::debug!(count = queued.len(), "Sweeping queued plans");
                }
                for plan_id in queued {
                    let Ok(permit) = permits.clone().acquire_owned().await else {
                        return;
                    };
                    dispatch(&orchestrator, plan_id, permit);
                }
            }
        }
    }
}

/// Run one plan on its own task, holding a concurrency permit until done.
///
/// A plan reached both through the queue and a sweep is claimed by one run
/// only; the other returns without doing work.
fn dispatch(orchestrator: &Arc<Orchestrator>, plan_id: String, permit: OwnedSemaphorePermit) {
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        let _permit = permit;
        match orchestrator.run(&plan_id).await {
            Ok(status) => {
                tracing::debug!(plan_id = %plan_id, status = status.as_str(), "Plan run finished");
            }
            Err(err) => {
                tracing::error!(plan_id = %plan_id, error = %err, "Plan run could not complete");
            }
        }
    });
}

/// Fail plans left PROCESSING and re-enqueue plans left QUEUED.
///
/// Returns the number of plans handed back to the queue. Plans that do not
/// fit into the queue stay QUEUED for the worker's periodic sweep.
pub async fn recover_pending_plans(
    orchestrator: &Orchestrator,
    queue: &mpsc::Sender<String>,
) -> anyhow::Result<usize> {
    let store = orchestrator.plans();

    for plan_id in store.plan_ids_with_status(PlanStatus::Processing).await? {
        tracing::warn!(plan_id = %plan_id, "Failing plan interrupted by restart");
        store.mark_failed(&plan_id, INTERRUPTED_MESSAGE).await?;
    }

    let mut count = 0;
    for plan_id in store.plan_ids_with_status(PlanStatus::Queued).await? {
        match queue.try_send(plan_id) {
            Ok(()) => count += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(count, "Plan queue full; leaving the rest to the sweep");
                break;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => anyhow::bail!("plan queue closed"),
        }
    }
    if count > 0 {
        tracing::info!(count, "Re-enqueued queued plans");
    }
    Ok(count)
}
