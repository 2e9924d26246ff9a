//! Spray plan server - queues spray plans and runs them in the background

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spray_server::collaborators::SqliteStore;
use spray_server::config::Config;
use spray_server::forecast::OpenMeteoProvider;
use spray_server::loops::plan_worker_loop::{recover_pending_plans, run_plan_worker_loop};
use spray_server::orchestrator::{Collaborators, Orchestrator};
use spray_server::state::AppState;
use spray_server::{api, persistence};

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("spray_server=debug".parse()?);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(config.log_json)?;

    tracing::info!("Starting spray plan server...");

    let db = persistence::init_database(&config.database_path, config.database_max_connections).await?;
    let collaborators = Collaborators::sqlite(
        SqliteStore::new(db),
        Arc::new(OpenMeteoProvider::new(&config)?),
    );
    let orchestrator = Arc::new(Orchestrator::new(collaborators));

    let (queue_tx, queue_rx) = mpsc::channel(config.worker_queue_depth);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Recovery runs before the worker so no run can be failed as interrupted
    recover_pending_plans(&orchestrator, &queue_tx).await?;
    let worker = tokio::spawn(run_plan_worker_loop(
        orchestrator.clone(),
        queue_rx,
        config.worker_concurrency,
        Duration::from_secs(config.worker_sweep_interval_s),
        shutdown_tx.subscribe(),
    ));

    let state = Arc::new(AppState::new(orchestrator, queue_tx));
    let app = api::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(());
    let _ = worker.await;
    Ok(())
}
