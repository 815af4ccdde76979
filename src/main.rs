use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use orderflow_api::config;
use orderflow_api::db;
use orderflow_api::events::{self, EventSender};
use orderflow_api::services::expiry;
use orderflow_api::services::reconciliation::{self, PaymentReconciler};
use orderflow_api::services::stock_lock::{InMemoryLockBackend, LockBackend, RedisLockBackend};
use orderflow_api::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);
    cfg.validate_gateways()?;

    let db = db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        db::run_migrations(&db).await?;
        info!("database migrations applied");
    }
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(event_tx);
    tokio::spawn(events::process_events(event_rx));

    // Redis backs the distributed SKU locks. A single-node deployment can
    // run on the in-process backend, but that provides no cross-instance
    // exclusion.
    let lock_backend: Arc<dyn LockBackend> = match redis::Client::open(cfg.redis_url.as_str()) {
        Ok(client) => Arc::new(RedisLockBackend::new(Arc::new(client))),
        Err(e) => {
            warn!("redis unavailable ({}), falling back to in-process locks", e);
            Arc::new(InMemoryLockBackend::new())
        }
    };

    let cfg = Arc::new(cfg);
    let state = AppState::build(db, cfg.clone(), lock_backend, event_sender)?;

    tokio::spawn(expiry::run_expiry_sweep(
        state.orders.clone(),
        Duration::from_secs(cfg.expiry_sweep_interval_secs),
    ));

    let reconciler = PaymentReconciler::new(
        state.db.clone(),
        state.orders.clone(),
        state.gateways.clone(),
    );
    tokio::spawn(reconciliation::run_reconciliation_sweep(
        reconciler,
        Duration::from_secs(cfg.reconcile_interval_secs),
    ));

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, environment = %cfg.environment, "orderflow-api listening");

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
