//! Gym membership REST API server.

use gym_api::config::ApiConfig;
use gym_api::server::{self, AppState};
use gym_lifecycle::AssignmentLifecycleManager;
use gym_store::{InMemoryAuditLog, InMemoryGymStore, JsonlAuditLog, SeedData};
use gym_types::{AuditLog, MembershipLifecycle};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ApiConfig::from_env();
    let lifecycle = build_lifecycle(&cfg).await?;

    let app = server::router(Arc::new(AppState { lifecycle }));
    let addr: SocketAddr = cfg.listen.parse()?;
    tracing::info!("gym API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}

async fn load_seed(cfg: &ApiConfig) -> Result<SeedData, BoxError> {
    match &cfg.seed_path {
        Some(path) => {
            let seed = SeedData::load(path).await?;
            tracing::info!(
                path = %path.display(),
                plans = seed.plans.len(),
                members = seed.members.len(),
                "seed data loaded"
            );
            Ok(seed)
        }
        None => Ok(SeedData::default()),
    }
}

/// JSONL file when configured, otherwise `fallback`.
fn audit_log_or(cfg: &ApiConfig, fallback: Arc<dyn AuditLog>) -> Arc<dyn AuditLog> {
    match &cfg.audit_log_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "audit log: jsonl");
            Arc::new(JsonlAuditLog::new(path))
        }
        None => fallback,
    }
}

async fn build_lifecycle(cfg: &ApiConfig) -> Result<Arc<dyn MembershipLifecycle>, BoxError> {
    let seed = load_seed(cfg).await?;

    #[cfg(feature = "sqlite")]
    if let Some(path) = &cfg.sqlite_path {
        let store = Arc::new(gym_store::SqliteGymStore::new(path)?);
        store.seed(&seed)?;
        tracing::info!(path = %path.display(), "store: sqlite");
        let audit = audit_log_or(cfg, store.clone());
        let manager = AssignmentLifecycleManager::from_store(store, audit)
            .with_config(cfg.lifecycle.clone());
        return Ok(Arc::new(manager));
    }
    #[cfg(not(feature = "sqlite"))]
    if cfg.sqlite_path.is_some() {
        tracing::warn!("GYM_SQLITE_PATH is set but the sqlite feature is disabled, using memory");
    }

    tracing::info!("store: in-memory");
    let store = Arc::new(InMemoryGymStore::from_seed(seed).await);
    let audit = audit_log_or(cfg, Arc::new(InMemoryAuditLog::new()));
    let manager =
        AssignmentLifecycleManager::from_store(store, audit).with_config(cfg.lifecycle.clone());
    Ok(Arc::new(manager))
}
