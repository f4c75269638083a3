//! kbase-api server binary.

use anyhow::Context;
use tracing::info;

use kbase_api::audit::AuditLog;
use kbase_api::config::AppConfig;
use kbase_api::services::spawn_cleanup_task;
use kbase_api::{app, telemetry, AppState};
use kbase_db::{log_pool_metrics, Database, FilesystemBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = telemetry::init(telemetry::DEFAULT_FILTER, "kbase-api.log");

    let config = AppConfig::from_env();

    info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    db.migrate().await.context("failed to run migrations")?;
    info!("Database migrations applied");
    log_pool_metrics(db.pool());

    FilesystemBackend::new(config.upload_dir.clone())
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("upload dir {} unusable: {}", config.upload_dir.display(), e))?;
    let db = db.with_filesystem_storage(config.upload_dir.clone(), config.file_rules());
    info!(
        upload_dir = %config.upload_dir.display(),
        max_file_size_mb = config.max_file_size_mb,
        "File storage ready"
    );

    let audit = AuditLog::open(&config.audit_log_dir, &config.audit_log_filename)
        .context("failed to open audit log")?;

    if config.api_key.is_some() {
        info!(header = %config.api_key_header_name, "API key required for /api/v1");
    } else {
        info!("API key not configured, /api/v1 is open");
    }

    let addr = config.bind_addr();
    let state = AppState::new(db, config, audit).context("invalid configuration")?;

    match state.config.cleanup_interval() {
        Some(period) => {
            let reconciler = state.db.file_storage()?.reconciler();
            spawn_cleanup_task(reconciler, state.audit.clone(), period);
        }
        None => info!("Scheduled attachment cleanup disabled"),
    }

    let router = app(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
