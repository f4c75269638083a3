//! kbase-cleanup: one reconciliation pass over attachments, for cron.
//!
//! Uses the same environment as the server (`DATABASE_URL`, `UPLOAD_DIR`,
//! `AUDIT_LOG_DIR`, ...). Exits non-zero only if set-up fails; the pass
//! itself never fails.

use anyhow::Context;
use tracing::{info, warn};

use kbase_api::audit::AuditLog;
use kbase_api::config::AppConfig;
use kbase_api::services::run_cleanup;
use kbase_api::telemetry;
use kbase_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = telemetry::init("kbase_api=info,kbase_db=info", "kbase-cleanup.log");

    let config = AppConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?
        .with_filesystem_storage(config.upload_dir.clone(), config.file_rules());

    let audit = match AuditLog::open(&config.audit_log_dir, &config.audit_log_filename) {
        Ok(audit) => audit,
        Err(e) => {
            warn!(error = %e, "Audit log unavailable, continuing without it");
            AuditLog::disabled()
        }
    };

    let reconciler = db.file_storage()?.reconciler();
    let report = run_cleanup(&reconciler, &audit).await;

    info!(
        pending_purged = report.pending_purged,
        dangling_removed = report.dangling_removed,
        file_errors = report.file_errors,
        "Cleanup complete"
    );
    println!("{}", serde_json::to_string(&report)?);

    Ok(())
}
