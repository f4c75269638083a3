//! Scheduled attachment reconciliation.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use kbase_db::{AttachmentReconciler, ReconcileReport};

use crate::audit::{AuditEvent, AuditLog};

/// Run the reconciler once and audit the outcome.
pub async fn run_cleanup(reconciler: &AttachmentReconciler, audit: &AuditLog) -> ReconcileReport {
    let report = reconciler.run().await;
    if report.total() > 0 || report.file_errors > 0 {
        audit.record(AuditEvent::CleanupCompleted { report: &report });
    }
    report
}

/// Run the reconciler every `period`, starting immediately.
///
/// A slow pass delays the next one instead of triggering a burst.
pub fn spawn_cleanup_task(
    reconciler: AttachmentReconciler,
    audit: AuditLog,
    period: Duration,
) -> JoinHandle<()> {
    info!(
        subsystem = "cleanup",
        component = "scheduler",
        period_secs = period.as_secs(),
        "Attachment cleanup scheduled"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_cleanup(&reconciler, &audit).await;
        }
    })
}
