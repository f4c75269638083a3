//! Orphaned attachment reconciliation.
//!
//! Two passes, both best-effort:
//!
//! 1. Pending rows older than the pending retention are deleted, then their
//!    files are removed.
//! 2. Files in storage with no row are removed once older than the dangling
//!    retention. Young files are left alone because an upload writes its file
//!    before it inserts its row.
//!
//! A pass never returns an error. Store failures end the affected step and
//! file failures are counted, so a broken file cannot stall the batch.
//! Re-running immediately finds nothing to do.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use kbase_core::defaults::{DANGLING_RETENTION_DAYS, PENDING_RETENTION_HOURS};
use kbase_core::AttachmentRepository;

use crate::file_storage::StorageBackend;

/// What one reconciliation pass cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Stale pending rows deleted.
    pub pending_purged: usize,
    /// Files without a row deleted.
    pub dangling_removed: usize,
    /// Files that could not be removed.
    pub file_errors: usize,
}

impl ReconcileReport {
    /// Aggregate count of cleaned items.
    pub fn total(&self) -> usize {
        self.pending_purged + self.dangling_removed
    }
}

/// Reclaims stale pending attachments and dangling files.
#[derive(Clone)]
pub struct AttachmentReconciler {
    attachments: Arc<dyn AttachmentRepository>,
    backend: Arc<dyn StorageBackend>,
    pending_retention: Duration,
    dangling_retention: Duration,
}

impl AttachmentReconciler {
    pub fn new(attachments: Arc<dyn AttachmentRepository>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            attachments,
            backend,
            pending_retention: Duration::hours(PENDING_RETENTION_HOURS),
            dangling_retention: Duration::days(DANGLING_RETENTION_DAYS),
        }
    }

    pub fn with_retention(mut self, pending: Duration, dangling: Duration) -> Self {
        self.pending_retention = pending;
        self.dangling_retention = dangling;
        self
    }

    /// Run both passes against the current time.
    pub async fn run(&self) -> ReconcileReport {
        self.run_at(Utc::now()).await
    }

    /// Run both passes as if the current time were `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> ReconcileReport {
        let start = Instant::now();
        let mut report = ReconcileReport::default();

        self.purge_pending(now, &mut report).await;
        self.sweep_dangling(now, &mut report).await;

        info!(
            subsystem = "cleanup",
            component = "reconciler",
            op = "run",
            pending_purged = report.pending_purged,
            dangling_removed = report.dangling_removed,
            file_errors = report.file_errors,
            duration_ms = start.elapsed().as_millis() as u64,
            "Attachment reconciliation finished"
        );
        report
    }

    async fn purge_pending(&self, now: DateTime<Utc>, report: &mut ReconcileReport) {
        let cutoff = now - self.pending_retention;
        let purged = match self.attachments.purge_stale_pending(cutoff).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(
                    subsystem = "cleanup",
                    component = "reconciler",
                    op = "purge_pending",
                    error = %e,
                    "Failed to purge stale pending attachments"
                );
                return;
            }
        };

        for attachment in purged {
            report.pending_purged += 1;
            if let Err(e) = self.backend.delete(&attachment.stored_filename).await {
                report.file_errors += 1;
                warn!(
                    subsystem = "cleanup",
                    component = "reconciler",
                    op = "purge_pending",
                    attachment_id = %attachment.id,
                    stored_filename = %attachment.stored_filename,
                    error = %e,
                    "Row purged but file removal failed"
                );
            } else {
                debug!(
                    attachment_id = %attachment.id,
                    user_id = %attachment.uploaded_by,
                    "Purged stale pending attachment"
                );
            }
        }
    }

    async fn sweep_dangling(&self, now: DateTime<Utc>, report: &mut ReconcileReport) {
        // Without the full set of known names nothing can be judged dangling.
        let known = match self.attachments.stored_filenames().await {
            Ok(names) => names,
            Err(e) => {
                error!(
                    subsystem = "cleanup",
                    component = "reconciler",
                    op = "sweep_dangling",
                    error = %e,
                    "Failed to load stored filenames, skipping dangling sweep"
                );
                return;
            }
        };

        let files = match self.backend.list().await {
            Ok(files) => files,
            Err(e) => {
                error!(
                    subsystem = "cleanup",
                    component = "reconciler",
                    op = "sweep_dangling",
                    error = %e,
                    "Failed to list storage, skipping dangling sweep"
                );
                return;
            }
        };

        let cutoff = now - self.dangling_retention;
        for file in files {
            if known.contains(&file.name) || file.modified >= cutoff {
                continue;
            }
            match self.backend.delete(&file.name).await {
                Ok(()) => {
                    report.dangling_removed += 1;
                    debug!(stored_filename = %file.name, "Removed dangling file");
                }
                Err(e) => {
                    report.file_errors += 1;
                    warn!(
                        subsystem = "cleanup",
                        component = "reconciler",
                        op = "sweep_dangling",
                        stored_filename = %file.name,
                        error = %e,
                        "Failed to remove dangling file"
                    );
                }
            }
        }
    }
}
