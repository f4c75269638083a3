//! Audit trail for user actions.
//!
//! One `AuditLog` is opened at start-up and carried in `AppState`. Every
//! record is written as a `YYYY-MM-DD HH:MM:SS,mmm - LEVEL - message` line to
//! the audit file and mirrored as a `tracing` event with target `audit`.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use uuid::Uuid;

use kbase_core::{Error, Result};
use kbase_db::ReconcileReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warning => "WARNING",
            AuditLevel::Error => "ERROR",
        }
    }
}

/// Something worth recording in the audit trail.
#[derive(Debug, Clone)]
pub enum AuditEvent<'a> {
    ArticleInserted { user: &'a str, article_id: Uuid, title: &'a str },
    ArticleUpdated { user: &'a str, article_id: Uuid, title: &'a str },
    ArticleDeleted { user: &'a str, article_id: Uuid, title: &'a str },
    CommentInserted { user: &'a str, comment_id: Uuid, article_id: Uuid },
    CommentDeleted { user: &'a str, comment_id: Uuid, article_id: Uuid },
    ArticleLiked { user: &'a str, article_id: Uuid },
    ArticleUnliked { user: &'a str, article_id: Uuid },
    CommentLiked { user: &'a str, comment_id: Uuid },
    CommentUnliked { user: &'a str, comment_id: Uuid },
    AttachmentUploaded { user: &'a str, attachment_id: Uuid, filename: &'a str, pending: bool },
    AttachmentDeleted { user: &'a str, attachment_id: Uuid },
    UnauthorizedEdit { user: &'a str, article_id: Uuid, owner: &'a str },
    UnauthorizedDelete { user: &'a str, resource: &'static str, id: Uuid, owner: &'a str },
    UnauthorizedUpload { user: &'a str, article_id: Uuid, owner: &'a str },
    SelfLike { user: &'a str, resource: &'static str, id: Uuid },
    InvalidUserId { value: &'a str, pattern: &'a str },
    FilesNotRemoved { user: &'a str, resource: &'static str, id: Uuid, failures: usize },
    CleanupCompleted { report: &'a ReconcileReport },
}

impl AuditEvent<'_> {
    pub fn level(&self) -> AuditLevel {
        match self {
            AuditEvent::UnauthorizedEdit { .. }
            | AuditEvent::UnauthorizedDelete { .. }
            | AuditEvent::UnauthorizedUpload { .. }
            | AuditEvent::SelfLike { .. }
            | AuditEvent::InvalidUserId { .. } => AuditLevel::Warning,
            AuditEvent::FilesNotRemoved { .. } => AuditLevel::Error,
            _ => AuditLevel::Info,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AuditEvent::ArticleInserted { user, article_id, title } => {
                format!("INSERT - User:{}, Article ID:{}, Title:'{}'", user, article_id, title)
            }
            AuditEvent::ArticleUpdated { user, article_id, title } => {
                format!("UPDATE - User:{}, Article ID:{}, Title:'{}'", user, article_id, title)
            }
            AuditEvent::ArticleDeleted { user, article_id, title } => {
                format!("DELETE - User:{}, Article ID:{}, Title:'{}'", user, article_id, title)
            }
            AuditEvent::CommentInserted { user, comment_id, article_id } => format!(
                "COMMENT INSERT - User:{}, Comment ID:{}, Article ID:{}",
                user, comment_id, article_id
            ),
            AuditEvent::CommentDeleted { user, comment_id, article_id } => format!(
                "COMMENT DELETE - User:{}, Comment ID:{}, Article ID:{}",
                user, comment_id, article_id
            ),
            AuditEvent::ArticleLiked { user, article_id } => {
                format!("LIKE INSERT - User:{}, Article ID:{}", user, article_id)
            }
            AuditEvent::ArticleUnliked { user, article_id } => {
                format!("LIKE DELETE - User:{}, Article ID:{}", user, article_id)
            }
            AuditEvent::CommentLiked { user, comment_id } => {
                format!("COMMENT LIKE INSERT - User:{}, Comment ID:{}", user, comment_id)
            }
            AuditEvent::CommentUnliked { user, comment_id } => {
                format!("COMMENT LIKE DELETE - User:{}, Comment ID:{}", user, comment_id)
            }
            AuditEvent::AttachmentUploaded { user, attachment_id, filename, pending } => format!(
                "ATTACHMENT INSERT - User:{}, Attachment ID:{}, File:'{}', Pending:{}",
                user, attachment_id, filename, pending
            ),
            AuditEvent::AttachmentDeleted { user, attachment_id } => {
                format!("ATTACHMENT DELETE - User:{}, Attachment ID:{}", user, attachment_id)
            }
            AuditEvent::UnauthorizedEdit { user, article_id, owner } => format!(
                "Unauthorized edit attempt - User:{}, Article ID:{}, Owner:{}",
                user, article_id, owner
            ),
            AuditEvent::UnauthorizedDelete { user, resource, id, owner } => format!(
                "Unauthorized {} delete attempt - User:{}, ID:{}, Owner:{}",
                resource, user, id, owner
            ),
            AuditEvent::UnauthorizedUpload { user, article_id, owner } => format!(
                "Unauthorized upload attempt - User:{}, Article ID:{}, Owner:{}",
                user, article_id, owner
            ),
            AuditEvent::SelfLike { user, resource, id } => {
                format!("Self-like attempt on {} - User:{}, ID:{}", resource, user, id)
            }
            AuditEvent::InvalidUserId { value, pattern } => {
                format!("Invalid user ID format: '{}' - Pattern: {}", value, pattern)
            }
            AuditEvent::FilesNotRemoved { user, resource, id, failures } => format!(
                "Failed to delete {} file(s) for {} {} - User:{}",
                failures, resource, id, user
            ),
            AuditEvent::CleanupCompleted { report } => format!(
                "CLEANUP - Pending purged:{}, Dangling removed:{}, File errors:{}",
                report.pending_purged, report.dangling_removed, report.file_errors
            ),
        }
    }
}

/// Render one audit line, without the trailing newline.
pub fn format_line(level: AuditLevel, message: &str) -> String {
    format!(
        "{} - {} - {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        level.as_str(),
        message
    )
}

/// Audit sink. Cloning shares the same writer.
#[derive(Clone)]
pub struct AuditLog {
    sink: Option<NonBlocking>,
    _guard: Option<Arc<WorkerGuard>>,
}

impl AuditLog {
    /// Append to `dir/filename`, creating the directory if needed.
    pub fn open(dir: &Path, filename: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(filename)
            .build(dir)
            .map_err(|e| Error::Config(format!("cannot open audit log: {}", e)))?;
        Ok(Self::from_writer(appender))
    }

    /// Write audit lines to any writer, off the request path.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        let (sink, guard) = tracing_appender::non_blocking(writer);
        Self {
            sink: Some(sink),
            _guard: Some(Arc::new(guard)),
        }
    }

    /// Only emit `tracing` events.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            _guard: None,
        }
    }

    pub fn record(&self, event: AuditEvent<'_>) {
        self.write(event.level(), &event.message());
    }

    pub fn write(&self, level: AuditLevel, message: &str) {
        match level {
            AuditLevel::Info => tracing::info!(target: "audit", "{}", message),
            AuditLevel::Warning => tracing::warn!(target: "audit", "{}", message),
            AuditLevel::Error => tracing::error!(target: "audit", "{}", message),
        }

        if let Some(sink) = &self.sink {
            let mut sink = sink.clone();
            let line = format!("{}\n", format_line(level, message));
            if let Err(e) = sink.write_all(line.as_bytes()) {
                tracing::error!(error = %e, "Failed to write audit line");
            }
        }
    }
}
