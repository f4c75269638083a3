//! In-memory doubles for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use kbase_core::{Attachment, AttachmentRepository, Error, NewAttachment, Result};

use crate::file_storage::{StorageBackend, StoredFile};

/// Attachment rows kept in a vector.
#[derive(Default)]
pub struct InMemoryAttachments {
    rows: Mutex<Vec<Attachment>>,
    fail_reads: AtomicBool,
}

impl InMemoryAttachments {
    pub fn get(&self, id: Uuid) -> Option<Attachment> {
        self.rows.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    /// Make purge and filename listing fail, as if the database were down.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl AttachmentRepository for InMemoryAttachments {
    async fn insert(&self, new: NewAttachment) -> Result<Attachment> {
        let attachment = Attachment {
            id: Uuid::now_v7(),
            filename: new.filename,
            stored_filename: new.stored_filename,
            file_size: new.file_size,
            mime_type: new.mime_type,
            article_id: new.article_id,
            uploaded_by: new.uploaded_by,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(attachment.clone());
        Ok(attachment)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Attachment>> {
        Ok(self.get(id))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Attachment>> {
        let mut rows = self.rows.lock().unwrap();
        let pos = rows.iter().position(|a| a.id == id);
        Ok(pos.map(|i| rows.remove(i)))
    }

    async fn list_for_article(&self, article_id: Uuid) -> Result<Vec<Attachment>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.article_id == Some(article_id))
            .cloned()
            .collect())
    }

    async fn count_for(&self, article_ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        let mut counts = HashMap::new();
        for a in self.rows.lock().unwrap().iter() {
            if let Some(id) = a.article_id.filter(|id| article_ids.contains(id)) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn claim_pending(&self, uploaded_by: &str, article_id: Uuid) -> Result<u64> {
        let mut claimed = 0;
        for a in self.rows.lock().unwrap().iter_mut() {
            if a.article_id.is_none() && a.uploaded_by == uploaded_by {
                a.article_id = Some(article_id);
                claimed += 1;
            }
        }
        Ok(claimed)
    }

    async fn purge_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attachment>> {
        self.check_reads()?;
        let mut rows = self.rows.lock().unwrap();
        let (stale, keep): (Vec<_>, Vec<_>) = rows
            .drain(..)
            .partition(|a| a.article_id.is_none() && a.created_at < cutoff);
        *rows = keep;
        Ok(stale)
    }

    async fn stored_filenames(&self) -> Result<HashSet<String>> {
        self.check_reads()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.stored_filename.clone())
            .collect())
    }
}

/// Wraps a backend and fails every delete.
pub struct FailingDeleteBackend {
    inner: Arc<dyn StorageBackend>,
}

impl FailingDeleteBackend {
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for FailingDeleteBackend {
    async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        self.inner.write(name, data).await
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.inner.read(name).await
    }

    async fn delete(&self, _name: &str) -> Result<()> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only storage",
        )))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }

    async fn list(&self) -> Result<Vec<StoredFile>> {
        self.inner.list().await
    }
}
