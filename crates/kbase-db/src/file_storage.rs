//! Attachment file storage.
//!
//! Bytes live in a flat directory under their stored name; metadata lives in
//! the `attachment` table. [`FileStorage`] ties the two together for uploads,
//! downloads and deletes. File removal is always best-effort: a leftover file
//! is reclaimed later by the reconciler, a stuck row is not.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kbase_core::file_safety::{guess_mime, sanitize_filename, stored_filename_for};
use kbase_core::{Attachment, AttachmentRepository, Error, FileRules, NewAttachment, Result};

use crate::reconciler::AttachmentReconciler;

/// A file found in the storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// Storage backend trait for different storage implementations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data under the given name.
    async fn write(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read data stored under the given name.
    async fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Delete data under the given name. Missing files are not an error.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Check if data exists under the given name.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Every regular file in the storage location with its modification time.
    async fn list(&self) -> Result<Vec<StoredFile>>;
}

/// Filesystem storage backend: one flat directory of stored files.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &std::path::Path {
        &self.base_path
    }

    fn full_path(&self, name: &str) -> Result<PathBuf> {
        // Stored names are generated, but never let one escape the directory.
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::InvalidInput(format!("invalid stored filename: {}", name)));
        }
        Ok(self.base_path.join(name))
    }

    /// Create the directory and perform a write/read/delete round trip so
    /// permission problems surface at startup.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", self.base_path, e))?;

        let probe = ".health-check";
        let data = b"storage-health-check";
        self.write(probe, data)
            .await
            .map_err(|e| format!("write probe: {}", e))?;
        let read_back = self
            .read(probe)
            .await
            .map_err(|e| format!("read probe: {}", e))?;
        if read_back != data {
            return Err("read-back mismatch".to_string());
        }
        self.delete(probe)
            .await
            .map_err(|e| format!("delete probe: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(name)?;
        debug!(stored_filename = %name, size = data.len(), "file_storage: write");

        fs::create_dir_all(&self.base_path).await.map_err(|e| {
            warn!(dir = %self.base_path.display(), error = %e, "file_storage: create_dir_all failed");
            e
        })?;

        // Atomic write: temp file + rename
        let temp_path = self.base_path.join(format!("{}.tmp", name));
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "file_storage: File::create failed");
            e
        })?;
        file.write_all(data).await.map_err(|e| {
            warn!(error = %e, "file_storage: write_all failed");
            e
        })?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "file_storage: rename failed");
            e
        })?;

        // rw-r--r--, no execute
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(name)?;
        match fs::read(full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("stored file {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let full_path = self.full_path(name)?;
        match fs::remove_file(full_path).await {
            Ok(()) => Ok(()),
            // Someone else removed it first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let full_path = self.full_path(name)?;
        Ok(fs::try_exists(full_path).await?)
    }

    async fn list(&self) -> Result<Vec<StoredFile>> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Vanished between read_dir and stat.
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let modified = metadata.modified()?;
            files.push(StoredFile {
                name,
                modified: DateTime::<Utc>::from(modified),
            });
        }
        Ok(files)
    }
}

/// An upload on its way into storage.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied filename, sanitized before storage.
    pub filename: String,
    pub data: Vec<u8>,
    /// `None` stores the attachment as pending.
    pub article_id: Option<Uuid>,
    pub uploaded_by: String,
}

/// Attachment rows plus their bytes.
#[derive(Clone)]
pub struct FileStorage {
    attachments: Arc<dyn AttachmentRepository>,
    backend: Arc<dyn StorageBackend>,
    rules: FileRules,
}

impl FileStorage {
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        backend: Arc<dyn StorageBackend>,
        rules: FileRules,
    ) -> Self {
        Self {
            attachments,
            backend,
            rules,
        }
    }

    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        self.backend.clone()
    }

    /// Reconciler over this storage's rows and files.
    pub fn reconciler(&self) -> AttachmentReconciler {
        AttachmentReconciler::new(self.attachments.clone(), self.backend.clone())
    }

    /// Validate, write the bytes, then insert the row.
    ///
    /// Fails with [`Error::InvalidInput`] when the rules reject the file. If
    /// the insert fails the written file is removed again.
    pub async fn store(&self, upload: Upload) -> Result<Attachment> {
        let filename = sanitize_filename(&upload.filename);
        self.rules
            .check(&filename, upload.data.len() as u64)
            .map_err(|rejection| Error::InvalidInput(rejection.to_string()))?;

        let stored_filename = stored_filename_for(&filename);
        self.backend.write(&stored_filename, &upload.data).await?;

        let new = NewAttachment {
            mime_type: guess_mime(&filename),
            filename,
            stored_filename: stored_filename.clone(),
            file_size: upload.data.len() as i64,
            article_id: upload.article_id,
            uploaded_by: upload.uploaded_by,
        };

        match self.attachments.insert(new).await {
            Ok(attachment) => {
                info!(
                    subsystem = "storage",
                    component = "file_storage",
                    op = "store",
                    attachment_id = %attachment.id,
                    pending = attachment.is_pending(),
                    size = attachment.file_size,
                    "Stored attachment"
                );
                Ok(attachment)
            }
            Err(e) => {
                self.remove_files(std::slice::from_ref(&stored_filename)).await;
                Err(e)
            }
        }
    }

    /// Attachment metadata and bytes.
    pub async fn download(&self, id: Uuid) -> Result<(Attachment, Vec<u8>)> {
        let attachment = self
            .attachments
            .fetch(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("attachment {}", id)))?;
        let data = self.backend.read(&attachment.stored_filename).await?;
        Ok((attachment, data))
    }

    /// Delete the row, then the file best-effort.
    pub async fn delete_attachment(&self, id: Uuid) -> Result<Option<Attachment>> {
        let deleted = self.attachments.delete(id).await?;
        if let Some(ref attachment) = deleted {
            self.remove_files(std::slice::from_ref(&attachment.stored_filename))
                .await;
        }
        Ok(deleted)
    }

    /// Remove files, logging failures. Returns how many could not be removed.
    pub async fn remove_files(&self, names: &[String]) -> usize {
        let mut failures = 0;
        for name in names {
            if let Err(e) = self.backend.delete(name).await {
                failures += 1;
                warn!(
                    subsystem = "storage",
                    component = "file_storage",
                    op = "remove_file",
                    stored_filename = %name,
                    error = %e,
                    "Failed to remove attachment file"
                );
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_filesystem_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        backend.write("abc.txt", b"hello").await.unwrap();
        assert!(backend.exists("abc.txt").await.unwrap());
        assert_eq!(backend.read("abc.txt").await.unwrap(), b"hello");

        backend.delete("abc.txt").await.unwrap();
        assert!(!backend.exists("abc.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.delete("never-written.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let err = backend.read("missing.png").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.write("a.bin", b"xyz").await.unwrap();

        let names: Vec<String> = backend
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.bin".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_files_are_not_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.write("a.txt", b"x").await.unwrap();
        let mode = std::fs::metadata(dir.path().join("a.txt"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_tolerates_missing_base() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("not-created-yet"));
        assert!(backend.list().await.unwrap().is_empty());

        let backend = FilesystemBackend::new(dir.path());
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        backend.write("f.txt", b"1").await.unwrap();
        let files = backend.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "f.txt");
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_names() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        assert!(backend.write("../escape.txt", b"x").await.is_err());
        assert!(backend.delete("..").await.is_err());
    }

    fn storage(dir: &TempDir) -> (Arc<crate::testing::InMemoryAttachments>, FileStorage) {
        let repo = Arc::new(crate::testing::InMemoryAttachments::default());
        let backend = Arc::new(FilesystemBackend::new(dir.path()));
        let storage = FileStorage::new(repo.clone(), backend, FileRules::new("png,txt", 16));
        (repo, storage)
    }

    #[tokio::test]
    async fn test_store_sanitizes_name_and_guesses_mime() {
        let dir = TempDir::new().unwrap();
        let (_repo, storage) = storage(&dir);
        let att = storage
            .store(Upload {
                filename: "../../Screen Shot.PNG".to_string(),
                data: b"png".to_vec(),
                article_id: None,
                uploaded_by: "alice".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(att.filename, "Screen Shot.PNG");
        assert!(att.stored_filename.ends_with(".png"));
        assert_eq!(att.mime_type, "image/png");
        assert_eq!(att.file_size, 3);
        assert!(att.is_pending());

        let (meta, bytes) = storage.download(att.id).await.unwrap();
        assert_eq!(meta.id, att.id);
        assert_eq!(bytes, b"png");
    }

    #[tokio::test]
    async fn test_store_rejects_before_writing() {
        let dir = TempDir::new().unwrap();
        let (_repo, storage) = storage(&dir);
        for (name, size) in [("tool.exe", 3), ("big.txt", 17)] {
            let err = storage
                .store(Upload {
                    filename: name.to_string(),
                    data: vec![b'x'; size],
                    article_id: None,
                    uploaded_by: "alice".to_string(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{}", name);
        }
        assert!(storage.backend().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_attachment_removes_row_and_file() {
        let dir = TempDir::new().unwrap();
        let (repo, storage) = storage(&dir);
        let att = storage
            .store(Upload {
                filename: "a.txt".to_string(),
                data: b"hi".to_vec(),
                article_id: Some(Uuid::now_v7()),
                uploaded_by: "alice".to_string(),
            })
            .await
            .unwrap();

        let deleted = storage.delete_attachment(att.id).await.unwrap();
        assert_eq!(deleted.map(|a| a.id), Some(att.id));
        assert!(repo.get(att.id).is_none());
        assert!(!storage.backend().exists(&att.stored_filename).await.unwrap());

        assert!(storage.delete_attachment(att.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_download_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (_repo, storage) = storage(&dir);
        let err = storage.download(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_validate_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("uploads"));
        backend.validate().await.unwrap();
        assert!(backend.list().await.unwrap().is_empty());
    }
}
