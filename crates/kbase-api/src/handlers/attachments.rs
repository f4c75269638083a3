//! Attachment upload, download and delete routes.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use kbase_core::file_safety::is_image;
use kbase_core::{ArticleRepository, Attachment, AttachmentRepository, Error};
use kbase_db::Upload;

use super::visible_article;
use crate::audit::AuditEvent;
use crate::extractors::CurrentUser;
use crate::{ApiError, AppState};

/// Multipart field carrying uploaded files.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct RejectedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct UploadReport {
    pub stored: Vec<Attachment>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Serialize)]
pub struct PendingUpload {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
    pub markdown: String,
}

impl PendingUpload {
    fn new(attachment: &Attachment) -> Self {
        let url = download_url(attachment.id);
        let markdown = if is_image(&attachment.filename) {
            format!("![{}]({})", attachment.filename, url)
        } else {
            format!("[{}]({})", attachment.filename, url)
        };
        Self {
            id: attachment.id,
            filename: attachment.filename.clone(),
            url,
            markdown,
        }
    }
}

pub fn download_url(id: Uuid) -> String {
    format!("/attachments/{}/download", id)
}

/// Read every `file` part. Parts without a filename are skipped.
async fn read_files(multipart: &mut Multipart) -> Result<Vec<(String, Vec<u8>)>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await?;
        files.push((filename, data.to_vec()));
    }
    Ok(files)
}

/// Attach files to an article. Each file is validated on its own; rejected
/// files are reported without failing the others.
pub async fn upload_to_article(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(article_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadReport>, ApiError> {
    let user_id = user.user_id();
    let article = visible_article(&state, article_id, user_id).await?;
    if !article.is_authored_by(user_id) {
        state.audit.record(AuditEvent::UnauthorizedUpload {
            user: user_id,
            article_id,
            owner: &article.author,
        });
        return Err(ApiError::Forbidden(
            "Only the author can add attachments".to_string(),
        ));
    }

    let storage = state.storage()?;
    let mut report = UploadReport {
        stored: Vec::new(),
        rejected: Vec::new(),
    };

    for (filename, data) in read_files(&mut multipart).await? {
        let upload = Upload {
            filename: filename.clone(),
            data,
            article_id: Some(article_id),
            uploaded_by: user_id.to_string(),
        };
        match storage.store(upload).await {
            Ok(attachment) => {
                state.audit.record(AuditEvent::AttachmentUploaded {
                    user: user_id,
                    attachment_id: attachment.id,
                    filename: &attachment.filename,
                    pending: false,
                });
                report.stored.push(attachment);
            }
            Err(Error::InvalidInput(reason)) => {
                report.rejected.push(RejectedFile { filename, reason });
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Json(report))
}

/// Inline editor upload. The file stays pending until the caller saves an
/// article, and is purged if that never happens.
pub async fn upload_pending(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PendingUpload>), ApiError> {
    let user_id = user.user_id();
    let storage = state.storage()?;

    let (filename, data) = read_files(&mut multipart)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ApiError::BadRequest("No file uploaded. Use field name 'file'.".to_string())
        })?;

    let attachment = storage
        .store(Upload {
            filename,
            data,
            article_id: None,
            uploaded_by: user_id.to_string(),
        })
        .await?;

    state.audit.record(AuditEvent::AttachmentUploaded {
        user: user_id,
        attachment_id: attachment.id,
        filename: &attachment.filename,
        pending: true,
    });

    Ok((StatusCode::CREATED, Json(PendingUpload::new(&attachment))))
}

pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (attachment, data) = state.storage()?.download(id).await?;

    let headers = [
        (header::CONTENT_TYPE, attachment.mime_type.clone()),
        (
            header::CONTENT_DISPOSITION,
            content_disposition(&attachment.filename),
        ),
    ];

    Ok((headers, data))
}

/// Allowed for the uploader or, once linked, the article's author.
pub async fn delete_attachment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.user_id();
    let attachment = state
        .db
        .attachments
        .fetch(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Attachment {} not found", id)))?;

    let article_author = match attachment.article_id {
        Some(article_id) => state
            .db
            .articles
            .fetch(article_id)
            .await?
            .map(|article| article.author),
        None => None,
    };

    if !attachment.can_be_deleted_by(user_id, article_author.as_deref()) {
        state.audit.record(AuditEvent::UnauthorizedDelete {
            user: user_id,
            resource: "attachment",
            id,
            owner: article_author.as_deref().unwrap_or(&attachment.uploaded_by),
        });
        return Err(ApiError::Forbidden(
            "You cannot delete this attachment".to_string(),
        ));
    }

    if state.storage()?.delete_attachment(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Attachment {} not found", id)));
    }
    state.audit.record(AuditEvent::AttachmentDeleted {
        user: user_id,
        attachment_id: id,
    });

    Ok(StatusCode::NO_CONTENT)
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// name percent-encoded as UTF-8.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attachment(filename: &str) -> Attachment {
        Attachment {
            id: Uuid::nil(),
            filename: filename.to_string(),
            stored_filename: "x".to_string(),
            file_size: 1,
            mime_type: "application/octet-stream".to_string(),
            article_id: None,
            uploaded_by: "alice".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_markdown_for_image_and_document() {
        let image = PendingUpload::new(&attachment("cat.PNG"));
        assert_eq!(
            image.markdown,
            "![cat.PNG](/attachments/00000000-0000-0000-0000-000000000000/download)"
        );

        let doc = PendingUpload::new(&attachment("notes.pdf"));
        assert!(doc.markdown.starts_with("[notes.pdf]("));
    }

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report 1.pdf"),
            "attachment; filename=\"report 1.pdf\"; filename*=UTF-8''report%201.pdf"
        );
    }

    #[test]
    fn test_content_disposition_non_ascii_and_quotes() {
        let value = content_disposition("a\"é.txt");
        assert!(value.starts_with("attachment; filename=\"a__.txt\""));
        assert!(value.ends_with("filename*=UTF-8''a%22%C3%A9.txt"));
        assert!(axum::http::HeaderValue::from_str(&value).is_ok());
    }
}
