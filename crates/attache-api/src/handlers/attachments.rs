//! Attachment upload handlers.
//!
//! `POST /attachments` covers both single-shot uploads (`file` carries the whole payload) and
//! the initiation of a chunked upload (`isBeingUploaded: true` with the declared `size`). Chunks
//! are then posted as raw `data:<type>;base64,<...>` bodies to `/attachments/{id}/chunks`.

use std::sync::Arc;

use attache_core::models::Attachment;
use attache_core::AppError;
use attache_services::{
    ChunkedUploadRequest, CopyRequest, FetchFromUrlRequest, SingleShotUpload, UploadSettings,
    UploadTarget,
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::actor::Actor;
use crate::constants::DEFAULT_CONTENT_TYPE;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

/// Body of `POST /attachments`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttachmentRequest {
    pub parent_type: Option<String>,
    pub related_type: Option<String>,
    pub field: Option<String>,
    /// `Attachment` (default) or `Inline Attachment`
    pub role: Option<String>,
    pub name: Option<String>,
    /// MIME type
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    /// Total size in bytes; required when `isBeingUploaded` is set
    pub size: Option<u64>,
    pub storage: Option<String>,
    /// `<prefix>,<base64>` payload of a single-shot upload
    pub file: Option<String>,
    #[serde(default)]
    pub is_being_uploaded: bool,
}

impl CreateAttachmentRequest {
    fn target(&self) -> UploadTarget {
        UploadTarget {
            parent_type: self.parent_type.clone(),
            related_type: self.related_type.clone(),
            field: self.field.clone(),
        }
    }
}

/// Body of `POST /attachments/copy`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CopyAttachmentRequest {
    /// Source attachment
    pub id: Option<Uuid>,
    pub parent_type: Option<String>,
    pub related_type: Option<String>,
    pub field: Option<String>,
}

/// Body of `POST /attachments/from-image-url`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FromImageUrlRequest {
    pub url: Option<String>,
    pub parent_type: Option<String>,
    pub related_type: Option<String>,
    pub field: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub size: i64,
    #[schema(value_type = String, example = "Attachment")]
    pub role: String,
    pub parent_type: Option<String>,
    pub related_type: Option<String>,
    pub field: Option<String>,
    pub storage: Option<String>,
    pub is_being_uploaded: bool,
    pub source_id: Option<Uuid>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Attachment> for AttachmentResponse {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            name: attachment.name,
            content_type: attachment.content_type,
            size: attachment.size,
            role: attachment.role.to_string(),
            parent_type: attachment.parent_type,
            related_type: attachment.related_type,
            field: attachment.field,
            storage: attachment.storage,
            is_being_uploaded: attachment.is_being_uploaded,
            source_id: attachment.source_id,
            created_by: attachment.created_by,
            created_at: attachment.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettingsResponse {
    /// Megabytes; zero means unlimited
    pub attachment_upload_max_size: u64,
    /// Megabytes; zero means unlimited
    pub inline_attachment_upload_max_size: u64,
    /// Megabytes; zero means upload in a single request
    pub attachment_upload_chunk_size: u64,
}

impl From<UploadSettings> for UploadSettingsResponse {
    fn from(settings: UploadSettings) -> Self {
        Self {
            attachment_upload_max_size: settings.attachment_upload_max_size,
            inline_attachment_upload_max_size: settings.inline_attachment_upload_max_size,
            attachment_upload_chunk_size: settings.attachment_upload_chunk_size,
        }
    }
}

fn created(attachment: Attachment) -> (StatusCode, Json<AttachmentResponse>) {
    (StatusCode::CREATED, Json(AttachmentResponse::from(attachment)))
}

/// Create an attachment, or start a chunked upload
#[utoipa::path(
    post,
    path = "/api/v1/attachments",
    tag = "attachments",
    request_body = CreateAttachmentRequest,
    params(
        ("X-Actor-Id" = String, Header, description = "Authenticated actor"),
    ),
    responses(
        (status = 201, description = "Attachment created", body = AttachmentResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 422, description = "Field missing or of the wrong type", body = ErrorResponse)
    )
)]
pub async fn create_attachment(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateAttachmentRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let target = request.target();

    let attachment = if request.is_being_uploaded {
        state
            .attachments
            .initiate_chunked_upload(
                &actor,
                ChunkedUploadRequest {
                    target,
                    role: request.role,
                    name: request.name,
                    content_type: request.content_type,
                    size: request.size.unwrap_or(0),
                },
            )
            .await?
    } else {
        state
            .attachments
            .create_single_shot(
                &actor,
                SingleShotUpload {
                    target,
                    role: request.role,
                    name: request.name,
                    content_type: request.content_type,
                    storage: request.storage,
                    file: request.file,
                },
            )
            .await?
    };

    Ok(created(attachment))
}

/// Append a chunk to an upload in progress
#[utoipa::path(
    post,
    path = "/api/v1/attachments/{id}/chunks",
    tag = "attachments",
    params(
        ("id" = Uuid, Path, description = "Attachment ID"),
        ("X-Actor-Id" = String, Header, description = "Authenticated actor"),
    ),
    request_body(content = String, description = "data:<type>;base64,<chunk>", content_type = "text/plain"),
    responses(
        (status = 200, description = "Chunk appended"),
        (status = 400, description = "Malformed chunk", body = ErrorResponse),
        (status = 403, description = "Upload not accepting chunks", body = ErrorResponse),
        (status = 404, description = "Attachment not found", body = ErrorResponse),
        (status = 409, description = "Chunks exceed the declared size", body = ErrorResponse)
    )
)]
pub async fn append_chunk(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let chunk = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("Bad file data.".to_string()))?;

    state.attachments.append_chunk(&actor, id, chunk).await?;

    Ok(Json(true))
}

/// Download the bytes of an attachment
#[utoipa::path(
    get,
    path = "/api/v1/attachments/{id}/file",
    tag = "attachments",
    params(
        ("id" = Uuid, Path, description = "Attachment ID"),
        ("X-Actor-Id" = String, Header, description = "Authenticated actor"),
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 404, description = "Attachment not found", body = ErrorResponse)
    )
)]
pub async fn get_file(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpAppError> {
    let file = state.attachments.get_file_data(&actor, id).await?;

    let body_stream = file.stream.map(|result| {
        result.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            file.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
        )
        .header(header::CONTENT_LENGTH, file.size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&file.name))
        .body(Body::from_stream(body_stream))
        .map_err(|e| {
            tracing::error!(error = %e, attachment_id = %id, "Failed to build file response");
            AppError::Internal(e.to_string())
        })?;

    Ok(response)
}

/// `attachment; filename="..."` with characters that would break the header replaced.
fn content_disposition(name: &str) -> String {
    let file_name: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .filter(char::is_ascii)
        .collect();
    format!("attachment; filename=\"{}\"", file_name)
}

/// Duplicate an attachment for another record field
#[utoipa::path(
    post,
    path = "/api/v1/attachments/copy",
    tag = "attachments",
    request_body = CopyAttachmentRequest,
    params(
        ("X-Actor-Id" = String, Header, description = "Authenticated actor"),
    ),
    responses(
        (status = 201, description = "Copy created", body = AttachmentResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 404, description = "Source not found", body = ErrorResponse)
    )
)]
pub async fn copy_attachment(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CopyAttachmentRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let attachment = state
        .attachments
        .duplicate_for_target(
            &actor,
            CopyRequest {
                source_id: request.id,
                target: UploadTarget {
                    parent_type: request.parent_type,
                    related_type: request.related_type,
                    field: request.field,
                },
            },
        )
        .await?;

    Ok(created(attachment))
}

/// Import an image from a remote URL
#[utoipa::path(
    post,
    path = "/api/v1/attachments/from-image-url",
    tag = "attachments",
    request_body = FromImageUrlRequest,
    params(
        ("X-Actor-Id" = String, Header, description = "Authenticated actor"),
    ),
    responses(
        (status = 201, description = "Attachment created", body = AttachmentResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 422, description = "URL could not be fetched as an image", body = ErrorResponse)
    )
)]
pub async fn create_from_image_url(
    Actor(actor): Actor,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<FromImageUrlRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let attachment = state
        .attachments
        .fetch_from_url(
            &actor,
            FetchFromUrlRequest {
                url: request.url,
                target: UploadTarget {
                    parent_type: request.parent_type,
                    related_type: request.related_type,
                    field: request.field,
                },
            },
        )
        .await?;

    Ok(created(attachment))
}

/// Limits clients need to plan an upload
#[utoipa::path(
    get,
    path = "/api/v1/attachments/settings",
    tag = "attachments",
    responses(
        (status = 200, description = "Upload settings", body = UploadSettingsResponse)
    )
)]
pub async fn upload_settings(State(state): State<Arc<AppState>>) -> Json<UploadSettingsResponse> {
    Json(state.attachments.settings().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_escapes_quotes() {
        assert_eq!(
            content_disposition("say \"hi\".txt"),
            "attachment; filename=\"say _hi_.txt\""
        );
        assert_eq!(content_disposition("a\r\nb"), "attachment; filename=\"a__b\"");
    }

    #[test]
    fn test_create_request_uses_wire_names() {
        let request: CreateAttachmentRequest = serde_json::from_value(serde_json::json!({
            "parentType": "Account",
            "field": "attachments",
            "type": "text/plain",
            "size": 300,
            "isBeingUploaded": true
        }))
        .unwrap();
        assert!(request.is_being_uploaded);
        assert_eq!(request.content_type.as_deref(), Some("text/plain"));
        assert_eq!(request.size, Some(300));
        assert_eq!(request.target().parent_type.as_deref(), Some("Account"));
    }
}
