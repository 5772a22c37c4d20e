//! Domain methods for the Attaché API client.

use std::ops::Range;

use anyhow::{Context, Result};
use attache_core::constants::BYTES_PER_MB;
use attache_core::transport::encode_data_url;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiClient, API_PREFIX};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Attachment record as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub size: i64,
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

/// Upload limits in megabytes. Zero means unlimited, or for the chunk size, a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettings {
    pub attachment_upload_max_size: u64,
    pub inline_attachment_upload_max_size: u64,
    pub attachment_upload_chunk_size: u64,
}

/// Where a new attachment goes and what it is.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_type: Option<String>,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl NewAttachment {
    pub fn for_parent(
        parent_type: impl Into<String>,
        field: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            parent_type: Some(parent_type.into()),
            field: field.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// Progress of a chunked upload, reported after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    #[serde(flatten)]
    attachment: &'a NewAttachment,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    is_being_uploaded: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    related_type: Option<&'a str>,
    field: &'a str,
}

impl<'a> TargetBody<'a> {
    fn for_target(target: &'a NewAttachment) -> Self {
        Self {
            id: None,
            url: None,
            parent_type: target.parent_type.as_deref(),
            related_type: target.related_type.as_deref(),
            field: &target.field,
        }
    }
}

/// Byte ranges of `chunk_bytes` each covering `total` bytes; the last range may be shorter.
pub fn chunk_ranges(total: usize, chunk_bytes: usize) -> Vec<Range<usize>> {
    if total == 0 || chunk_bytes == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(chunk_bytes)
        .map(|start| start..(start + chunk_bytes).min(total))
        .collect()
}

fn attachments_path(suffix: &str) -> String {
    format!("{}/attachments{}", API_PREFIX, suffix)
}

impl ApiClient {
    pub async fn upload_settings(&self) -> Result<UploadSettings> {
        self.get(&attachments_path("/settings")).await
    }

    /// Upload a complete file in one request.
    pub async fn create_attachment(
        &self,
        attachment: &NewAttachment,
        contents: &[u8],
    ) -> Result<AttachmentResponse> {
        let body = CreateBody {
            attachment,
            file: Some(encode_data_url(attachment.content_type(), contents)),
            size: None,
            is_being_uploaded: false,
        };
        self.post_json(&attachments_path(""), &body).await
    }

    /// Start a chunked upload of `size` bytes.
    pub async fn initiate_upload(
        &self,
        attachment: &NewAttachment,
        size: u64,
    ) -> Result<AttachmentResponse> {
        let body = CreateBody {
            attachment,
            file: None,
            size: Some(size),
            is_being_uploaded: true,
        };
        self.post_json(&attachments_path(""), &body).await
    }

    pub async fn append_chunk(&self, id: Uuid, content_type: &str, chunk: &[u8]) -> Result<()> {
        let _: bool = self
            .post_text(
                &attachments_path(&format!("/{}/chunks", id)),
                encode_data_url(content_type, chunk),
            )
            .await?;
        Ok(())
    }

    /// Upload a file, chunked by the server's configured chunk size.
    ///
    /// Falls back to a single request when the server does not chunk. `on_progress` runs after
    /// every chunk the server accepts.
    pub async fn upload_chunked<F>(
        &self,
        attachment: &NewAttachment,
        contents: &[u8],
        mut on_progress: F,
    ) -> Result<AttachmentResponse>
    where
        F: FnMut(UploadProgress),
    {
        let settings = self.upload_settings().await?;
        let total = contents.len() as u64;
        let chunk_bytes = settings
            .attachment_upload_chunk_size
            .saturating_mul(BYTES_PER_MB);

        if chunk_bytes == 0 || total == 0 {
            let created = self.create_attachment(attachment, contents).await?;
            on_progress(UploadProgress {
                uploaded_bytes: total,
                total_bytes: total,
            });
            return Ok(created);
        }

        let chunk_bytes = usize::try_from(chunk_bytes).context("Chunk size too large")?;
        let created = self.initiate_upload(attachment, total).await?;

        for range in chunk_ranges(contents.len(), chunk_bytes) {
            let uploaded_bytes = range.end as u64;
            self.append_chunk(created.id, attachment.content_type(), &contents[range])
                .await
                .with_context(|| format!("Chunk upload failed for attachment {}", created.id))?;
            on_progress(UploadProgress {
                uploaded_bytes,
                total_bytes: total,
            });
        }

        Ok(created)
    }

    pub async fn download(&self, id: Uuid) -> Result<Vec<u8>> {
        self.get_bytes(&attachments_path(&format!("/{}/file", id)))
            .await
    }

    /// Duplicate an attachment for another record field.
    pub async fn copy_attachment(
        &self,
        source_id: Uuid,
        target: &NewAttachment,
    ) -> Result<AttachmentResponse> {
        let body = TargetBody {
            id: Some(source_id),
            ..TargetBody::for_target(target)
        };
        self.post_json(&attachments_path("/copy"), &body).await
    }

    /// Have the server fetch an image from `url`.
    pub async fn attachment_from_image_url(
        &self,
        url: &str,
        target: &NewAttachment,
    ) -> Result<AttachmentResponse> {
        let body = TargetBody {
            url: Some(url),
            ..TargetBody::for_target(target)
        };
        self.post_json(&attachments_path("/from-image-url"), &body)
            .await
    }
}
