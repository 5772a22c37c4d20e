use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use attache_core::constants::STAGING_STORAGE;
use attache_core::models::Attachment;
use attache_core::AppError;

use crate::store_traits::AttachmentStore;

const ATTACHMENT_COLUMNS: &str = r#"
    id,
    name,
    content_type,
    size,
    role,
    parent_type,
    related_type,
    field,
    storage,
    is_being_uploaded,
    source_id,
    created_by,
    version,
    created_at,
    updated_at
"#;

#[derive(Clone)]
pub struct AttachmentRepository {
    pool: PgPool,
}

impl AttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get an attachment by ID
    #[tracing::instrument(skip(self))]
    pub async fn get_attachment(&self, id: Uuid) -> Result<Option<Attachment>, AppError> {
        let attachment = sqlx::query_as::<Postgres, Attachment>(&format!(
            "SELECT {} FROM attachments WHERE id = $1",
            ATTACHMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attachment)
    }

    /// Insert a new attachment record
    #[tracing::instrument(skip(self, attachment), fields(attachment_id = %attachment.id))]
    pub async fn create_attachment(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        let created = sqlx::query_as::<Postgres, Attachment>(&format!(
            r#"
            INSERT INTO attachments (
                id, name, content_type, size, role, parent_type, related_type, field,
                storage, is_being_uploaded, source_id, created_by, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1, NOW(), NOW())
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(attachment.id)
        .bind(&attachment.name)
        .bind(&attachment.content_type)
        .bind(attachment.size)
        .bind(attachment.role.as_str())
        .bind(&attachment.parent_type)
        .bind(&attachment.related_type)
        .bind(&attachment.field)
        .bind(&attachment.storage)
        .bind(attachment.is_being_uploaded)
        .bind(attachment.source_id)
        .bind(&attachment.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                attachment_id = %attachment.id,
                "Failed to insert attachment into database"
            );
            AppError::from(e)
        })?;

        tracing::debug!(
            attachment_id = %created.id,
            role = %created.role,
            size_bytes = created.size,
            is_being_uploaded = created.is_being_uploaded,
            "Attachment created"
        );

        Ok(created)
    }

    /// Update the mutable columns of an attachment if its version is unchanged
    ///
    /// `size`, `role` and the association are fixed at creation and are not written here.
    #[tracing::instrument(skip(self, attachment), fields(attachment_id = %attachment.id, version = attachment.version))]
    pub async fn update_attachment(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        let updated = sqlx::query_as::<Postgres, Attachment>(&format!(
            r#"
            UPDATE attachments
            SET name = $3,
                content_type = $4,
                storage = $5,
                is_being_uploaded = $6,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        ))
        .bind(attachment.id)
        .bind(attachment.version)
        .bind(&attachment.name)
        .bind(&attachment.content_type)
        .bind(&attachment.storage)
        .bind(attachment.is_being_uploaded)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(record) => Ok(record),
            None => {
                tracing::warn!(
                    attachment_id = %attachment.id,
                    expected_version = attachment.version,
                    "Attachment update lost an optimistic concurrency race"
                );
                Err(AppError::VersionConflict(attachment.id.to_string()))
            }
        }
    }
}

impl AttachmentRepository {
    /// Completed uploads still in staging whose last update is not newer than `updated_before`
    #[tracing::instrument(skip(self))]
    pub async fn list_completed_in_staging(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<Postgres, Uuid>(
            r#"
            SELECT id FROM attachments
            WHERE NOT is_being_uploaded
              AND storage = $1
              AND updated_at <= $2
            ORDER BY updated_at
            LIMIT $3
            "#,
        )
        .bind(STAGING_STORAGE)
        .bind(updated_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl AttachmentStore for AttachmentRepository {
    async fn load(&self, id: Uuid) -> Result<Option<Attachment>, AppError> {
        self.get_attachment(id).await
    }

    async fn insert(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        self.create_attachment(attachment).await
    }

    async fn save(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        self.update_attachment(attachment).await
    }

    async fn awaiting_relocation(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        self.list_completed_in_staging(updated_before, limit).await
    }
}
