use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::STAGING_STORAGE;
use crate::error::AppError;

/// What an attachment is for. Decides which field types may receive it and which global size
/// limit applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentRole {
    #[default]
    #[serde(rename = "Attachment")]
    Attachment,
    #[serde(rename = "Inline Attachment")]
    InlineAttachment,
}

impl AttachmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentRole::Attachment => "Attachment",
            AttachmentRole::InlineAttachment => "Inline Attachment",
        }
    }

    /// Field types that may hold an attachment of this role.
    pub fn allowed_field_types(&self) -> &'static [&'static str] {
        match self {
            AttachmentRole::Attachment => &["file", "image", "attachmentMultiple"],
            AttachmentRole::InlineAttachment => &["wysiwyg"],
        }
    }

    pub fn allows_field_type(&self, field_type: &str) -> bool {
        self.allowed_field_types().contains(&field_type)
    }

    /// Parse an optional role; absent means [`AttachmentRole::Attachment`].
    pub fn from_optional(role: Option<&str>) -> Result<Self, AppError> {
        match role {
            None => Ok(AttachmentRole::Attachment),
            Some(value) => value.parse(),
        }
    }
}

impl Display for AttachmentRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Attachment" => Ok(AttachmentRole::Attachment),
            "Inline Attachment" => Ok(AttachmentRole::InlineAttachment),
            other => Err(AppError::BadRequest(format!("Not supported role '{}'", other))),
        }
    }
}

/// Persistent attachment record.
///
/// `size` is the declared size and never changes after creation. While `is_being_uploaded` is
/// true the bytes live in the staging backend and may be shorter than `size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub name: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub role: AttachmentRole,
    pub parent_type: Option<String>,
    pub related_type: Option<String>,
    pub field: Option<String>,
    pub storage: Option<String>,
    pub is_being_uploaded: bool,
    pub source_id: Option<Uuid>,
    pub created_by: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attachment {
    /// A fresh record with a new id and no association.
    pub fn new(role: AttachmentRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            content_type: None,
            size: 0,
            role,
            parent_type: None,
            related_type: None,
            field: None,
            storage: None,
            is_being_uploaded: false,
            source_id: None,
            created_by: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Entity type the attachment is associated with, via either parent or related type.
    pub fn target_entity_type(&self) -> Option<&str> {
        self.parent_type
            .as_deref()
            .or(self.related_type.as_deref())
    }

    pub fn is_staged(&self) -> bool {
        self.storage.as_deref() == Some(STAGING_STORAGE)
    }

    /// Declared size in bytes; negative values stored by foreign writers count as zero.
    pub fn declared_size(&self) -> u64 {
        u64::try_from(self.size).unwrap_or(0)
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Attachment {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Attachment {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            content_type: row.try_get("content_type")?,
            size: row.try_get("size")?,
            role: row.try_get::<String, _>("role")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse role: {}", e).into())
            })?,
            parent_type: row.try_get("parent_type")?,
            related_type: row.try_get("related_type")?,
            field: row.try_get("field")?,
            storage: row.try_get("storage")?,
            is_being_uploaded: row.try_get("is_being_uploaded")?,
            source_id: row.try_get("source_id")?,
            created_by: row.try_get("created_by")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
