//! Upload size limits
//!
//! `Attachment` uploads prefer the target field's `maxFileSize` and fall back to the global
//! attachment limit. `Inline Attachment` uploads only use the global inline limit. All limits
//! are configured in megabytes and zero means unlimited.

use std::sync::Arc;

use attache_core::constants::BYTES_PER_MB;
use attache_core::models::{Attachment, AttachmentRole};
use attache_core::{AppError, SchemaMetadata, UploadLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimit {
    Unlimited,
    Bytes(u64),
}

impl SizeLimit {
    /// Zero, negative and non-finite values mean unlimited.
    pub fn from_megabytes(mb: f64) -> Self {
        if mb.is_finite() && mb > 0.0 {
            SizeLimit::Bytes((mb * BYTES_PER_MB as f64) as u64)
        } else {
            SizeLimit::Unlimited
        }
    }

    pub fn max_bytes(&self) -> Option<u64> {
        match self {
            SizeLimit::Unlimited => None,
            SizeLimit::Bytes(bytes) => Some(*bytes),
        }
    }

    pub fn allows(&self, size: u64) -> bool {
        match self.max_bytes() {
            Some(max) => size <= max,
            None => true,
        }
    }

    /// Fail with [`AppError::SizeLimitExceeded`] when `size` is above the limit.
    pub fn check(&self, size: u64) -> Result<(), AppError> {
        match self {
            SizeLimit::Bytes(max) if size > *max => Err(AppError::SizeLimitExceeded {
                max_mb: *max as f64 / BYTES_PER_MB as f64,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct SizeLimitResolver {
    metadata: Arc<dyn SchemaMetadata>,
    limits: UploadLimits,
}

impl SizeLimitResolver {
    pub fn new(metadata: Arc<dyn SchemaMetadata>, limits: UploadLimits) -> Self {
        Self { metadata, limits }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    pub fn resolve(
        &self,
        role: AttachmentRole,
        entity_type: Option<&str>,
        field: Option<&str>,
    ) -> SizeLimit {
        match role {
            AttachmentRole::Attachment => {
                let field_mb = entity_type
                    .zip(field)
                    .and_then(|(entity_type, field)| {
                        self.metadata.field_max_file_size_mb(entity_type, field)
                    });
                SizeLimit::from_megabytes(
                    field_mb.unwrap_or(self.limits.attachment_upload_max_size_mb as f64),
                )
            }
            AttachmentRole::InlineAttachment => {
                SizeLimit::from_megabytes(self.limits.inline_attachment_upload_max_size_mb as f64)
            }
        }
    }

    /// A limit no accepted upload exceeds, whatever its role or target field.
    pub fn upper_bound(&self) -> SizeLimit {
        let attachment_mb = self.limits.attachment_upload_max_size_mb;
        let inline_mb = self.limits.inline_attachment_upload_max_size_mb;
        if attachment_mb == 0 || inline_mb == 0 {
            return SizeLimit::Unlimited;
        }
        let global_mb = attachment_mb.max(inline_mb) as f64;
        let field_mb = self.metadata.largest_max_file_size_mb().unwrap_or(0.0);
        SizeLimit::from_megabytes(global_mb.max(field_mb))
    }

    /// Limit for an existing record, from its stored role and association.
    pub fn for_record(&self, attachment: &Attachment) -> SizeLimit {
        self.resolve(
            attachment.role,
            attachment.target_entity_type(),
            attachment.field.as_deref(),
        )
    }
}
