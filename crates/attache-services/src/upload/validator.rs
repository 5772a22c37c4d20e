//! Upload target validation
//!
//! Resolves the entity field an upload is aimed at, then checks its type, the role, the
//! actor's permission and the role's size limit.

use std::sync::Arc;

use attache_core::constants::{ADMIN_INLINE_ENTITY_TYPES, SETTINGS_ENTITY_TYPE};
use attache_core::models::AttachmentRole;
use attache_core::{AccessControl, Action, ActorContext, AppError, SchemaMetadata, UploadLimits};

use super::size_limit::{SizeLimit, SizeLimitResolver};

/// Checks that an actor may attach content of a given role to an entity field.
#[derive(Clone)]
pub struct UploadValidator {
    metadata: Arc<dyn SchemaMetadata>,
    acl: Arc<dyn AccessControl>,
    size_limits: SizeLimitResolver,
}

impl UploadValidator {
    pub fn new(
        metadata: Arc<dyn SchemaMetadata>,
        acl: Arc<dyn AccessControl>,
        limits: UploadLimits,
    ) -> Self {
        let size_limits = SizeLimitResolver::new(metadata.clone(), limits);
        Self {
            metadata,
            acl,
            size_limits,
        }
    }

    pub fn size_limits(&self) -> &SizeLimitResolver {
        &self.size_limits
    }

    /// Field existence, field type and access checks for an upload target.
    ///
    /// Administrators uploading inline content to one of [`ADMIN_INLINE_ENTITY_TYPES`] skip all
    /// three checks. Administrators targeting [`SETTINGS_ENTITY_TYPE`] skip only the access check.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id, role = %role))]
    pub async fn check_target(
        &self,
        actor: &ActorContext,
        entity_type: &str,
        field: &str,
        role: AttachmentRole,
    ) -> Result<(), AppError> {
        if actor.is_admin
            && role == AttachmentRole::InlineAttachment
            && ADMIN_INLINE_ENTITY_TYPES.contains(&entity_type)
        {
            tracing::debug!("Administrative inline upload, field checks skipped");
            return Ok(());
        }

        let field_type = self.metadata.field_type(entity_type, field).ok_or_else(|| {
            AppError::FieldNotFound {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            }
        })?;

        if !role.allows_field_type(&field_type) {
            return Err(AppError::FieldTypeNotAllowed {
                field_type,
                role: role.to_string(),
            });
        }

        if actor.is_admin && entity_type == SETTINGS_ENTITY_TYPE {
            return Ok(());
        }

        let may_write = self
            .acl
            .has_capability(actor, entity_type, Action::Create)
            .await
            || self
                .acl
                .has_capability(actor, entity_type, Action::Edit)
                .await;
        if !may_write {
            return Err(AppError::Forbidden(format!("No access to {}.", entity_type)));
        }

        if self
            .acl
            .forbidden_fields(actor, entity_type, Action::Edit)
            .await
            .contains(field)
        {
            return Err(AppError::Forbidden(format!(
                "No access to field '{}'.",
                field
            )));
        }

        Ok(())
    }

    /// Target checks followed by the size check for a payload of `size` bytes.
    pub async fn validate(
        &self,
        actor: &ActorContext,
        entity_type: &str,
        field: &str,
        role: AttachmentRole,
        size: u64,
    ) -> Result<SizeLimit, AppError> {
        self.check_target(actor, entity_type, field, role).await?;
        let limit = self
            .size_limits
            .resolve(role, Some(entity_type), Some(field));
        limit.check(size)?;
        Ok(limit)
    }
}
