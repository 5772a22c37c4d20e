//! Attachment service
//!
//! The operations exposed to the HTTP layer: single-shot upload, chunked upload (initiate and
//! append), file download, duplication for a new target and import from a remote image URL.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use attache_core::constants::{ATTACHMENT_ENTITY_TYPE, STAGING_STORAGE};
use attache_core::models::{Attachment, AttachmentRole};
use attache_core::transport::decode_single_shot;
use attache_core::{
    AccessControl, Action, ActorContext, AppError, SchemaMetadata, UploadLimits, UrlFetchConfig,
};
use attache_db::AttachmentStore;
use attache_storage::{object_key, ByteStream, Storage, StorageRegistry};
use attache_worker::TaskScheduler;

use super::chunk::ChunkAccumulator;
use super::fetch::RemoteImageFetcher;
use super::relocation::{RelocationScheduler, Relocator};
use super::size_limit::SizeLimit;
use super::validator::UploadValidator;

/// Collaborators of the upload core, built once at startup.
#[derive(Clone)]
pub struct UploadContext {
    pub store: Arc<dyn AttachmentStore>,
    pub storage: Arc<StorageRegistry>,
    pub metadata: Arc<dyn SchemaMetadata>,
    pub acl: Arc<dyn AccessControl>,
    pub scheduler: Arc<dyn TaskScheduler>,
    pub limits: UploadLimits,
    pub url_fetch: UrlFetchConfig,
}

/// Where an attachment will be attached: a field on an entity type, reached either as the
/// record's parent or through a generic relation. The parent type wins when both are given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadTarget {
    pub parent_type: Option<String>,
    pub related_type: Option<String>,
    pub field: Option<String>,
}

impl UploadTarget {
    pub fn parent(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            parent_type: Some(entity_type.into()),
            related_type: None,
            field: Some(field.into()),
        }
    }

    pub fn related(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            parent_type: None,
            related_type: Some(entity_type.into()),
            field: Some(field.into()),
        }
    }

    /// Entity type and field, both required.
    fn resolve(&self) -> Result<(&str, &str), AppError> {
        let entity_type = non_empty(self.parent_type.as_deref())
            .or_else(|| non_empty(self.related_type.as_deref()));
        match (entity_type, non_empty(self.field.as_deref())) {
            (Some(entity_type), Some(field)) => Ok((entity_type, field)),
            _ => Err(AppError::BadRequest(
                "Params 'field' and 'parentType' or 'relatedType' are required.".to_string(),
            )),
        }
    }

    fn associate(&self, attachment: &mut Attachment) {
        if let Some(parent_type) = non_empty(self.parent_type.as_deref()) {
            attachment.parent_type = Some(parent_type.to_string());
            attachment.related_type = None;
        } else {
            attachment.parent_type = None;
            attachment.related_type = non_empty(self.related_type.as_deref()).map(str::to_string);
        }
        attachment.field = non_empty(self.field.as_deref()).map(str::to_string);
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct SingleShotUpload {
    pub target: UploadTarget,
    pub role: Option<String>,
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub storage: Option<String>,
    /// `<prefix>,<base64>`
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkedUploadRequest {
    pub target: UploadTarget,
    pub role: Option<String>,
    pub name: Option<String>,
    pub content_type: Option<String>,
    /// Total bytes the chunks will add up to.
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CopyRequest {
    pub source_id: Option<Uuid>,
    pub target: UploadTarget,
}

#[derive(Debug, Clone, Default)]
pub struct FetchFromUrlRequest {
    pub url: Option<String>,
    pub target: UploadTarget,
}

/// Bytes of an attachment with what a download response needs.
pub struct FileData {
    pub name: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub stream: ByteStream,
}

/// Limits clients use to plan uploads, in megabytes (zero means unlimited or no chunking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettings {
    pub attachment_upload_max_size: u64,
    pub inline_attachment_upload_max_size: u64,
    pub attachment_upload_chunk_size: u64,
}

#[derive(Clone)]
pub struct AttachmentService {
    store: Arc<dyn AttachmentStore>,
    storage: Arc<StorageRegistry>,
    acl: Arc<dyn AccessControl>,
    validator: UploadValidator,
    chunks: ChunkAccumulator,
    fetcher: RemoteImageFetcher,
    relocator: Relocator,
}

impl AttachmentService {
    pub fn new(context: UploadContext) -> Result<Self, AppError> {
        let validator =
            UploadValidator::new(context.metadata.clone(), context.acl.clone(), context.limits);
        let chunks = ChunkAccumulator::new(
            context.store.clone(),
            context.storage.staging(),
            context.acl.clone(),
            validator.size_limits().clone(),
            RelocationScheduler::new(context.scheduler.clone()),
        );
        let fetcher = RemoteImageFetcher::new(context.url_fetch.clone())?;
        let relocator = Relocator::new(context.store.clone(), context.storage.clone());

        Ok(Self {
            store: context.store,
            storage: context.storage,
            acl: context.acl,
            validator,
            chunks,
            fetcher,
            relocator,
        })
    }

    pub fn relocator(&self) -> &Relocator {
        &self.relocator
    }

    pub fn settings(&self) -> UploadSettings {
        let limits = self.validator.size_limits().limits();
        UploadSettings {
            attachment_upload_max_size: limits.attachment_upload_max_size_mb,
            inline_attachment_upload_max_size: limits.inline_attachment_upload_max_size_mb,
            attachment_upload_chunk_size: limits.attachment_upload_chunk_size_mb,
        }
    }

    /// Largest upload any role or field accepts.
    pub fn upload_ceiling(&self) -> SizeLimit {
        self.validator.size_limits().upper_bound()
    }

    /// Create an attachment from a complete payload.
    #[tracing::instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn create_single_shot(
        &self,
        actor: &ActorContext,
        request: SingleShotUpload,
    ) -> Result<Attachment, AppError> {
        let file = request
            .file
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("No file contents.".to_string()))?;
        let (entity_type, field) = request.target.resolve()?;
        let role = AttachmentRole::from_optional(request.role.as_deref())?;
        let contents = decode_single_shot(file)?;

        self.require_create(actor).await?;
        self.validator
            .validate(actor, entity_type, field, role, contents.len() as u64)
            .await?;

        let mut attachment = Attachment::new(role);
        attachment.name = request.name.clone().unwrap_or_default();
        attachment.content_type = request.content_type.clone();
        attachment.size = contents.len() as i64;
        attachment.created_by = Some(actor.id.clone());
        request.target.associate(&mut attachment);

        let (storage_name, backend) = self.permanent_backend(request.storage.clone());
        attachment.storage = Some(storage_name);

        self.persist_with_bytes(attachment, backend, Bytes::from(contents))
            .await
    }

    /// Create a record in the staging backend that chunks will be appended to.
    #[tracing::instrument(skip(self, actor, request), fields(actor_id = %actor.id, declared_bytes = request.size))]
    pub async fn initiate_chunked_upload(
        &self,
        actor: &ActorContext,
        request: ChunkedUploadRequest,
    ) -> Result<Attachment, AppError> {
        let (entity_type, field) = request.target.resolve()?;
        let role = AttachmentRole::from_optional(request.role.as_deref())?;

        if request.size == 0 {
            return Err(AppError::BadRequest(
                "A chunked upload must declare a positive size.".to_string(),
            ));
        }
        let size = i64::try_from(request.size)
            .map_err(|_| AppError::BadRequest("Declared size is too large.".to_string()))?;

        self.require_create(actor).await?;
        self.validator
            .validate(actor, entity_type, field, role, request.size)
            .await?;

        let mut attachment = Attachment::new(role);
        attachment.name = request.name.unwrap_or_default();
        attachment.content_type = request.content_type;
        attachment.size = size;
        attachment.is_being_uploaded = true;
        attachment.storage = Some(STAGING_STORAGE.to_string());
        attachment.created_by = Some(actor.id.clone());
        request.target.associate(&mut attachment);

        let created = self.store.insert(&attachment).await?;

        tracing::info!(
            attachment_id = %created.id,
            role = %created.role,
            "Chunked upload initiated"
        );

        Ok(created)
    }

    /// Append one chunk. See [`ChunkAccumulator::append`].
    pub async fn append_chunk(
        &self,
        actor: &ActorContext,
        id: Uuid,
        chunk: &str,
    ) -> Result<(), AppError> {
        self.chunks.append(actor, id, chunk).await.map(|_| ())
    }

    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn get_file_data(&self, actor: &ActorContext, id: Uuid) -> Result<FileData, AppError> {
        let attachment = self.load_readable(actor, id).await?;

        let (_, backend) = self.storage.resolve(attachment.storage.as_deref());
        let key = object_key(id);
        let size = backend.size(&key).await?;
        let stream = backend.read_stream(&key).await?;

        Ok(FileData {
            name: attachment.name,
            content_type: attachment.content_type,
            size,
            stream,
        })
    }

    /// Copy an existing attachment's bytes into a new record attached to another field.
    #[tracing::instrument(skip(self, actor, request), fields(actor_id = %actor.id, source_id = ?request.source_id))]
    pub async fn duplicate_for_target(
        &self,
        actor: &ActorContext,
        request: CopyRequest,
    ) -> Result<Attachment, AppError> {
        let source_id = request
            .source_id
            .ok_or_else(|| AppError::BadRequest("Param 'id' is required.".to_string()))?;
        let (entity_type, field) = request.target.resolve()?;
        let role = AttachmentRole::Attachment;

        self.validator
            .check_target(actor, entity_type, field, role)
            .await?;
        self.require_create(actor).await?;

        let source = self.load_readable(actor, source_id).await?;
        if source.is_being_uploaded {
            return Err(AppError::BadRequest(
                "Attachment is still being uploaded.".to_string(),
            ));
        }

        self.validator
            .size_limits()
            .resolve(role, Some(entity_type), Some(field))
            .check(source.declared_size())?;

        let mut copy = Attachment::new(role);
        copy.name = source.name.clone();
        copy.content_type = source.content_type.clone();
        copy.size = source.size;
        copy.source_id = Some(source.id);
        copy.created_by = Some(actor.id.clone());
        request.target.associate(&mut copy);

        let (source_name, source_backend) = self.storage.resolve(source.storage.as_deref());
        let target_name = self.storage.default_name().to_string();
        let target_backend = self.storage.default_backend();
        let from = object_key(source.id);
        let to = object_key(copy.id);

        if source_name == target_name {
            target_backend.copy(&from, &to).await?;
        } else {
            let stream = source_backend.read_stream(&from).await?;
            target_backend.store_stream(&to, stream).await?;
        }
        copy.storage = Some(target_name);

        self.insert_or_discard(copy, target_backend.as_ref()).await
    }

    /// Download an image and store it as a new attachment named after its URL.
    #[tracing::instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn fetch_from_url(
        &self,
        actor: &ActorContext,
        request: FetchFromUrlRequest,
    ) -> Result<Attachment, AppError> {
        let url = non_empty(request.url.as_deref().map(str::trim))
            .ok_or_else(|| AppError::BadRequest("Param 'url' is required.".to_string()))?;
        let (entity_type, field) = request.target.resolve()?;
        let role = AttachmentRole::Attachment;

        self.validator
            .check_target(actor, entity_type, field, role)
            .await?;
        self.require_create(actor).await?;

        let image = self.fetcher.fetch(url).await?;

        self.validator
            .size_limits()
            .resolve(role, Some(entity_type), Some(field))
            .check(image.bytes.len() as u64)?;

        let mut attachment = Attachment::new(role);
        attachment.name = url.to_string();
        attachment.content_type = Some(image.content_type);
        attachment.size = image.bytes.len() as i64;
        attachment.created_by = Some(actor.id.clone());
        request.target.associate(&mut attachment);

        let (storage_name, backend) = self.permanent_backend(None);
        attachment.storage = Some(storage_name);

        self.persist_with_bytes(attachment, backend, image.bytes)
            .await
    }

    async fn require_create(&self, actor: &ActorContext) -> Result<(), AppError> {
        if self
            .acl
            .has_capability(actor, ATTACHMENT_ENTITY_TYPE, Action::Create)
            .await
        {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "No access to create attachments.".to_string(),
            ))
        }
    }

    async fn load_readable(&self, actor: &ActorContext, id: Uuid) -> Result<Attachment, AppError> {
        let attachment = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", id)))?;

        if !self
            .acl
            .has_capability(actor, ATTACHMENT_ENTITY_TYPE, Action::Read)
            .await
        {
            return Err(AppError::Forbidden(
                "No access to read attachments.".to_string(),
            ));
        }

        Ok(attachment)
    }

    /// Backend for a completed upload. Unregistered names and the staging backend fall back to
    /// the default backend.
    fn permanent_backend(&self, requested: Option<String>) -> (String, Arc<dyn Storage>) {
        let sanitized = self
            .storage
            .sanitize_name(requested.clone())
            .filter(|name| name != STAGING_STORAGE);
        if requested.is_some() && sanitized.is_none() {
            tracing::debug!(storage = ?requested, "Requested storage cleared, using default");
        }
        let (name, backend) = self.storage.resolve(sanitized.as_deref());
        (name.to_string(), backend)
    }

    async fn persist_with_bytes(
        &self,
        attachment: Attachment,
        backend: Arc<dyn Storage>,
        contents: Bytes,
    ) -> Result<Attachment, AppError> {
        backend.store(&object_key(attachment.id), contents).await?;
        self.insert_or_discard(attachment, backend.as_ref()).await
    }

    /// Insert a record whose bytes are already stored, removing the bytes if the insert fails.
    async fn insert_or_discard(
        &self,
        attachment: Attachment,
        backend: &dyn Storage,
    ) -> Result<Attachment, AppError> {
        match self.store.insert(&attachment).await {
            Ok(created) => {
                tracing::info!(
                    attachment_id = %created.id,
                    role = %created.role,
                    size_bytes = created.size,
                    storage = ?created.storage,
                    "Attachment created"
                );
                Ok(created)
            }
            Err(e) => {
                let key = object_key(attachment.id);
                if let Err(cleanup) = backend.delete(&key).await {
                    tracing::warn!(
                        error = %cleanup,
                        key = %key,
                        "Failed to remove stored bytes of an attachment that was not created"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fixtures::{chunk, restricted_acl};
    use crate::test_helpers::{collect_stream, TestHarness};
    use attache_core::models::TaskType;

    fn actor() -> ActorContext {
        ActorContext::user("u1")
    }

    fn limits(attachment_mb: u64) -> UploadLimits {
        UploadLimits {
            attachment_upload_max_size_mb: attachment_mb,
            inline_attachment_upload_max_size_mb: 1,
            attachment_upload_chunk_size_mb: 2,
        }
    }

    fn single_shot(target: UploadTarget, file: &str) -> SingleShotUpload {
        SingleShotUpload {
            target,
            name: Some("hello.txt".to_string()),
            content_type: Some("text/plain".to_string()),
            file: Some(file.to_string()),
            ..SingleShotUpload::default()
        }
    }

    #[tokio::test]
    async fn test_single_shot_stores_decoded_bytes() {
        let h = TestHarness::new(limits(10));
        let created = h
            .service
            .create_single_shot(
                &actor(),
                single_shot(
                    UploadTarget::parent("Account", "contract"),
                    "data:text/plain;base64,aGVsbG8=",
                ),
            )
            .await
            .unwrap();

        assert_eq!(created.size, 5);
        assert!(!created.is_being_uploaded);
        assert_eq!(created.parent_type.as_deref(), Some("Account"));
        assert_eq!(created.field.as_deref(), Some("contract"));
        assert_eq!(created.storage.as_deref(), Some("Local"));
        assert_eq!(created.created_by.as_deref(), Some("u1"));
        assert_eq!(h.local.get_bytes(&object_key(created.id)).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_single_shot_without_separator_is_empty() {
        let h = TestHarness::new(limits(10));
        let created = h
            .service
            .create_single_shot(
                &actor(),
                single_shot(UploadTarget::related("Account", "attachments"), "garbage"),
            )
            .await
            .unwrap();
        assert_eq!(created.size, 0);
        assert_eq!(created.related_type.as_deref(), Some("Account"));
    }

    #[tokio::test]
    async fn test_single_shot_input_errors() {
        let h = TestHarness::new(limits(10));

        let mut missing_file = single_shot(UploadTarget::parent("Account", "logo"), "x");
        missing_file.file = None;
        let err = h.service.create_single_shot(&actor(), missing_file).await.unwrap_err();
        assert_eq!(err.to_string(), "Bad request: No file contents.");

        let no_target = single_shot(UploadTarget::default(), "data:,aGVsbG8=");
        let err = h.service.create_single_shot(&actor(), no_target).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let mut bad_role = single_shot(UploadTarget::parent("Account", "logo"), "data:,aGVsbG8=");
        bad_role.role = Some("Export File".to_string());
        let err = h.service.create_single_shot(&actor(), bad_role).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_single_shot_size_limit() {
        let h = TestHarness::new(limits(0));
        let big = chunk(&vec![0; 5 * 1024 * 1024 + 1]);
        // Account.logo carries a 5 MB override.
        let err = h
            .service
            .create_single_shot(&actor(), single_shot(UploadTarget::parent("Account", "logo"), &big))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SizeLimitExceeded { max_mb } if max_mb == 5.0));
        assert!(h.store.is_empty());
        assert!(h.local.is_empty());

        // No override and no global limit.
        h.service
            .create_single_shot(
                &actor(),
                single_shot(UploadTarget::parent("Account", "attachments"), &big),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_or_staging_storage_is_cleared() {
        let h = TestHarness::new(limits(10));
        for storage in ["S3", STAGING_STORAGE] {
            let mut request =
                single_shot(UploadTarget::parent("Account", "logo"), "data:,aGVsbG8=");
            request.storage = Some(storage.to_string());
            let created = h.service.create_single_shot(&actor(), request).await.unwrap();
            assert_eq!(created.storage.as_deref(), Some("Local"));
        }
        assert!(h.staging.is_empty());
    }

    #[tokio::test]
    async fn test_chunked_upload_end_to_end() {
        let h = TestHarness::new(limits(10));
        let created = h
            .service
            .initiate_chunked_upload(
                &actor(),
                ChunkedUploadRequest {
                    target: UploadTarget::parent("Account", "attachments"),
                    name: Some("report.pdf".to_string()),
                    content_type: Some("application/pdf".to_string()),
                    size: 300,
                    ..ChunkedUploadRequest::default()
                },
            )
            .await
            .unwrap();
        assert!(created.is_being_uploaded);
        assert_eq!(created.storage.as_deref(), Some(STAGING_STORAGE));

        h.service
            .append_chunk(&actor(), created.id, &chunk(&[7; 100]))
            .await
            .unwrap();
        h.service
            .append_chunk(&actor(), created.id, &chunk(&[8; 200]))
            .await
            .unwrap();

        let scheduled = h.scheduler.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, TaskType::MoveToStorage);
        assert!(!h.store.get(created.id).unwrap().is_being_uploaded);

        // While relocation is pending the bytes are served from staging.
        let data = h.service.get_file_data(&actor(), created.id).await.unwrap();
        assert_eq!(data.size, 300);

        h.service.relocator().relocate(created.id).await.unwrap();

        let data = h.service.get_file_data(&actor(), created.id).await.unwrap();
        assert_eq!(data.name, "report.pdf");
        assert_eq!(data.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(data.size, 300);
        let bytes = collect_stream(data.stream).await;
        assert_eq!(&bytes[..100], &[7; 100][..]);
        assert_eq!(&bytes[100..], &[8; 200][..]);
        assert!(h.staging.is_empty());
    }

    #[tokio::test]
    async fn test_initiation_checks_declared_size() {
        let h = TestHarness::new(limits(10));
        let err = h
            .service
            .initiate_chunked_upload(
                &actor(),
                ChunkedUploadRequest {
                    target: UploadTarget::parent("Account", "logo"),
                    size: 6 * 1024 * 1024,
                    ..ChunkedUploadRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SizeLimitExceeded { max_mb } if max_mb == 5.0));

        let err = h
            .service
            .initiate_chunked_upload(
                &actor(),
                ChunkedUploadRequest {
                    target: UploadTarget::parent("Account", "logo"),
                    size: 0,
                    ..ChunkedUploadRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_initiation_respects_access_control() {
        let h = TestHarness::with_acl(limits(10), restricted_acl());
        let err = h
            .service
            .initiate_chunked_upload(
                &actor(),
                ChunkedUploadRequest {
                    target: UploadTarget::parent("Contact", "avatar"),
                    size: 10,
                    ..ChunkedUploadRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_creating_requires_attachment_create() {
        let h = TestHarness::with_acl(limits(10), restricted_acl());
        let reader = ActorContext::user("reader");

        let err = h
            .service
            .create_single_shot(
                &reader,
                SingleShotUpload {
                    target: UploadTarget::parent("Account", "attachments"),
                    file: Some("data:text/plain;base64,aGk=".to_string()),
                    ..SingleShotUpload::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = h
            .service
            .initiate_chunked_upload(
                &reader,
                ChunkedUploadRequest {
                    target: UploadTarget::parent("Account", "attachments"),
                    size: 10,
                    ..ChunkedUploadRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(h.store.is_empty());
        assert!(h.local.is_empty());
    }

    #[tokio::test]
    async fn test_get_file_data_missing_is_not_found() {
        let h = TestHarness::new(limits(10));
        let err = h
            .service
            .get_file_data(&actor(), Uuid::new_v4())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_copies_bytes_under_new_target() {
        let h = TestHarness::new(limits(10));
        let source = h
            .service
            .create_single_shot(
                &actor(),
                single_shot(UploadTarget::parent("Account", "logo"), "data:,aGVsbG8="),
            )
            .await
            .unwrap();

        let copy = h
            .service
            .duplicate_for_target(
                &actor(),
                CopyRequest {
                    source_id: Some(source.id),
                    target: UploadTarget::related("Contact", "avatar"),
                },
            )
            .await
            .unwrap();

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.source_id, Some(source.id));
        assert_eq!(copy.role, AttachmentRole::Attachment);
        assert_eq!(copy.related_type.as_deref(), Some("Contact"));
        assert_eq!(copy.parent_type, None);
        assert_eq!(copy.name, source.name);
        assert_eq!(copy.size, 5);
        assert_eq!(h.local.get_bytes(&object_key(copy.id)).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_duplicate_errors() {
        let h = TestHarness::new(limits(10));

        let err = h
            .service
            .duplicate_for_target(
                &actor(),
                CopyRequest {
                    source_id: None,
                    target: UploadTarget::parent("Account", "logo"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = h
            .service
            .duplicate_for_target(
                &actor(),
                CopyRequest {
                    source_id: Some(Uuid::new_v4()),
                    target: UploadTarget::parent("Account", "logo"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // Duplicates always use the attachment role.
        let err = h
            .service
            .duplicate_for_target(
                &actor(),
                CopyRequest {
                    source_id: Some(Uuid::new_v4()),
                    target: UploadTarget::parent("Account", "description"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FieldTypeNotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_from_url_creates_image_attachment() {
        let h = TestHarness::new(limits(10));
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/logo")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(b"png-bytes")
            .create_async()
            .await;
        let url = format!("{}/logo", server.url());

        let created = h
            .service
            .fetch_from_url(
                &actor(),
                FetchFromUrlRequest {
                    url: Some(url.clone()),
                    target: UploadTarget::parent("Account", "logo"),
                },
            )
            .await
            .unwrap();

        assert_eq!(created.name, url);
        assert_eq!(created.content_type.as_deref(), Some("image/png"));
        assert_eq!(created.size, 9);
        assert!(!created.is_being_uploaded);
        assert_eq!(h.local.get_bytes(&object_key(created.id)).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_fetch_from_url_with_unknown_type_fails() {
        let h = TestHarness::new(limits(10));
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/blob")
            .with_status(200)
            .with_body("???")
            .create_async()
            .await;

        let err = h
            .service
            .fetch_from_url(
                &actor(),
                FetchFromUrlRequest {
                    url: Some(format!("{}/blob", server.url())),
                    target: UploadTarget::parent("Account", "logo"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteFetch(_)));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_from_url_requires_url() {
        let h = TestHarness::new(limits(10));
        let err = h
            .service
            .fetch_from_url(
                &actor(),
                FetchFromUrlRequest {
                    url: Some("  ".to_string()),
                    target: UploadTarget::parent("Account", "logo"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_settings_mirror_limits() {
        let h = TestHarness::new(limits(10));
        assert_eq!(
            h.service.settings(),
            UploadSettings {
                attachment_upload_max_size: 10,
                inline_attachment_upload_max_size: 1,
                attachment_upload_chunk_size: 2,
            }
        );
    }
}
