//! Chunk accumulation for chunked uploads
//!
//! A chunked upload starts as a record with `is_being_uploaded = true` in the staging backend.
//! Each chunk is appended to the staged object. The append that makes the staged length equal
//! the declared size completes the upload: the flag is cleared and relocation is scheduled.
//! A completed upload whose relocation could not be scheduled is picked up later by the
//! [`RelocationSweeper`](super::relocation::RelocationSweeper).
//! Overshooting the declared size leaves the upload corrupt.

use std::sync::Arc;

use uuid::Uuid;

use attache_core::constants::{ATTACHMENT_ENTITY_TYPE, STAGING_STORAGE};
use attache_core::transport::decode_chunk;
use attache_core::{AccessControl, Action, ActorContext, AppError};
use attache_db::AttachmentStore;
use attache_storage::{object_key, Storage};

use super::locks::KeyedLocks;
use super::relocation::RelocationScheduler;
use super::size_limit::SizeLimitResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More bytes are expected.
    Accumulating { staged_bytes: u64 },
    /// The declared size was reached. `task_id` is the relocation task, absent when scheduling
    /// failed and the sweep will schedule it instead.
    Complete { task_id: Option<Uuid> },
}

#[derive(Clone)]
pub struct ChunkAccumulator {
    store: Arc<dyn AttachmentStore>,
    staging: Arc<dyn Storage>,
    acl: Arc<dyn AccessControl>,
    size_limits: SizeLimitResolver,
    relocation: RelocationScheduler,
    locks: KeyedLocks,
}

impl ChunkAccumulator {
    pub fn new(
        store: Arc<dyn AttachmentStore>,
        staging: Arc<dyn Storage>,
        acl: Arc<dyn AccessControl>,
        size_limits: SizeLimitResolver,
        relocation: RelocationScheduler,
    ) -> Self {
        Self {
            store,
            staging,
            acl,
            size_limits,
            relocation,
            locks: KeyedLocks::new(),
        }
    }

    /// Append one transport-encoded chunk to the upload `id`.
    ///
    /// Appends for the same id are serialized in-process; the record save is versioned, so a
    /// second process racing on the same id fails with a conflict instead of completing twice.
    #[tracing::instrument(skip(self, actor, payload), fields(actor_id = %actor.id, attachment_id = %id))]
    pub async fn append(
        &self,
        actor: &ActorContext,
        id: Uuid,
        payload: &str,
    ) -> Result<ChunkOutcome, AppError> {
        let _guard = self.locks.acquire(id).await;

        let mut attachment = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", id)))?;

        if !self
            .acl
            .has_capability(actor, ATTACHMENT_ENTITY_TYPE, Action::Create)
            .await
        {
            return Err(AppError::Forbidden(
                "No access to create attachments.".to_string(),
            ));
        }

        if !attachment.is_being_uploaded {
            return Err(AppError::Forbidden(
                "Attachment is not being uploaded.".to_string(),
            ));
        }

        if !attachment.is_staged() {
            return Err(AppError::Forbidden(format!(
                "Attachment storage is not '{}'.",
                STAGING_STORAGE
            )));
        }

        let chunk = decode_chunk(payload)?;

        let key = object_key(id);
        let current = if self.staging.exists(&key).await? {
            self.staging.size(&key).await?
        } else {
            0
        };
        let chunk_bytes = chunk.len() as u64;
        let total = current.saturating_add(chunk_bytes);

        if !self.size_limits.for_record(&attachment).allows(total) {
            tracing::warn!(
                staged_bytes = current,
                chunk_bytes = chunk_bytes,
                "Chunk rejected, attachment size ceiling exceeded"
            );
            return Err(AppError::Forbidden(
                "Max attachment size exceeded.".to_string(),
            ));
        }

        let staged = self.staging.append(&key, &chunk).await?;
        let declared = attachment.declared_size();

        tracing::debug!(
            chunk_bytes = chunk_bytes,
            staged_bytes = staged,
            declared_bytes = declared,
            "Chunk appended"
        );

        if staged > declared {
            tracing::warn!(
                staged_bytes = staged,
                declared_bytes = declared,
                "Chunked upload overshot its declared size"
            );
            return Err(AppError::SizeMismatch {
                declared,
                staged,
            });
        }

        if staged < declared {
            return Ok(ChunkOutcome::Accumulating {
                staged_bytes: staged,
            });
        }

        attachment.is_being_uploaded = false;
        let saved = self.store.save(&attachment).await?;
        let task_id = match self.relocation.schedule(saved.id).await {
            Ok(task_id) => Some(task_id),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Relocation not scheduled, left for the relocation sweep"
                );
                None
            }
        };

        tracing::info!(
            size_bytes = declared,
            task_id = ?task_id,
            "Chunked upload complete"
        );

        Ok(ChunkOutcome::Complete { task_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fixtures::{chunk, metadata, restricted_acl, staged_attachment};
    use crate::test_helpers::{MemoryAttachmentStore, MemoryStorage, RecordingScheduler};
    use attache_core::models::{AttachmentRole, TaskType};
    use crate::upload::relocation::RelocationSweeper;
    use attache_core::{AccessPolicy, PolicyAccessControl, UploadLimits};
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryAttachmentStore>,
        staging: Arc<MemoryStorage>,
        scheduler: Arc<RecordingScheduler>,
        accumulator: ChunkAccumulator,
    }

    fn fixture_with(limits: UploadLimits, acl: Arc<dyn AccessControl>) -> Fixture {
        let store = Arc::new(MemoryAttachmentStore::new());
        let staging = Arc::new(MemoryStorage::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let accumulator = ChunkAccumulator::new(
            store.clone(),
            staging.clone(),
            acl,
            SizeLimitResolver::new(Arc::new(metadata()), limits),
            RelocationScheduler::new(scheduler.clone()),
        );
        Fixture {
            store,
            staging,
            scheduler,
            accumulator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            UploadLimits::default(),
            Arc::new(PolicyAccessControl::new(AccessPolicy::allow_all())),
        )
    }

    fn actor() -> ActorContext {
        ActorContext::user("u1")
    }

    #[tokio::test]
    async fn test_exact_sum_completes_once() {
        let f = fixture();
        let attachment = f.store.insert_record(staged_attachment(300));

        let first = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(&[1; 100]))
            .await
            .unwrap();
        assert_eq!(first, ChunkOutcome::Accumulating { staged_bytes: 100 });
        assert!(f.scheduler.scheduled().is_empty());

        let second = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(&[2; 200]))
            .await
            .unwrap();
        assert!(matches!(second, ChunkOutcome::Complete { .. }));

        let saved = f.store.get(attachment.id).unwrap();
        assert!(!saved.is_being_uploaded);
        assert_eq!(saved.size, 300);

        let scheduled = f.scheduler.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, TaskType::MoveToStorage);
        assert_eq!(
            scheduled[0].1["targetId"],
            serde_json::json!(attachment.id.to_string())
        );
        assert_eq!(f.staging.len_of(&object_key(attachment.id)), Some(300));
    }

    #[tokio::test]
    async fn test_overshoot_is_size_mismatch_after_append() {
        let f = fixture();
        let attachment = f.store.insert_record(staged_attachment(150));

        f.accumulator
            .append(&actor(), attachment.id, &chunk(&[0; 100]))
            .await
            .unwrap();
        let err = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(&[0; 100]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::SizeMismatch {
                declared: 150,
                staged: 200
            }
        ));
        assert!(err.is_terminal_for_upload());
        assert_eq!(f.staging.len_of(&object_key(attachment.id)), Some(200));
        assert!(f.store.get(attachment.id).unwrap().is_being_uploaded);
        assert!(f.scheduler.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_ceiling_rejects_before_append() {
        let f = fixture_with(
            UploadLimits {
                attachment_upload_max_size_mb: 1,
                ..UploadLimits::default()
            },
            Arc::new(PolicyAccessControl::new(AccessPolicy::allow_all())),
        );
        let attachment = f.store.insert_record(staged_attachment(3 * 1024 * 1024));

        f.accumulator
            .append(&actor(), attachment.id, &chunk(&vec![0; 1024 * 1024]))
            .await
            .unwrap();
        let err = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(&[0; 1]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Forbidden: Max attachment size exceeded.");
        assert_eq!(
            f.staging.len_of(&object_key(attachment.id)),
            Some(1024 * 1024)
        );
    }

    #[tokio::test]
    async fn test_ceiling_uses_field_override() {
        let f = fixture_with(
            UploadLimits {
                attachment_upload_max_size_mb: 10,
                ..UploadLimits::default()
            },
            Arc::new(PolicyAccessControl::new(AccessPolicy::allow_all())),
        );
        // Account.logo allows 5 MB.
        let mut attachment = staged_attachment(6 * 1024 * 1024);
        attachment.field = Some("logo".to_string());
        let attachment = f.store.insert_record(attachment);

        let err = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(&vec![0; 5 * 1024 * 1024 + 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(f.staging.len_of(&object_key(attachment.id)), None);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let f = fixture();
        let err = f
            .accumulator
            .append(&actor(), Uuid::new_v4(), &chunk(b"abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_actor_without_create_is_forbidden() {
        let f = fixture_with(UploadLimits::default(), restricted_acl());
        let attachment = f.store.insert_record(staged_attachment(3));
        let err = f
            .accumulator
            .append(&ActorContext::user("reader"), attachment.id, &chunk(b"abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_completed_upload_is_forbidden() {
        let f = fixture();
        let attachment = f.store.insert_record(staged_attachment(3));
        f.accumulator
            .append(&actor(), attachment.id, &chunk(b"abc"))
            .await
            .unwrap();

        let err = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(b"d"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: Attachment is not being uploaded.");
        assert_eq!(f.scheduler.scheduled().len(), 1);
    }

    #[tokio::test]
    async fn test_non_staging_storage_is_forbidden() {
        let f = fixture();
        let mut attachment = staged_attachment(3);
        attachment.storage = Some("Local".to_string());
        let attachment = f.store.insert_record(attachment);

        let err = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(b"abc"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: Attachment storage is not 'UploadDir'.");
    }

    #[tokio::test]
    async fn test_bad_payload_is_bad_request() {
        let f = fixture();
        let attachment = f.store.insert_record(staged_attachment(3));
        for payload in ["no separator here", "data:text/plain;base64,"] {
            let err = f
                .accumulator
                .append(&actor(), attachment.id, payload)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
        assert_eq!(f.staging.len_of(&object_key(attachment.id)), None);
    }

    #[tokio::test]
    async fn test_inline_ceiling_uses_inline_limit() {
        let f = fixture_with(
            UploadLimits {
                attachment_upload_max_size_mb: 10,
                inline_attachment_upload_max_size_mb: 1,
                attachment_upload_chunk_size_mb: 0,
            },
            Arc::new(PolicyAccessControl::new(AccessPolicy::allow_all())),
        );
        let mut attachment = staged_attachment(2 * 1024 * 1024);
        attachment.role = AttachmentRole::InlineAttachment;
        attachment.field = Some("description".to_string());
        let attachment = f.store.insert_record(attachment);

        let err = f
            .accumulator
            .append(&actor(), attachment.id, &chunk(&vec![0; 1024 * 1024 + 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_concurrent_final_chunks_complete_once() {
        let f = fixture();
        let attachment = f.store.insert_record(staged_attachment(4));
        f.accumulator
            .append(&actor(), attachment.id, &chunk(b"ab"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let accumulator = f.accumulator.clone();
            let id = attachment.id;
            handles.push(tokio::spawn(async move {
                accumulator.append(&actor(), id, &chunk(b"cd")).await
            }));
        }
        let mut completed = 0;
        for handle in handles {
            if let Ok(ChunkOutcome::Complete { .. }) = handle.await.unwrap() {
                completed += 1;
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(f.scheduler.scheduled().len(), 1);
    }

    #[tokio::test]
    async fn test_unscheduled_completion_is_left_for_the_sweep() {
        let store = Arc::new(MemoryAttachmentStore::new());
        let staging = Arc::new(MemoryStorage::new());
        let accumulator = ChunkAccumulator::new(
            store.clone(),
            staging.clone(),
            Arc::new(PolicyAccessControl::new(AccessPolicy::allow_all())),
            SizeLimitResolver::new(Arc::new(metadata()), UploadLimits::default()),
            RelocationScheduler::new(Arc::new(RecordingScheduler::failing())),
        );
        let attachment = store.insert_record(staged_attachment(3));

        let outcome = accumulator
            .append(&actor(), attachment.id, &chunk(b"abc"))
            .await
            .unwrap();

        assert_eq!(outcome, ChunkOutcome::Complete { task_id: None });
        let saved = store.get(attachment.id).unwrap();
        assert!(!saved.is_being_uploaded);
        assert!(saved.is_staged());

        let recorder = Arc::new(RecordingScheduler::new());
        let sweeper = RelocationSweeper::new(store, RelocationScheduler::new(recorder.clone()))
            .with_grace(Duration::ZERO);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert_eq!(recorder.scheduled()[0].0, TaskType::MoveToStorage);
    }
}
