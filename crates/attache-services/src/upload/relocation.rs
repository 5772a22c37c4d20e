//! Relocation of completed uploads
//!
//! [`RelocationScheduler`] enqueues a `move_to_storage` task when a chunked upload completes.
//! [`Relocator`] is what the worker runs for that task: it streams the staged bytes into the
//! default backend, points the record at it and removes the staged copy.
//! [`RelocationSweeper`] re-enqueues completed uploads that are still in staging after a grace
//! period, which covers completions whose task could not be scheduled.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use attache_core::models::{MoveToStoragePayload, TaskPayload};
use attache_core::{AppError, TaskError};
use attache_db::AttachmentStore;
use attache_storage::{object_key, StorageRegistry};
use attache_worker::TaskScheduler;

#[derive(Clone)]
pub struct RelocationScheduler {
    scheduler: Arc<dyn TaskScheduler>,
}

impl RelocationScheduler {
    pub fn new(scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self { scheduler }
    }

    /// Enqueue relocation of `attachment_id`. Returns the task id.
    pub async fn schedule(&self, attachment_id: Uuid) -> Result<Uuid, AppError> {
        let payload = serde_json::to_value(MoveToStoragePayload {
            target_id: attachment_id,
        })
        .map_err(|e| AppError::Internal(format!("Failed to encode relocation payload: {}", e)))?;

        let task_id = self
            .scheduler
            .schedule(MoveToStoragePayload::task_type(), payload)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    attachment_id = %attachment_id,
                    "Failed to schedule relocation"
                );
                AppError::InternalWithSource {
                    message: format!("Failed to schedule relocation of {}", attachment_id),
                    source: e,
                }
            })?;

        tracing::info!(
            attachment_id = %attachment_id,
            task_id = %task_id,
            "Relocation scheduled"
        );

        Ok(task_id)
    }
}

const DEFAULT_SWEEP_GRACE: Duration = Duration::from_secs(600);
const SWEEP_BATCH_SIZE: i64 = 100;

/// Schedules relocation for completed uploads left in staging.
///
/// A relocation already queued for the same record is harmless: the second run finds the
/// record off staging and skips.
#[derive(Clone)]
pub struct RelocationSweeper {
    store: Arc<dyn AttachmentStore>,
    relocation: RelocationScheduler,
    grace: Duration,
}

impl RelocationSweeper {
    pub fn new(store: Arc<dyn AttachmentStore>, relocation: RelocationScheduler) -> Self {
        Self {
            store,
            relocation,
            grace: DEFAULT_SWEEP_GRACE,
        }
    }

    /// Only records completed at least `grace` ago are swept.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Schedule relocation for one batch of stranded uploads. Returns how many were scheduled.
    pub async fn sweep(&self) -> Result<usize, AppError> {
        let grace = chrono::Duration::from_std(self.grace)
            .map_err(|e| AppError::Internal(format!("Invalid sweep grace period: {}", e)))?;
        let stranded = self
            .store
            .awaiting_relocation(Utc::now() - grace, SWEEP_BATCH_SIZE)
            .await?;

        for attachment_id in &stranded {
            self.relocation.schedule(*attachment_id).await?;
        }

        if !stranded.is_empty() {
            tracing::info!(count = stranded.len(), "Stranded uploads rescheduled for relocation");
        }

        Ok(stranded.len())
    }

    /// Sweep every `interval` until the returned handle is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    tracing::error!(error = %e, "Relocation sweep failed");
                }
            }
        })
    }
}

/// Result of a relocation task, stored as the task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RelocationOutcome {
    Relocated { storage: String, size_bytes: u64 },
    Skipped { reason: String },
}

#[derive(Clone)]
pub struct Relocator {
    store: Arc<dyn AttachmentStore>,
    storage: Arc<StorageRegistry>,
}

impl Relocator {
    pub fn new(store: Arc<dyn AttachmentStore>, storage: Arc<StorageRegistry>) -> Self {
        Self { store, storage }
    }

    #[tracing::instrument(skip(self))]
    pub async fn relocate(&self, attachment_id: Uuid) -> Result<RelocationOutcome, TaskError> {
        let mut attachment = self
            .store
            .load(attachment_id)
            .await?
            .ok_or_else(|| {
                TaskError::unrecoverable(anyhow!("Attachment {} not found", attachment_id))
            })?;

        if attachment.is_being_uploaded {
            return Ok(skipped(attachment_id, "still being uploaded"));
        }
        if !attachment.is_staged() {
            return Ok(skipped(attachment_id, "not in staging storage"));
        }

        let key = object_key(attachment_id);
        let staging = self.storage.staging();
        let target_name = self.storage.default_name().to_string();
        let target = self.storage.default_backend();

        let stream = staging.read_stream(&key).await.map_err(AppError::from)?;
        let written = target
            .store_stream(&key, stream)
            .await
            .map_err(AppError::from)?;

        let declared = attachment.declared_size();
        if written != declared {
            if let Err(e) = target.delete(&key).await {
                tracing::warn!(error = %e, key = %key, "Failed to remove partial relocated object");
            }
            return Err(TaskError::unrecoverable(AppError::SizeMismatch {
                declared,
                staged: written,
            }));
        }

        attachment.storage = Some(target_name.clone());
        self.store.save(&attachment).await?;

        // The record no longer points at staging; a leftover staged object is only garbage.
        if let Err(e) = staging.delete(&key).await {
            tracing::warn!(
                error = %e,
                attachment_id = %attachment_id,
                "Failed to delete staged object after relocation"
            );
        }

        tracing::info!(
            attachment_id = %attachment_id,
            storage = %target_name,
            size_bytes = written,
            "Attachment relocated"
        );

        Ok(RelocationOutcome::Relocated {
            storage: target_name,
            size_bytes: written,
        })
    }
}

fn skipped(attachment_id: Uuid, reason: &str) -> RelocationOutcome {
    tracing::info!(attachment_id = %attachment_id, reason = reason, "Relocation skipped");
    RelocationOutcome::Skipped {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fixtures::staged_attachment;
    use crate::test_helpers::{MemoryAttachmentStore, MemoryStorage, RecordingScheduler};
    use attache_core::constants::STAGING_STORAGE;
    use attache_core::models::TaskType;
    use attache_storage::Storage;
    use bytes::Bytes;

    struct Fixture {
        store: Arc<MemoryAttachmentStore>,
        staging: Arc<MemoryStorage>,
        local: Arc<MemoryStorage>,
        relocator: Relocator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryAttachmentStore::new());
        let staging = Arc::new(MemoryStorage::new());
        let local = Arc::new(MemoryStorage::new());
        let registry = StorageRegistry::new("Local", local.clone(), staging.clone());
        let relocator = Relocator::new(store.clone(), Arc::new(registry));
        Fixture {
            store,
            staging,
            local,
            relocator,
        }
    }

    #[tokio::test]
    async fn test_scheduler_enqueues_move_to_storage() {
        let recorder = Arc::new(RecordingScheduler::new());
        let scheduler = RelocationScheduler::new(recorder.clone());
        let id = Uuid::new_v4();

        scheduler.schedule(id).await.unwrap();

        let scheduled = recorder.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, TaskType::MoveToStorage);
        assert_eq!(scheduled[0].1, serde_json::json!({ "targetId": id.to_string() }));
    }

    #[tokio::test]
    async fn test_scheduler_failure_is_reported() {
        let recorder = Arc::new(RecordingScheduler::failing());
        let scheduler = RelocationScheduler::new(recorder);
        let err = scheduler.schedule(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::InternalWithSource { .. }));
    }

    #[tokio::test]
    async fn test_relocates_completed_upload() {
        let f = fixture();
        let mut attachment = staged_attachment(5);
        attachment.is_being_uploaded = false;
        let attachment = f.store.insert_record(attachment);
        let key = object_key(attachment.id);
        f.staging.store(&key, Bytes::from_static(b"hello")).await.unwrap();

        let outcome = f.relocator.relocate(attachment.id).await.unwrap();

        assert_eq!(
            outcome,
            RelocationOutcome::Relocated {
                storage: "Local".to_string(),
                size_bytes: 5
            }
        );
        assert_eq!(f.local.read(&key).await.unwrap(), Bytes::from_static(b"hello"));
        assert!(!f.staging.exists(&key).await.unwrap());
        let saved = f.store.get(attachment.id).unwrap();
        assert_eq!(saved.storage.as_deref(), Some("Local"));
        assert_eq!(saved.version, attachment.version + 1);
    }

    #[tokio::test]
    async fn test_skips_upload_still_in_progress() {
        let f = fixture();
        let attachment = f.store.insert_record(staged_attachment(5));

        let outcome = f.relocator.relocate(attachment.id).await.unwrap();

        assert!(matches!(outcome, RelocationOutcome::Skipped { .. }));
        assert_eq!(
            f.store.get(attachment.id).unwrap().storage.as_deref(),
            Some(STAGING_STORAGE)
        );
    }

    #[tokio::test]
    async fn test_skips_already_relocated() {
        let f = fixture();
        let mut attachment = staged_attachment(5);
        attachment.is_being_uploaded = false;
        attachment.storage = Some("Local".to_string());
        let attachment = f.store.insert_record(attachment);

        let outcome = f.relocator.relocate(attachment.id).await.unwrap();
        assert!(matches!(outcome, RelocationOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_missing_record_is_unrecoverable() {
        let f = fixture();
        let err = f.relocator.relocate(Uuid::new_v4()).await.unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_short_staged_object_fails_without_moving() {
        let f = fixture();
        let mut attachment = staged_attachment(10);
        attachment.is_being_uploaded = false;
        let attachment = f.store.insert_record(attachment);
        let key = object_key(attachment.id);
        f.staging.store(&key, Bytes::from_static(b"hello")).await.unwrap();

        let err = f.relocator.relocate(attachment.id).await.unwrap_err();

        assert!(!err.is_recoverable());
        assert!(!f.local.exists(&key).await.unwrap());
        assert!(f.staging.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_schedules_completed_uploads_left_in_staging() {
        let store = Arc::new(MemoryAttachmentStore::new());
        let recorder = Arc::new(RecordingScheduler::new());
        let mut completed = staged_attachment(5);
        completed.is_being_uploaded = false;
        let completed = store.insert_record(completed);
        store.insert_record(staged_attachment(5));
        let mut relocated = staged_attachment(5);
        relocated.is_being_uploaded = false;
        relocated.storage = Some("Local".to_string());
        store.insert_record(relocated);

        let sweeper = RelocationSweeper::new(store, RelocationScheduler::new(recorder.clone()))
            .with_grace(Duration::ZERO);

        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        let scheduled = recorder.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(
            scheduled[0].1,
            serde_json::json!({ "targetId": completed.id.to_string() })
        );
    }

    #[tokio::test]
    async fn test_sweep_waits_for_grace_period() {
        let store = Arc::new(MemoryAttachmentStore::new());
        let recorder = Arc::new(RecordingScheduler::new());
        let mut completed = staged_attachment(5);
        completed.is_being_uploaded = false;
        store.insert_record(completed);

        let sweeper = RelocationSweeper::new(store, RelocationScheduler::new(recorder.clone()))
            .with_grace(Duration::from_secs(3600));

        assert_eq!(sweeper.sweep().await.unwrap(), 0);
        assert!(recorder.scheduled().is_empty());
    }
}
