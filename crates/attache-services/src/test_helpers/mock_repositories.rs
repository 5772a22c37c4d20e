//! Mock repository implementations for testing
//!
//! These mocks allow testing the upload core without database dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use attache_core::models::{Attachment, TaskType};
use attache_core::AppError;
use attache_db::AttachmentStore;
use attache_worker::TaskScheduler;

/// Attachment store with the same optimistic versioning as the Postgres repository.
#[derive(Clone, Default)]
pub struct MemoryAttachmentStore {
    records: Arc<Mutex<HashMap<Uuid, Attachment>>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record directly, bypassing the service. Returns it with version 1.
    pub fn insert_record(&self, mut attachment: Attachment) -> Attachment {
        attachment.version = 1;
        self.records
            .lock()
            .unwrap()
            .insert(attachment.id, attachment.clone());
        attachment
    }

    pub fn get(&self, id: Uuid) -> Option<Attachment> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn load(&self, id: Uuid) -> Result<Option<Attachment>, AppError> {
        Ok(self.get(id))
    }

    async fn insert(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&attachment.id) {
            return Err(AppError::Internal(format!(
                "Attachment {} already exists",
                attachment.id
            )));
        }
        let mut created = attachment.clone();
        created.version = 1;
        records.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        let mut records = self.records.lock().unwrap();
        let stored = records
            .get_mut(&attachment.id)
            .filter(|stored| stored.version == attachment.version)
            .ok_or_else(|| AppError::VersionConflict(attachment.id.to_string()))?;

        // Declared size, role and association are fixed at creation.
        stored.name = attachment.name.clone();
        stored.content_type = attachment.content_type.clone();
        stored.storage = attachment.storage.clone();
        stored.is_being_uploaded = attachment.is_being_uploaded;
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn awaiting_relocation(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let records = self.records.lock().unwrap();
        let mut pending: Vec<&Attachment> = records
            .values()
            .filter(|a| !a.is_being_uploaded && a.is_staged() && a.updated_at <= updated_before)
            .collect();
        pending.sort_by_key(|a| a.updated_at);
        Ok(pending
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|a| a.id)
            .collect())
    }
}

/// Task scheduler that records what was scheduled instead of running it.
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(TaskType, serde_json::Value)>>,
    fail: bool,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler whose every call fails.
    pub fn failing() -> Self {
        Self {
            scheduled: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn scheduled(&self) -> Vec<(TaskType, serde_json::Value)> {
        self.scheduled.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskScheduler for RecordingScheduler {
    async fn schedule(&self, task_type: TaskType, payload: serde_json::Value) -> Result<Uuid> {
        if self.fail {
            return Err(anyhow!("task queue unavailable"));
        }
        self.scheduled.lock().unwrap().push((task_type, payload));
        Ok(Uuid::new_v4())
    }
}
