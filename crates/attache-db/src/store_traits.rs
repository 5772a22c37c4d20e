//! Repository trait abstractions
//!
//! The upload core and the worker depend on these traits rather than on the Postgres
//! repositories, so both can run against in-memory stores in tests.

use anyhow::Result;
use async_trait::async_trait;
use attache_core::models::{Attachment, Task, TaskType};
use attache_core::AppError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence of attachment records with optimistic concurrency.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Attachment>, AppError>;

    /// Insert a new record. The returned record carries the stored version.
    async fn insert(&self, attachment: &Attachment) -> Result<Attachment, AppError>;

    /// Persist changes to an existing record.
    ///
    /// Succeeds only if the stored version still equals `attachment.version`; otherwise
    /// returns [`AppError::VersionConflict`]. The returned record carries the new version.
    async fn save(&self, attachment: &Attachment) -> Result<Attachment, AppError>;

    /// Ids of completed uploads still in the staging backend, last updated no later than
    /// `updated_before`, oldest first.
    async fn awaiting_relocation(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError>;
}

/// Persistence of background tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Task>;

    /// Claim the next runnable task, marking it running. Concurrent claimers never receive the
    /// same task.
    async fn claim_next_task(&self) -> Result<Option<Task>>;

    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task>;

    async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task>;

    /// Increment the retry count and schedule the task to run again at `retry_at`.
    async fn schedule_retry(&self, task_id: Uuid, retry_at: DateTime<Utc>) -> Result<Task>;

    /// Recover tasks left `running` longer than their timeout (or `default_timeout_seconds`)
    /// plus `grace_period_seconds`. Tasks with retries left are rescheduled, the rest fail.
    /// Returns how many tasks were recovered.
    async fn reap_stale_running_tasks(
        &self,
        default_timeout_seconds: i32,
        grace_period_seconds: i64,
    ) -> Result<u64>;
}
