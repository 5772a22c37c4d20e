use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use attache_core::models::{Task, TaskStatus, TaskType};

use crate::store_traits::TaskStore;

/// Channel name for PostgreSQL LISTEN/NOTIFY when a new task is created.
pub const TASK_NOTIFY_CHANNEL: &str = "attache_new_task";

const TASK_COLUMNS: &str = r#"
    id,
    task_type,
    status,
    payload,
    result,
    scheduled_at,
    started_at,
    completed_at,
    retry_count,
    max_retries,
    timeout_seconds,
    created_at,
    updated_at
"#;

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new task and notify listening workers
    #[tracing::instrument(skip(self, payload))]
    pub async fn insert_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Task> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let task: Task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            INSERT INTO tasks (id, task_type, status, payload, scheduled_at, max_retries, timeout_seconds)
            VALUES ($1, $2, $3, $4, NOW(), $5, $6)
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(task_type.to_string())
        .bind(TaskStatus::Pending.to_string())
        .bind(payload)
        .bind(max_retries)
        .bind(timeout_seconds)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                task_type = %task_type,
                "Failed to insert task into database"
            );
            anyhow::anyhow!("Failed to insert task into database: {}", e)
        })?;

        // Workers also poll, so a failed notify only delays pickup.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(TASK_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %task.id,
                "Failed to send pg_notify for new task, workers will discover task via polling"
            );
        }

        tx.commit().await.context("Failed to commit task creation")?;

        tracing::info!(
            task_id = %task.id,
            task_type = %task_type,
            "Task created"
        );

        Ok(task)
    }

    /// Claim the next runnable task
    ///
    /// Uses FOR UPDATE SKIP LOCKED so concurrent workers never claim the same row.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next(&self) -> Result<Option<Task>> {
        let task: Option<Task> = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'running',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM tasks
                WHERE status IN ('pending', 'scheduled')
                    AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim next task")?;

        if let Some(ref task) = task {
            tracing::debug!(
                task_id = %task.id,
                task_type = %task.task_type,
                "Task claimed"
            );
        }

        Ok(task)
    }

    async fn finish(&self, task_id: Uuid, status: TaskStatus, result: serde_json::Value) -> Result<Task> {
        sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = $2,
                result = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(status.to_string())
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to mark task as {}", status))
    }

    /// Mark task as completed with result
    #[tracing::instrument(skip(self, result))]
    pub async fn complete(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        let task = self.finish(task_id, TaskStatus::Completed, result).await?;
        tracing::info!(task_id = %task_id, task_type = %task.task_type, "Task completed");
        Ok(task)
    }

    /// Mark task as failed with error details
    #[tracing::instrument(skip(self, error))]
    pub async fn fail(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task> {
        let task = self.finish(task_id, TaskStatus::Failed, error).await?;
        tracing::error!(
            task_id = %task_id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            "Task failed"
        );
        Ok(task)
    }

    /// Increment retry count and schedule the task to run again
    #[tracing::instrument(skip(self))]
    pub async fn reschedule(&self, task_id: Uuid, retry_at: DateTime<Utc>) -> Result<Task> {
        let task: Task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'scheduled',
                retry_count = retry_count + 1,
                scheduled_at = $2,
                started_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(retry_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to schedule task retry")?;

        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            retry_at = %retry_at,
            "Task retry scheduled"
        );

        Ok(task)
    }

    /// Reschedule or fail tasks whose worker stopped without recording an outcome
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale_running(
        &self,
        default_timeout_seconds: i32,
        grace_period_seconds: i64,
    ) -> Result<u64> {
        let reaped = sqlx::query(
            r#"
            UPDATE tasks
            SET status = CASE WHEN retry_count < max_retries THEN 'scheduled' ELSE 'failed' END,
                retry_count = CASE WHEN retry_count < max_retries THEN retry_count + 1 ELSE retry_count END,
                scheduled_at = NOW(),
                started_at = CASE WHEN retry_count < max_retries THEN NULL ELSE started_at END,
                completed_at = CASE WHEN retry_count < max_retries THEN NULL ELSE NOW() END,
                result = CASE
                    WHEN retry_count < max_retries THEN result
                    ELSE jsonb_build_object(
                        'error', 'Task did not finish within its timeout',
                        'retry_count', retry_count,
                        'unrecoverable', false,
                        'reason', 'Stale running task'
                    )
                END,
                updated_at = NOW()
            WHERE status = 'running'
                AND started_at < NOW()
                    - (COALESCE(timeout_seconds, $1)::float8 + $2::float8) * INTERVAL '1 second'
            "#,
        )
        .bind(default_timeout_seconds)
        .bind(grace_period_seconds)
        .execute(&self.pool)
        .await
        .context("Failed to reap stale running tasks")?
        .rows_affected();

        if reaped > 0 {
            tracing::warn!(reaped = reaped, "Recovered stale running tasks");
        }

        Ok(reaped)
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    async fn create_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        max_retries: i32,
        timeout_seconds: Option<i32>,
    ) -> Result<Task> {
        self.insert_task(task_type, payload, max_retries, timeout_seconds)
            .await
    }

    async fn claim_next_task(&self) -> Result<Option<Task>> {
        self.claim_next().await
    }

    async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        self.complete(task_id, result).await
    }

    async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task> {
        self.fail(task_id, error).await
    }

    async fn schedule_retry(&self, task_id: Uuid, retry_at: DateTime<Utc>) -> Result<Task> {
        self.reschedule(task_id, retry_at).await
    }

    async fn reap_stale_running_tasks(
        &self,
        default_timeout_seconds: i32,
        grace_period_seconds: i64,
    ) -> Result<u64> {
        self.reap_stale_running(default_timeout_seconds, grace_period_seconds)
            .await
    }
}
