//! Task queue: worker pool, LISTEN/NOTIFY or polling, retry, stale task reaping, and
//! submission.
//!
//! Shutdown: [`TaskQueue::shutdown`] signals the pool to stop; it does not wait for
//! in-flight tasks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use attache_core::models::{Task, TaskType};
use attache_core::TaskError;
use attache_db::{TaskStore, TASK_NOTIFY_CHANNEL};

use crate::context::{TaskHandlerContext, TaskScheduler};

/// Maximum delay in seconds before retrying a failed task. Caps exponential backoff
/// so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

const DEFAULT_TASK_TIMEOUT_SECS: u64 = 600;
const DEFAULT_STALE_TASK_REAP_INTERVAL_SECS: u64 = 60;
const DEFAULT_STALE_TASK_GRACE_PERIOD_SECS: i64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    let exponent = retry_count.clamp(0, 16) as u32;
    2_u64.pow(exponent).min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone, Debug)]
pub struct TaskQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_timeout_seconds: i32,
    pub max_retries: i32,
    /// Interval in seconds between runs of the stale task reaper. Zero disables it.
    pub stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to a task's timeout before it counts as stale.
    pub stale_task_grace_period_secs: i64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            default_timeout_seconds: DEFAULT_TASK_TIMEOUT_SECS as i32,
            max_retries: 3,
            stale_task_reap_interval_secs: DEFAULT_STALE_TASK_REAP_INTERVAL_SECS,
            stale_task_grace_period_secs: DEFAULT_STALE_TASK_GRACE_PERIOD_SECS,
        }
    }
}

impl From<&attache_core::Config> for TaskQueueConfig {
    fn from(config: &attache_core::Config) -> Self {
        Self {
            max_workers: config.task_queue_max_workers(),
            poll_interval_ms: config.task_queue_poll_interval_ms(),
            default_timeout_seconds: config.task_queue_default_timeout_seconds(),
            max_retries: config.task_queue_max_retries(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    config: TaskQueueConfig,
    wake: Arc<Notify>,
    shutdown_tx: mpsc::Sender<()>,
}

impl TaskQueue {
    /// Create a new TaskQueue and spawn its worker pool.
    ///
    /// Workers wake on in-process submissions, on PostgreSQL NOTIFY when `pool` is `Some`
    /// (tasks submitted by other instances), and otherwise poll every `poll_interval_ms`.
    pub fn new(
        store: Arc<dyn TaskStore>,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let wake = Arc::new(Notify::new());

        tokio::spawn(Self::worker_pool(
            store.clone(),
            config.clone(),
            context,
            wake.clone(),
            shutdown_rx,
            pool,
        ));

        Self {
            store,
            config,
            wake,
            shutdown_tx,
        }
    }

    /// Submit a new task to the queue.
    #[tracing::instrument(skip(self, payload))]
    pub async fn submit_task(&self, task_type: TaskType, payload: serde_json::Value) -> Result<Uuid> {
        let task = self
            .store
            .create_task(
                task_type,
                payload,
                self.config.max_retries,
                Some(self.config.default_timeout_seconds),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    task_type = %task_type,
                    "Failed to create task in repository"
                );
                anyhow::anyhow!("Failed to create task in repository: {}", e)
            })?;

        self.wake.notify_one();

        tracing::info!(
            task_id = %task.id,
            task_type = %task_type,
            "Task submitted to queue"
        );

        Ok(task.id)
    }

    async fn worker_pool(
        store: Arc<dyn TaskStore>,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        wake: Arc<Notify>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = pool.is_some(),
            "Task queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        let listener_handle = pool.map(|pool| {
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(TASK_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = notify_tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            })
        });

        let reaper_handle = (config.stale_task_reap_interval_secs > 0).then(|| {
            let store = store.clone();
            let reap_interval = Duration::from_secs(config.stale_task_reap_interval_secs);
            let default_timeout = config.default_timeout_seconds;
            let grace_period = config.stale_task_grace_period_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if let Err(e) = store
                        .reap_stale_running_tasks(default_timeout, grace_period)
                        .await
                    {
                        tracing::error!(error = %e, "Stale task reaper failed");
                    }
                }
            })
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Task queue worker pool shutting down");
                    break;
                }
                _ = wake.notified() => {}
                Some(()) = notify_rx.recv() => {}
                _ = sleep(poll_interval) => {}
            }
            Self::claim_and_dispatch_one(&store, &semaphore, &context).await;
        }

        for handle in [listener_handle, reaper_handle].into_iter().flatten() {
            handle.abort();
        }

        tracing::info!("Task queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        store: &Arc<dyn TaskStore>,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn TaskHandlerContext>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match store.claim_next_task().await {
            Ok(Some(task)) => {
                let store = store.clone();
                let ctx = context.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_task(task, store, ctx).await {
                        tracing::error!(error = %e, "Task processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No tasks available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim task from queue");
            }
        }
    }

    /// Run one claimed task and record its outcome: completed, rescheduled with backoff, or
    /// failed.
    #[tracing::instrument(skip(store, context), fields(task.id = %task.id, task.type = %task.task_type))]
    pub(crate) async fn process_task(
        task: Task,
        store: Arc<dyn TaskStore>,
        context: Weak<dyn TaskHandlerContext>,
    ) -> Result<()> {
        let ctx = context.upgrade().ok_or_else(|| {
            anyhow::anyhow!("TaskHandlerContext was dropped, cannot process task")
        })?;

        let timeout_duration = task
            .timeout_seconds
            .filter(|s| *s > 0)
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS));

        let outcome = match tokio::time::timeout(timeout_duration, ctx.dispatch_task(&task)).await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "Task execution timed out after {}s",
                timeout_duration.as_secs()
            )),
        };

        let error = match outcome {
            Ok(task_result) => {
                store
                    .mark_completed(task.id, task_result)
                    .await
                    .context("Failed to mark task as completed")?;
                tracing::info!(task_id = %task.id, task_type = %task.task_type, "Task completed successfully");
                return Ok(());
            }
            Err(e) => e,
        };

        let retryable = TaskError::is_retryable(&error);

        tracing::error!(
            task_id = %task.id,
            error = %error,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            unrecoverable = !retryable,
            "Task execution failed"
        );

        if retryable && task.can_retry() {
            let backoff_seconds = compute_retry_backoff_seconds(task.retry_count);
            let retry_at = Utc::now() + chrono::Duration::seconds(backoff_seconds as i64);
            store
                .schedule_retry(task.id, retry_at)
                .await
                .context("Failed to schedule task retry")?;
            return Ok(());
        }

        let reason = if retryable {
            "Task failed after maximum retries"
        } else {
            "Task failed with unrecoverable error"
        };
        store
            .mark_failed(
                task.id,
                json!({
                    "error": error.to_string(),
                    "retry_count": task.retry_count,
                    "unrecoverable": !retryable,
                    "reason": reason,
                }),
            )
            .await
            .context("Failed to mark task as failed")?;

        Err(error)
    }

    /// Signals the worker pool to stop claiming new tasks and exit the main loop.
    ///
    /// Returns immediately; already-spawned task handlers run until they complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[async_trait]
impl TaskScheduler for TaskQueue {
    async fn schedule(&self, task_type: TaskType, payload: serde_json::Value) -> Result<Uuid> {
        self.submit_task(task_type, payload).await
    }
}
