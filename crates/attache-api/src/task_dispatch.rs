//! Dispatch of claimed background tasks to their handlers.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use attache_core::models::{MoveToStoragePayload, Task, TaskType};
use attache_core::TaskError;
use attache_services::Relocator;
use attache_worker::TaskHandlerContext;

pub struct TaskDispatcher {
    relocator: Relocator,
}

impl TaskDispatcher {
    pub fn new(relocator: Relocator) -> Self {
        Self { relocator }
    }

    #[tracing::instrument(skip(self, task), fields(task.id = %task.id))]
    async fn move_to_storage(&self, task: &Task) -> Result<serde_json::Value, TaskError> {
        let payload: MoveToStoragePayload = task.try_payload_as().map_err(|e| {
            TaskError::unrecoverable(
                anyhow::Error::new(e).context("Invalid move_to_storage payload"),
            )
        })?;

        let outcome = self.relocator.relocate(payload.target_id).await?;

        serde_json::to_value(&outcome).map_err(TaskError::unrecoverable)
    }
}

#[async_trait]
impl TaskHandlerContext for TaskDispatcher {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value> {
        let result = match task.task_type {
            TaskType::MoveToStorage => self.move_to_storage(task).await,
        };
        // Keep the TaskError itself so the worker can see whether to retry.
        result.map_err(anyhow::Error::from)
    }
}
