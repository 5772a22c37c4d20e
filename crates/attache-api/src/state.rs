//! Application state shared by handlers.

use attache_core::Config;
use attache_services::AttachmentService;
use attache_worker::TaskQueue;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::task_dispatch::TaskDispatcher;

/// Background task plumbing. The queue holds only a weak handle to the dispatcher, so the
/// state keeps it alive.
#[derive(Clone)]
pub struct TaskState {
    pub queue: TaskQueue,
    pub dispatcher: Arc<TaskDispatcher>,
    pub relocation_sweep: Arc<JoinHandle<()>>,
}

impl TaskState {
    pub async fn shutdown(&self) {
        self.relocation_sweep.abort();
        self.queue.shutdown().await;
    }
}

pub struct AppState {
    pub config: Config,
    pub attachments: AttachmentService,
    /// Absent when the state is built without a database (tests).
    pub tasks: Option<TaskState>,
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Config, attachments: AttachmentService) -> Self {
        Self {
            config,
            attachments,
            tasks: None,
            pool: None,
        }
    }
}
