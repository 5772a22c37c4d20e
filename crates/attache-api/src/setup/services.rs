//! Wiring of repositories, storage, collaborators and the task queue into [`AppState`].

use anyhow::{Context, Result};
use attache_core::{
    AccessControl, AccessPolicy, Config, JsonMetadata, PolicyAccessControl, SchemaMetadata,
};
use attache_db::{AttachmentRepository, TaskRepository};
use attache_services::{
    AttachmentService, RelocationScheduler, RelocationSweeper, Relocator, UploadContext,
};
use attache_worker::{TaskHandlerContext, TaskQueue, TaskQueueConfig};
use sqlx::PgPool;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::state::{AppState, TaskState};
use crate::task_dispatch::TaskDispatcher;

const RELOCATION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

fn load_metadata(config: &Config) -> Result<Arc<dyn SchemaMetadata>> {
    match config.schema_metadata_path() {
        Some(path) => {
            let metadata = JsonMetadata::from_file(path)?;
            tracing::info!(path = %path, "Schema metadata loaded");
            Ok(Arc::new(metadata))
        }
        None => {
            tracing::warn!("SCHEMA_METADATA_PATH not set; no field accepts attachments");
            Ok(Arc::new(JsonMetadata::default()))
        }
    }
}

fn load_access_control(config: &Config) -> Result<Arc<dyn AccessControl>> {
    let policy = match config.access_policy_path() {
        Some(path) => {
            let policy = AccessPolicy::from_file(path)?;
            tracing::info!(path = %path, actors = policy.actors.len(), "Access policy loaded");
            policy
        }
        None => {
            tracing::warn!("ACCESS_POLICY_PATH not set; every actor may upload to every field");
            AccessPolicy::allow_all()
        }
    };
    Ok(Arc::new(PolicyAccessControl::new(policy)))
}

/// Initialize storage, repositories, the task queue and the attachment service.
pub async fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    let storage = Arc::new(
        attache_storage::create_registry(config)
            .await
            .context("Failed to initialize storage")?,
    );
    let metadata = load_metadata(config)?;
    let acl = load_access_control(config)?;

    let attachment_repository = Arc::new(AttachmentRepository::new(pool.clone()));
    let task_repository = Arc::new(TaskRepository::new(pool.clone()));

    let dispatcher = Arc::new(TaskDispatcher::new(Relocator::new(
        attachment_repository.clone(),
        storage.clone(),
    )));
    let dispatcher_weak: Weak<TaskDispatcher> = Arc::downgrade(&dispatcher);
    let context: Weak<dyn TaskHandlerContext> = dispatcher_weak;

    let task_queue_config = TaskQueueConfig::from(config);
    let task_queue = TaskQueue::new(
        task_repository,
        task_queue_config.clone(),
        context,
        Some(pool.clone()),
    );
    tracing::info!(
        max_workers = task_queue_config.max_workers,
        poll_interval_ms = task_queue_config.poll_interval_ms,
        max_retries = task_queue_config.max_retries,
        "Task queue system initialized successfully"
    );

    let relocation_sweep = RelocationSweeper::new(
        attachment_repository.clone(),
        RelocationScheduler::new(Arc::new(task_queue.clone())),
    )
    .spawn(RELOCATION_SWEEP_INTERVAL);

    let attachments = AttachmentService::new(UploadContext {
        store: attachment_repository,
        storage,
        metadata,
        acl,
        scheduler: Arc::new(task_queue.clone()),
        limits: config.upload_limits(),
        url_fetch: config.url_fetch().clone(),
    })
    .context("Failed to initialize attachment service")?;

    Ok(Arc::new(AppState {
        config: config.clone(),
        attachments,
        tasks: Some(TaskState {
            queue: task_queue,
            dispatcher,
            relocation_sweep: Arc::new(relocation_sweep),
        }),
        pool: Some(pool),
    }))
}
