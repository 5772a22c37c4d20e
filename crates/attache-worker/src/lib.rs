//! Attaché Worker – background task queue and worker infrastructure.
//!
//! This crate provides the task queue (polling, retry, worker pool), the `TaskScheduler`
//! seam through which the upload core enqueues work, and the `TaskHandlerContext` trait the
//! API implements to dispatch claimed tasks to their handlers.

mod context;
mod queue;

pub use context::{empty_context_weak, TaskHandlerContext, TaskScheduler};
pub use queue::{TaskQueue, TaskQueueConfig, MAX_RETRY_BACKOFF_SECS};
