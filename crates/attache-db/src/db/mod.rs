//! Database repositories for data access layer
//!
//! Each repository owns one table and implements the matching store trait.

pub mod attachment;
pub mod task;

pub use attachment::AttachmentRepository;
pub use task::{TaskRepository, TASK_NOTIFY_CHANNEL};
