//! Attaché Database Layer
//!
//! Postgres repositories for attachment records and background tasks, the store traits the
//! rest of the workspace programs against, and the embedded migrations.

pub mod db;
pub mod store_traits;

pub use db::{AttachmentRepository, TaskRepository, TASK_NOTIFY_CHANNEL};
pub use store_traits::{AttachmentStore, TaskStore};

/// Embedded schema migrations, applied at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
