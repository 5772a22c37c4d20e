//! Attaché API Library
//!
//! HTTP handlers, error mapping, task dispatch and application setup.

mod api_doc;
pub mod actor;
pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod task_dispatch;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
