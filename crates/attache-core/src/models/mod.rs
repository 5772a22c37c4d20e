//! Data models for the application

mod attachment;
mod task;

pub use attachment::*;
pub use task::*;
