//! Attaché Core Library
//!
//! Domain models, error types, configuration, transport decoding and the seams through which
//! the upload core consults its collaborators (schema metadata, access control).

pub mod acl;
pub mod config;
pub mod constants;
pub mod error;
pub mod metadata;
pub mod models;
pub mod task_error;
pub mod transport;

// Re-export commonly used types
pub use acl::{AccessControl, AccessPolicy, Action, ActorContext, ActorPolicy, PolicyAccessControl};
pub use config::{AttacheConfig, Config, UploadLimits, UrlFetchConfig};
pub use error::{AppError, ErrorKind, ErrorMetadata, LogLevel};
pub use metadata::{JsonMetadata, SchemaMetadata};
pub use task_error::TaskError;
