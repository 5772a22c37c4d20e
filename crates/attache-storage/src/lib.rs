//! Attaché Storage Library
//!
//! Storage abstraction, the local filesystem backend and the name-keyed registry through which
//! records locate their bytes.
//!
//! # Storage key format
//!
//! An attachment's bytes live under `attachments/{id}` in whichever backend owns them (see
//! the `keys` module). Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
pub mod local;
pub mod registry;
pub mod traits;

// Re-export commonly used types
pub use factory::{create_registry, LOCAL_STORAGE};
pub use keys::object_key;
pub use local::LocalStorage;
pub use registry::StorageRegistry;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
