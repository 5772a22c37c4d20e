use crate::{LocalStorage, StorageError, StorageRegistry, StorageResult};
use attache_core::constants::STAGING_STORAGE;
use attache_core::Config;
use std::sync::Arc;

/// Name under which the local filesystem backend is registered.
pub const LOCAL_STORAGE: &str = "Local";

/// Create the storage registry based on configuration
///
/// The staging backend lives under `UPLOAD_STAGING_PATH`; the local backend under
/// `LOCAL_STORAGE_PATH`. `DEFAULT_STORAGE` must name the local backend, the only permanent
/// backend shipped with the service.
pub async fn create_registry(config: &Config) -> StorageResult<StorageRegistry> {
    let default_name = config.default_storage();

    if default_name == STAGING_STORAGE {
        return Err(StorageError::ConfigError(format!(
            "DEFAULT_STORAGE cannot be the staging backend '{}'",
            STAGING_STORAGE
        )));
    }

    if default_name != LOCAL_STORAGE {
        return Err(StorageError::ConfigError(format!(
            "Storage backend '{}' is not available; supported: {}",
            default_name, LOCAL_STORAGE
        )));
    }

    let staging = LocalStorage::new(config.upload_staging_path()).await?;
    let local = LocalStorage::new(config.local_storage_path()).await?;

    tracing::info!(
        staging_path = %config.upload_staging_path(),
        storage_path = %config.local_storage_path(),
        default_storage = %default_name,
        "Storage registry initialized"
    );

    Ok(StorageRegistry::new(
        default_name,
        Arc::new(local),
        Arc::new(staging),
    ))
}
