use std::collections::HashMap;
use std::sync::Arc;

use attache_core::constants::STAGING_STORAGE;

use crate::Storage;

/// Named storage backends.
///
/// Always holds the staging backend (under [`STAGING_STORAGE`]) and a default backend. Records
/// reference backends by name; a missing or unregistered name resolves to the default.
#[derive(Clone)]
pub struct StorageRegistry {
    backends: HashMap<String, Arc<dyn Storage>>,
    default_name: String,
    default_backend: Arc<dyn Storage>,
    staging: Arc<dyn Storage>,
}

impl StorageRegistry {
    pub fn new(
        default_name: impl Into<String>,
        default_backend: Arc<dyn Storage>,
        staging_backend: Arc<dyn Storage>,
    ) -> Self {
        let default_name = default_name.into();
        let mut backends: HashMap<String, Arc<dyn Storage>> = HashMap::new();
        backends.insert(STAGING_STORAGE.to_string(), staging_backend.clone());
        backends.insert(default_name.clone(), default_backend.clone());
        Self {
            backends,
            default_name,
            default_backend,
            staging: staging_backend,
        }
    }

    /// Register an additional named backend. The staging and default names are reserved.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Storage>) {
        let name = name.into();
        if name == STAGING_STORAGE || name == self.default_name {
            tracing::warn!(storage = %name, "Ignoring attempt to replace a reserved storage backend");
            return;
        }
        self.backends.insert(name, backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Storage>> {
        self.backends.get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn default_backend(&self) -> Arc<dyn Storage> {
        self.default_backend.clone()
    }

    pub fn staging(&self) -> Arc<dyn Storage> {
        self.staging.clone()
    }

    /// Backend for a record's storage name, with the name it was resolved under.
    pub fn resolve(&self, name: Option<&str>) -> (&str, Arc<dyn Storage>) {
        if let Some((name, backend)) = name.and_then(|n| self.backends.get_key_value(n)) {
            return (name.as_str(), backend.clone());
        }
        (self.default_name.as_str(), self.default_backend.clone())
    }

    /// Drop a storage name that does not refer to a registered backend.
    pub fn sanitize_name(&self, name: Option<String>) -> Option<String> {
        name.filter(|n| self.is_registered(n))
    }
}
