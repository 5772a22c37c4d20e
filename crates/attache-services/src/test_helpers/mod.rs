//! Test helpers for the upload core
//!
//! In-memory stores, a recording task scheduler, a memory storage backend and fixtures, so the
//! services can be exercised without a database or filesystem. Enabled for this crate's tests
//! and for other crates through the `test-helpers` feature.

pub mod fixtures;
pub mod mock_repositories;
pub mod mock_storage;

pub use mock_repositories::{MemoryAttachmentStore, RecordingScheduler};
pub use mock_storage::MemoryStorage;

use std::sync::Arc;

use futures::TryStreamExt;

use attache_core::{AccessControl, AccessPolicy, PolicyAccessControl, UploadLimits, UrlFetchConfig};
use attache_storage::{ByteStream, StorageRegistry};

use crate::upload::{AttachmentService, UploadContext};

/// An [`AttachmentService`] wired to in-memory collaborators, with handles to inspect them.
pub struct TestHarness {
    pub service: AttachmentService,
    pub store: Arc<MemoryAttachmentStore>,
    pub staging: Arc<MemoryStorage>,
    pub local: Arc<MemoryStorage>,
    pub scheduler: Arc<RecordingScheduler>,
}

impl TestHarness {
    /// Harness where every actor may do everything.
    pub fn new(limits: UploadLimits) -> Self {
        Self::with_acl(
            limits,
            Arc::new(PolicyAccessControl::new(AccessPolicy::allow_all())),
        )
    }

    pub fn with_acl(limits: UploadLimits, acl: Arc<dyn AccessControl>) -> Self {
        let store = Arc::new(MemoryAttachmentStore::new());
        let staging = Arc::new(MemoryStorage::new());
        let local = Arc::new(MemoryStorage::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let registry = StorageRegistry::new("Local", local.clone(), staging.clone());

        let service = AttachmentService::new(UploadContext {
            store: store.clone(),
            storage: Arc::new(registry),
            metadata: Arc::new(fixtures::metadata()),
            acl,
            scheduler: scheduler.clone(),
            limits,
            // Remote fetch tests run against a local mock server.
            url_fetch: UrlFetchConfig {
                allow_private_ips: true,
                ..UrlFetchConfig::default()
            },
        })
        .expect("test attachment service");

        Self {
            service,
            store,
            staging,
            local,
            scheduler,
        }
    }
}

/// Read a byte stream to the end.
pub async fn collect_stream(stream: ByteStream) -> Vec<u8> {
    let chunks: Vec<bytes::Bytes> = stream.try_collect().await.expect("stream read");
    chunks.concat()
}
