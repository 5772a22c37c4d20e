//! Attaché Services Layer
//!
//! This crate is the upload core: validation of upload targets, size-limit resolution, chunk
//! accumulation, the relocation bridge to the task queue and the remote image fetch. The API
//! crate depends on [`AttachmentService`] as a single facade and keeps HTTP handling thin.

pub mod upload;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use upload::{
    AttachmentService, ChunkAccumulator, ChunkOutcome, ChunkedUploadRequest, CopyRequest,
    FetchFromUrlRequest, FileData, KeyedLocks, RelocationOutcome, RelocationScheduler, RelocationSweeper, Relocator,
    RemoteImage, RemoteImageFetcher, SingleShotUpload, SizeLimit, SizeLimitResolver,
    UploadContext, UploadSettings, UploadTarget, UploadValidator,
};
