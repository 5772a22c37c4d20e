//! Attachment upload orchestration

pub mod chunk;
pub mod fetch;
pub mod locks;
pub mod relocation;
pub mod service;
pub mod size_limit;
pub mod ssrf;
pub mod validator;

pub use chunk::{ChunkAccumulator, ChunkOutcome};
pub use fetch::{RemoteImage, RemoteImageFetcher};
pub use locks::KeyedLocks;
pub use relocation::{RelocationOutcome, RelocationScheduler, RelocationSweeper, Relocator};
pub use service::{
    AttachmentService, ChunkedUploadRequest, CopyRequest, FetchFromUrlRequest, FileData,
    SingleShotUpload, UploadContext, UploadSettings, UploadTarget,
};
pub use size_limit::{SizeLimit, SizeLimitResolver};
pub use validator::UploadValidator;
