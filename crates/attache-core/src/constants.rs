/// Name of the staging backend that holds bytes while a chunked upload is in progress.
pub const STAGING_STORAGE: &str = "UploadDir";

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Entity types on which an administrator may upload inline attachments without a rich-text field.
pub const ADMIN_INLINE_ENTITY_TYPES: &[&str] = &["TemplateManager"];

/// Entity type for which administrators bypass the capability check.
pub const SETTINGS_ENTITY_TYPE: &str = "Settings";

/// Entity type used for capability checks on the attachment records themselves.
pub const ATTACHMENT_ENTITY_TYPE: &str = "Attachment";

/// Content types accepted when fetching an image from a remote URL.
pub const REMOTE_IMAGE_CONTENT_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// URL extension to content type, used when the remote server sends no usable `Content-Type`.
pub const IMAGE_EXTENSION_CONTENT_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

/// Payload key carrying the record id in relocation tasks.
pub const RELOCATION_TARGET_KEY: &str = "targetId";
