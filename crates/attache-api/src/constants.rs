//! API constants

/// Versioned prefix of every attachment route.
pub const API_PREFIX: &str = "/api/v1";

/// Base64 inflates payloads by 4/3; requests also carry JSON framing and the data-URL prefix.
pub const REQUEST_BODY_OVERHEAD_BYTES: usize = 64 * 1024;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
