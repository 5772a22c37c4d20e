//! Error types module
//!
//! All failures of the upload core are unified under [`AppError`]. Each variant belongs to one
//! of four client-facing kinds ([`ErrorKind`]): malformed input, policy violation, missing
//! record, or a domain-rule violation. [`AppError::SizeMismatch`] is the domain error raised when
//! a chunked upload overshoots its declared size; the upload is unusable afterwards.
//!
//! The `Database` variant carries an `sqlx::Error` when the `sqlx` feature is enabled.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for policy violations and corrupted uploads
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Coarse classification of an error as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input; the client must correct the request.
    BadRequest,
    /// Authorization or policy-limit violation.
    Forbidden,
    /// Referenced record is absent.
    NotFound,
    /// Domain-rule violation or infrastructure failure.
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "SIZE_MISMATCH")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Field '{field}' does not exist")]
    FieldNotFound { entity_type: String, field: String },

    #[error("Field type '{field_type}' is not allowed for {role}")]
    FieldTypeNotAllowed { field_type: String, role: String },

    #[error("File size should not exceed {max_mb}Mb")]
    SizeLimitExceeded { max_mb: f64 },

    #[error("File size mismatch: declared {declared} bytes, staged {staged} bytes")]
    SizeMismatch { declared: u64, staged: u64 },

    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    #[error("Record {0} was modified concurrently")]
    VersionConflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::BadRequest(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::BadRequest(_) => (
            400,
            "BAD_REQUEST",
            false,
            Some("Check request format and parameters"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden(_) => (
            403,
            "FORBIDDEN",
            false,
            None,
            false,
            LogLevel::Warn,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Authenticate before uploading"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the attachment ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::FieldNotFound { .. } => (
            422,
            "FIELD_NOT_FOUND",
            false,
            Some("Check the target entity type and field name"),
            false,
            LogLevel::Debug,
        ),
        AppError::FieldTypeNotAllowed { .. } => (
            422,
            "FIELD_TYPE_NOT_ALLOWED",
            false,
            Some("Use a role that matches the target field type"),
            false,
            LogLevel::Debug,
        ),
        AppError::SizeLimitExceeded { .. } => (
            413,
            "SIZE_LIMIT_EXCEEDED",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::SizeMismatch { .. } => (
            409,
            "SIZE_MISMATCH",
            false,
            Some("Start a new upload; this one cannot be resumed"),
            false,
            LogLevel::Warn,
        ),
        AppError::RemoteFetch(_) => (
            422,
            "REMOTE_FETCH_FAILED",
            false,
            Some("Check that the URL is reachable and points to a supported image"),
            false,
            LogLevel::Debug,
        ),
        AppError::VersionConflict(_) => (
            409,
            "VERSION_CONFLICT",
            true,
            Some("Retry the request"),
            false,
            LogLevel::Warn,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Client-facing classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::Forbidden(_) | AppError::Unauthorized(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Error,
        }
    }

    /// True when the error means the staged bytes of a chunked upload are corrupt.
    pub fn is_terminal_for_upload(&self) -> bool {
        matches!(self, AppError::SizeMismatch { .. })
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::NotFound(_) => "NotFound",
            AppError::FieldNotFound { .. } => "FieldNotFound",
            AppError::FieldTypeNotAllowed { .. } => "FieldTypeNotAllowed",
            AppError::SizeLimitExceeded { .. } => "SizeLimitExceeded",
            AppError::SizeMismatch { .. } => "SizeMismatch",
            AppError::RemoteFetch(_) => "RemoteFetch",
            AppError::VersionConflict(_) => "VersionConflict",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            AppError::BadRequest(ref msg)
            | AppError::Forbidden(ref msg)
            | AppError::Unauthorized(ref msg)
            | AppError::NotFound(ref msg)
            | AppError::RemoteFetch(ref msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
