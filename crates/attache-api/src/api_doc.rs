//! OpenAPI documentation, served as JSON and through RapiDoc.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attaché API",
        version = "0.1.0",
        description = "Attachment ingestion: single-shot and chunked uploads, downloads, copies and imports from image URLs. Callers are identified by the X-Actor-Id header set by the authenticating proxy."
    ),
    paths(
        handlers::attachments::create_attachment,
        handlers::attachments::append_chunk,
        handlers::attachments::get_file,
        handlers::attachments::copy_attachment,
        handlers::attachments::create_from_image_url,
        handlers::attachments::upload_settings,
        handlers::health::liveness_check,
        handlers::health::readiness_check,
    ),
    components(schemas(
        handlers::attachments::CreateAttachmentRequest,
        handlers::attachments::CopyAttachmentRequest,
        handlers::attachments::FromImageUrlRequest,
        handlers::attachments::AttachmentResponse,
        handlers::attachments::UploadSettingsResponse,
        error::ErrorResponse,
    )),
    tags(
        (name = "attachments", description = "Attachment upload and retrieval"),
        (name = "health", description = "Liveness and readiness checks")
    )
)]
pub struct ApiDoc;
