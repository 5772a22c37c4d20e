//! Route configuration and setup

use crate::api_doc::ApiDoc;
use crate::constants::{API_PREFIX, REQUEST_BODY_OVERHEAD_BYTES};
use crate::handlers::{attachments, health};
use crate::state::AppState;
use attache_core::constants::BYTES_PER_MB;
use attache_services::SizeLimit;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Largest request body the upload routes accept, or `None` when uploads are unlimited.
///
/// A single-shot upload carries the whole file base64-encoded and a chunk carries one chunk, so
/// the bound is the larger of the upload ceiling and the chunk size, inflated by 4/3 plus framing.
pub fn request_body_limit(ceiling: SizeLimit, chunk_size_mb: u64) -> Option<usize> {
    let max_bytes = ceiling
        .max_bytes()?
        .max(chunk_size_mb.saturating_mul(BYTES_PER_MB));
    let encoded = max_bytes.div_ceil(3).saturating_mul(4);
    usize::try_from(encoded)
        .ok()
        .map(|bytes| bytes.saturating_add(REQUEST_BODY_OVERHEAD_BYTES))
}

fn attachment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/attachments", post(attachments::create_attachment))
        .route("/attachments/copy", post(attachments::copy_attachment))
        .route(
            "/attachments/from-image-url",
            post(attachments::create_from_image_url),
        )
        .route("/attachments/settings", get(attachments::upload_settings))
        .route("/attachments/{id}/chunks", post(attachments::append_chunk))
        .route("/attachments/{id}/file", get(attachments::get_file))
}

fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION, header::CONTENT_LENGTH])
}

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router {
    let body_limit = request_body_limit(
        state.attachments.upload_ceiling(),
        state.config.upload_limits().attachment_upload_chunk_size_mb,
    );
    match body_limit {
        Some(bytes) => tracing::info!(max_body_bytes = bytes, "Request body limit enabled"),
        None => tracing::info!("Uploads unlimited; request body limit disabled"),
    }

    let openapi = ApiDoc::openapi();

    let api = Router::new()
        .nest(API_PREFIX, attachment_routes())
        .route("/health", get(health::liveness_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/api/openapi.json", get(move || async move { Json(openapi) }))
        .with_state(state);

    let app = api
        .merge(utoipa_rapidoc::RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(DefaultBodyLimit::disable());

    let app = match body_limit {
        Some(bytes) => app.layer(RequestBodyLimitLayer::new(bytes)),
        None => app,
    };

    app.layer(setup_cors()).layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_unlimited_when_uploads_are_unlimited() {
        assert_eq!(request_body_limit(SizeLimit::Unlimited, 1), None);
    }

    #[test]
    fn test_body_limit_covers_base64_payload() {
        let limit = request_body_limit(SizeLimit::Bytes(3 * 1024 * 1024), 1).unwrap();
        assert_eq!(limit, 4 * 1024 * 1024 + REQUEST_BODY_OVERHEAD_BYTES);
    }

    #[test]
    fn test_body_limit_covers_chunks_larger_than_ceiling() {
        let limit = request_body_limit(SizeLimit::Bytes(3), 3).unwrap();
        assert_eq!(limit, 4 * 1024 * 1024 + REQUEST_BODY_OVERHEAD_BYTES);
    }
}
