//! Test helpers: build the router over in-memory collaborators.
//!
//! Run with `cargo test -p attache-api`. No database or filesystem is needed; the attachment
//! service runs against the in-memory harness from `attache-services`.

use std::sync::Arc;

use attache_api::setup::routes;
use attache_api::AppState;
use attache_core::{AttacheConfig, Config, UploadLimits, UrlFetchConfig};
use attache_services::test_helpers::TestHarness;
use axum_test::TestServer;

pub use attache_services::test_helpers::fixtures;

pub const ACTOR_HEADER: &str = "X-Actor-Id";

pub fn test_config(limits: UploadLimits) -> Config {
    Config(Box::new(AttacheConfig {
        server_port: 0,
        environment: "test".to_string(),
        database_url: "postgresql://localhost/attache_test".to_string(),
        db_max_connections: 1,
        db_timeout_seconds: 5,
        upload_staging_path: "./unused/upload".to_string(),
        local_storage_path: "./unused/storage".to_string(),
        default_storage: "Local".to_string(),
        upload_limits: limits,
        schema_metadata_path: None,
        access_policy_path: None,
        url_fetch: UrlFetchConfig::default(),
        task_queue_max_workers: 1,
        task_queue_poll_interval_ms: 1000,
        task_queue_max_retries: 3,
        task_queue_default_timeout_seconds: 60,
    }))
}

/// Test application: HTTP server plus handles on the in-memory collaborators.
pub struct TestApp {
    pub server: TestServer,
    pub harness: TestHarness,
}

pub fn setup_test_app(limits: UploadLimits) -> TestApp {
    setup_with_harness(TestHarness::new(limits), limits)
}

pub fn setup_with_harness(harness: TestHarness, limits: UploadLimits) -> TestApp {
    let state = Arc::new(AppState::new(test_config(limits), harness.service.clone()));
    let router = routes::setup_routes(state);
    let server = TestServer::new(router).expect("test server");
    TestApp { server, harness }
}

pub fn api_path(path: &str) -> String {
    format!("{}{}", attache_api::constants::API_PREFIX, path)
}
