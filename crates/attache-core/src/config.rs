//! Configuration module
//!
//! Service configuration loaded once at startup from the environment (and `.env` when present).
//! Upload limits are exposed separately as [`UploadLimits`] so the upload core can be built
//! without the rest of the server settings.

use std::env;

const SERVER_PORT: u16 = 3000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Global upload limits, in megabytes. Zero means unlimited (or, for the chunk size, that
/// clients should upload in one request).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadLimits {
    pub attachment_upload_max_size_mb: u64,
    pub inline_attachment_upload_max_size_mb: u64,
    pub attachment_upload_chunk_size_mb: u64,
}

/// Settings for fetching images from remote URLs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlFetchConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub allow_private_ips: bool,
    /// If set, only URLs from these domains (and their subdomains) are fetched.
    pub allowlist: Option<Vec<String>>,
}

impl Default for UrlFetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 10,
            max_redirects: 2,
            allow_private_ips: false,
            allowlist: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AttacheConfig {
    pub server_port: u16,
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub upload_staging_path: String,
    pub local_storage_path: String,
    pub default_storage: String,
    pub upload_limits: UploadLimits,
    pub schema_metadata_path: Option<String>,
    pub access_policy_path: Option<String>,
    pub url_fetch: UrlFetchConfig,
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    pub task_queue_max_retries: i32,
    pub task_queue_default_timeout_seconds: i32,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<AttacheConfig>);

impl Config {
    fn inner(&self) -> &AttacheConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = AttacheConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().server_port
    }

    pub fn environment(&self) -> &str {
        &self.inner().environment
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().db_timeout_seconds
    }

    pub fn upload_staging_path(&self) -> &str {
        &self.inner().upload_staging_path
    }

    pub fn local_storage_path(&self) -> &str {
        &self.inner().local_storage_path
    }

    pub fn default_storage(&self) -> &str {
        &self.inner().default_storage
    }

    pub fn upload_limits(&self) -> UploadLimits {
        self.inner().upload_limits
    }

    pub fn schema_metadata_path(&self) -> Option<&str> {
        self.inner().schema_metadata_path.as_deref()
    }

    pub fn access_policy_path(&self) -> Option<&str> {
        self.inner().access_policy_path.as_deref()
    }

    pub fn url_fetch(&self) -> &UrlFetchConfig {
        &self.inner().url_fetch
    }

    pub fn task_queue_max_workers(&self) -> usize {
        self.inner().task_queue_max_workers
    }

    pub fn task_queue_poll_interval_ms(&self) -> u64 {
        self.inner().task_queue_poll_interval_ms
    }

    pub fn task_queue_max_retries(&self) -> i32 {
        self.inner().task_queue_max_retries
    }

    pub fn task_queue_default_timeout_seconds(&self) -> i32 {
        self.inner().task_queue_default_timeout_seconds
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl AttacheConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const UPLOAD_STAGING_PATH: &str = "./data/upload";
        const LOCAL_STORAGE_PATH: &str = "./data/storage";
        const DEFAULT_STORAGE: &str = "Local";
        const URL_FETCH_CONNECT_TIMEOUT_SECS: u64 = 10;
        const URL_FETCH_TIMEOUT_SECS: u64 = 10;
        const URL_FETCH_MAX_REDIRECTS: usize = 2;
        const TASK_QUEUE_MAX_WORKERS: usize = 4;
        const TASK_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
        const TASK_QUEUE_DEFAULT_TIMEOUT_SECS: i32 = 600;
        const TASK_QUEUE_MAX_RETRIES: i32 = 3;

        let server_port = env::var("SERVER_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| SERVER_PORT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a valid number"))?;

        let config = AttacheConfig {
            server_port,
            environment: env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or_else(|_| "development".to_string()),
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            upload_staging_path: env::var("UPLOAD_STAGING_PATH")
                .unwrap_or_else(|_| UPLOAD_STAGING_PATH.to_string()),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|_| LOCAL_STORAGE_PATH.to_string()),
            default_storage: env::var("DEFAULT_STORAGE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_STORAGE.to_string()),
            upload_limits: UploadLimits {
                attachment_upload_max_size_mb: env_or("ATTACHMENT_UPLOAD_MAX_SIZE_MB", 0),
                inline_attachment_upload_max_size_mb: env_or(
                    "INLINE_ATTACHMENT_UPLOAD_MAX_SIZE_MB",
                    0,
                ),
                attachment_upload_chunk_size_mb: env_or("ATTACHMENT_UPLOAD_CHUNK_SIZE_MB", 0),
            },
            schema_metadata_path: env::var("SCHEMA_METADATA_PATH")
                .ok()
                .filter(|s| !s.is_empty()),
            access_policy_path: env::var("ACCESS_POLICY_PATH")
                .ok()
                .filter(|s| !s.is_empty()),
            url_fetch: UrlFetchConfig {
                connect_timeout_secs: env_or(
                    "URL_FETCH_CONNECT_TIMEOUT_SECS",
                    URL_FETCH_CONNECT_TIMEOUT_SECS,
                ),
                timeout_secs: env_or("URL_FETCH_TIMEOUT_SECS", URL_FETCH_TIMEOUT_SECS),
                max_redirects: env_or("URL_FETCH_MAX_REDIRECTS", URL_FETCH_MAX_REDIRECTS),
                allow_private_ips: env::var("URL_FETCH_ALLOW_PRIVATE_IPS")
                    .unwrap_or_else(|_| "false".to_string())
                    .to_lowercase()
                    .parse()
                    .unwrap_or(false),
                allowlist: env::var("URL_UPLOAD_ALLOWLIST").ok().map(|s| {
                    s.split(',')
                        .map(|domain| domain.trim().to_lowercase())
                        .filter(|domain| !domain.is_empty())
                        .collect()
                }),
            },
            task_queue_max_workers: env_or("TASK_QUEUE_MAX_WORKERS", TASK_QUEUE_MAX_WORKERS),
            task_queue_poll_interval_ms: env_or(
                "TASK_QUEUE_POLL_INTERVAL_MS",
                TASK_QUEUE_POLL_INTERVAL_MS,
            ),
            task_queue_max_retries: env_or("TASK_QUEUE_MAX_RETRIES", TASK_QUEUE_MAX_RETRIES),
            task_queue_default_timeout_seconds: env_or(
                "TASK_QUEUE_DEFAULT_TIMEOUT_SECONDS",
                TASK_QUEUE_DEFAULT_TIMEOUT_SECS,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.upload_staging_path.trim().is_empty() {
            return Err(anyhow::anyhow!("UPLOAD_STAGING_PATH must not be empty"));
        }

        if self.local_storage_path.trim().is_empty() {
            return Err(anyhow::anyhow!("LOCAL_STORAGE_PATH must not be empty"));
        }

        if self.task_queue_max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS must be at least 1"));
        }

        if self.url_fetch.timeout_secs == 0 {
            return Err(anyhow::anyhow!("URL_FETCH_TIMEOUT_SECS must be positive"));
        }

        Ok(())
    }
}
