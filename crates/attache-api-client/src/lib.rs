//! HTTP client for the Attaché API.
//!
//! Requests carry the actor identity headers the service expects from its authenticating
//! proxy. Domain methods, including the chunked upload helper, live in [`api`].

pub mod api;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub use api::{AttachmentResponse, NewAttachment, UploadProgress, UploadSettings};

/// Versioned route prefix of the attachment API.
pub const API_PREFIX: &str = "/api/v1";

/// Identity forwarded to the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    actor: Actor,
}

impl ApiClient {
    pub fn new(base_url: String, actor: Actor) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            actor,
        })
    }

    /// Create client from environment: ATTACHE_API_URL (or API_URL) and ATTACHE_ACTOR_ID.
    /// `ATTACHE_ACTOR_ROLE=admin` sends requests as an administrator.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("ATTACHE_API_URL")
            .or_else(|_| std::env::var("API_URL"))
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let id = std::env::var("ATTACHE_ACTOR_ID").context("Missing actor. Set ATTACHE_ACTOR_ID")?;
        let is_admin = std::env::var("ATTACHE_ACTOR_ROLE")
            .map(|role| role.eq_ignore_ascii_case("admin"))
            .unwrap_or(false);

        Self::new(base_url, Actor { id, is_admin })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_actor(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("X-Actor-Id", self.actor.id.as_str());
        if self.actor.is_admin {
            request.header("X-Actor-Role", "admin")
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .apply_actor(request)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// GET request. Deserializes JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.get(self.build_url(path));
        Self::parse(self.send(request).await?).await
    }

    /// GET request returning the raw body.
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let request = self.client.get(self.build_url(path));
        let body = self
            .send(request)
            .await?
            .bytes()
            .await
            .context("Failed to read response body")?;
        Ok(body.to_vec())
    }

    /// POST JSON body and deserialize response.
    pub async fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.client.post(self.build_url(path)).json(body);
        Self::parse(self.send(request).await?).await
    }

    /// POST a plain-text body and deserialize response.
    pub async fn post_text<T: DeserializeOwned>(&self, path: &str, body: String) -> Result<T> {
        let request = self
            .client
            .post(self.build_url(path))
            .header("Content-Type", "text/plain")
            .body(body);
        Self::parse(self.send(request).await?).await
    }
}
