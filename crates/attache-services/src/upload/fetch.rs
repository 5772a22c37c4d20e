//! Remote image download for `fetch_from_url`

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;

use attache_core::constants::{IMAGE_EXTENSION_CONTENT_TYPES, REMOTE_IMAGE_CONTENT_TYPES};
use attache_core::{AppError, UrlFetchConfig};

use super::ssrf::validate_url_for_ssrf;

#[derive(Debug, Clone)]
pub struct RemoteImage {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Bounded HTTP fetch restricted to image content.
#[derive(Clone)]
pub struct RemoteImageFetcher {
    client: reqwest::Client,
    config: UrlFetchConfig,
}

impl RemoteImageFetcher {
    pub fn new(config: UrlFetchConfig) -> Result<Self, AppError> {
        // Redirects are followed by hand so every hop gets the full SSRF check.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn validate_target(&self, url: &str) -> Result<(), AppError> {
        validate_url_for_ssrf(
            url,
            self.config.allow_private_ips,
            self.config.allowlist.as_deref(),
        )
        .await
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "SSRF validation failed");
            AppError::RemoteFetch(format!("URL validation failed: {}", e))
        })
    }

    /// GET `url`, following at most `max_redirects` redirects. Each target is validated,
    /// including DNS resolution, before it is requested.
    async fn get_following_redirects(&self, url: &str) -> Result<reqwest::Response, AppError> {
        let mut current = url.to_string();
        for _ in 0..=self.config.max_redirects {
            self.validate_target(&current).await?;

            let response = self.client.get(&current).send().await.map_err(|e| {
                tracing::warn!(error = %e, url = %current, "Failed to download from URL");
                AppError::RemoteFetch(format!("Failed to download from URL: {}", e))
            })?;
            if !response.status().is_redirection() {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| {
                    AppError::RemoteFetch("Redirect without a Location header".to_string())
                })?;
            let next = response
                .url()
                .join(location)
                .map_err(|e| AppError::RemoteFetch(format!("Invalid redirect target: {}", e)))?;
            tracing::debug!(from = %current, to = %next, "Following redirect");
            current = next.to_string();
        }

        Err(AppError::RemoteFetch(format!(
            "Too many redirects (max {})",
            self.config.max_redirects
        )))
    }

    /// Download `url` and resolve its image content type.
    ///
    /// The type comes from the `Content-Type` header (parameters stripped) or, when the header
    /// is missing, from the URL's file extension. Anything other than png, jpeg, gif or webp is
    /// rejected.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<RemoteImage, AppError> {
        let response = self.get_following_redirects(url).await?;

        if !response.status().is_success() {
            return Err(AppError::RemoteFetch(format!(
                "URL returned status code: {}",
                response.status()
            )));
        }

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::RemoteFetch(format!("Failed to read response body: {}", e)))?;

        let content_type = header_type
            .or_else(|| content_type_from_extension(url).map(str::to_string))
            .ok_or_else(|| {
                AppError::RemoteFetch("Could not determine the content type".to_string())
            })?;

        if !REMOTE_IMAGE_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(AppError::RemoteFetch(format!(
                "Content type '{}' is not an allowed image type",
                content_type
            )));
        }

        tracing::debug!(
            url = %url,
            content_type = %content_type,
            size_bytes = bytes.len(),
            "Remote image downloaded"
        );

        Ok(RemoteImage {
            content_type,
            bytes,
        })
    }
}

/// Content type implied by the extension of the URL's last path segment.
fn content_type_from_extension(url: &str) -> Option<&'static str> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let file_name = parsed.path_segments()?.next_back()?;
    let (_, extension) = file_name.rsplit_once('.')?;
    let extension = extension.to_lowercase();
    IMAGE_EXTENSION_CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> RemoteImageFetcher {
        RemoteImageFetcher::new(UrlFetchConfig {
            allow_private_ips: true,
            ..UrlFetchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(
            content_type_from_extension("https://example.com/a/photo.jpg"),
            Some("image/jpeg")
        );
        assert_eq!(
            content_type_from_extension("https://example.com/photo.JPEG?size=large"),
            Some("image/jpeg")
        );
        assert_eq!(
            content_type_from_extension("https://example.com/anim.gif#frame"),
            Some("image/gif")
        );
        assert_eq!(content_type_from_extension("https://example.com/doc.pdf"), None);
        assert_eq!(content_type_from_extension("https://example.com/"), None);
    }

    #[tokio::test]
    async fn test_type_from_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/logo")
            .with_status(200)
            .with_header("content-type", "image/png; charset=binary")
            .with_body([0x89, b'P', b'N', b'G'])
            .create_async()
            .await;

        let image = fetcher()
            .fetch(&format!("{}/logo", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes.as_ref(), &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_type_from_extension_without_header() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/photo.jpg")
            .with_status(200)
            .with_body("jpeg bytes")
            .create_async()
            .await;

        let image = fetcher()
            .fetch(&format!("{}/photo.jpg", server.url()))
            .await
            .unwrap();
        assert_eq!(image.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_unresolvable_type_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/download")
            .with_status(200)
            .with_body("???")
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&format!("{}/download", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteFetch(_)));
    }

    #[tokio::test]
    async fn test_non_image_type_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/page.png")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&format!("{}/page.png", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteFetch(_)));
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.png")
            .with_status(404)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&format!("{}/missing.png", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteFetch(_)));
    }

    #[tokio::test]
    async fn test_private_address_rejected_by_default() {
        let fetcher = RemoteImageFetcher::new(UrlFetchConfig::default()).unwrap();
        let err = fetcher
            .fetch("http://127.0.0.1:9/logo.png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteFetch(_)));
    }

    #[tokio::test]
    async fn test_follows_redirect_within_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/old.png")
            .with_status(302)
            .with_header("location", "/new.png")
            .create_async()
            .await;
        server
            .mock("GET", "/new.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("png")
            .create_async()
            .await;

        let image = fetcher()
            .fetch(&format!("{}/old.png", server.url()))
            .await
            .unwrap();
        assert_eq!(image.bytes.as_ref(), b"png");
    }

    #[tokio::test]
    async fn test_too_many_redirects_fail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/loop.png")
            .with_status(302)
            .with_header("location", "/loop.png")
            .expect(3)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&format!("{}/loop.png", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RemoteFetch(ref msg) if msg.contains("redirects")));
    }

    #[tokio::test]
    async fn test_redirect_target_is_validated() {
        let mut server = mockito::Server::new_async().await;
        let target = server
            .mock("GET", "/elsewhere.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("GET", "/start.png")
            .with_status(302)
            .with_header(
                "location",
                &format!("http://localhost:{}/elsewhere.png", server.socket_address().port()),
            )
            .create_async()
            .await;

        let fetcher = RemoteImageFetcher::new(UrlFetchConfig {
            allow_private_ips: true,
            allowlist: Some(vec!["127.0.0.1".to_string()]),
            ..UrlFetchConfig::default()
        })
        .unwrap();
        let err = fetcher
            .fetch(&format!("{}/start.png", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RemoteFetch(ref msg) if msg.contains("validation")));
        target.assert_async().await;
    }
}
