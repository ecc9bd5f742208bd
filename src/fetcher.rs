//! Single-shot HTTP fetching of camera frames

use crate::{Config, HarvestError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Raw bytes of one frame as served by the camera host.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    /// Filename extension derived from `content_type`, without the dot
    pub extension: Option<&'static str>,
    pub captured_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Exactly one GET, no retries.
    async fn fetch(&self, url: &str) -> Result<FetchedImage, HarvestError>;
}

/// Build the client shared by the index fetch and every frame fetch.
pub fn build_http_client(config: &Config) -> Result<Client, HarvestError> {
    let mut headers = HeaderMap::new();
    let cache_control = HeaderValue::from_str(&config.cache_control)
        .map_err(|e| HarvestError::ConfigurationError(format!("cache_control: {e}")))?;
    headers.insert(CACHE_CONTROL, cache_control);

    let mut builder = Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout);

    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }

    builder
        .build()
        .map_err(|e| HarvestError::ConfigurationError(format!("HTTP client: {e}")))
}

pub struct HttpImageFetcher {
    client: Client,
    extensions: Arc<ExtensionMap>,
}

impl HttpImageFetcher {
    pub fn new(client: Client, extensions: Arc<ExtensionMap>) -> Self {
        Self { client, extensions }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, HarvestError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::HttpStatus(status.as_u16()));
        }

        let captured_at = Utc::now();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let extension = content_type
            .as_deref()
            .and_then(|ct| self.extensions.extension_for(ct));

        let data = response.bytes().await?.to_vec();
        debug!(%url, bytes = data.len(), ?content_type, "Fetched frame");

        Ok(FetchedImage {
            data,
            content_type,
            extension,
            captured_at,
        })
    }
}

/// Content type to filename extension lookup, built once before any worker
/// starts and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct ExtensionMap {
    by_mime: HashMap<&'static str, &'static str>,
}

impl ExtensionMap {
    pub fn new() -> Self {
        let known = [
            ("image/jpeg", "jpeg"),
            ("image/jpg", "jpeg"),
            ("image/pjpeg", "jpe"),
            ("image/png", "png"),
            ("image/x-png", "png"),
            ("image/gif", "gif"),
            ("image/webp", "webp"),
            ("image/bmp", "bmp"),
            ("image/x-ms-bmp", "bmp"),
            ("image/tiff", "tiff"),
            ("image/x-icon", "ico"),
            ("image/vnd.microsoft.icon", "ico"),
            ("image/avif", "avif"),
        ];

        let by_mime = known
            .into_iter()
            .map(|(mime, ext)| (mime, normalize_extension(ext)))
            .collect();

        Self { by_mime }
    }

    /// Extension for a Content-Type header value. Parameters such as
    /// `; charset=...` are ignored.
    pub fn extension_for(&self, content_type: &str) -> Option<&'static str> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.by_mime.get(mime.as_str()).copied()
    }
}

impl Default for ExtensionMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Both JPEG spellings collapse to `jpg`.
pub fn normalize_extension(ext: &'static str) -> &'static str {
    match ext {
        "jpe" | "jpeg" => "jpg",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher(timeout: Duration) -> HttpImageFetcher {
        let config = Config {
            request_timeout: timeout,
            connect_timeout: timeout,
            ..Default::default()
        };
        let client = build_http_client(&config).unwrap();
        HttpImageFetcher::new(client, Arc::new(ExtensionMap::new()))
    }

    #[test]
    fn test_extension_mapping() {
        let map = ExtensionMap::new();
        assert_eq!(map.extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(map.extension_for("image/pjpeg"), Some("jpg"));
        assert_eq!(map.extension_for("IMAGE/PNG; charset=binary"), Some("png"));
        assert_eq!(map.extension_for("image/gif"), Some("gif"));
        assert_eq!(map.extension_for("application/octet-stream"), None);
        assert_eq!(map.extension_for(""), None);
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("jpe"), "jpg");
        assert_eq!(normalize_extension("jpeg"), "jpg");
        assert_eq!(normalize_extension("png"), "png");
    }

    #[tokio::test]
    async fn test_fetch_success_sends_cache_control() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cam/1.jpg"))
            // Multi-valued headers are matched value by value.
            .and(headers(
                "cache-control",
                vec!["no-cache", "no-store", "no-transform"],
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(Duration::from_secs(5));
        let image = fetcher
            .fetch(&format!("{}/cam/1.jpg", server.uri()))
            .await
            .unwrap();

        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(image.extension, Some("jpg"));
    }

    #[tokio::test]
    async fn test_fetch_unknown_content_type_has_no_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-mystery")
                    .set_body_bytes(vec![9u8; 16]),
            )
            .mount(&server)
            .await;

        let image = test_fetcher(Duration::from_secs(5))
            .fetch(&format!("{}/frame", server.uri()))
            .await
            .unwrap();
        assert!(image.extension.is_none());
        assert_eq!(image.data.len(), 16);
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = test_fetcher(Duration::from_secs(5))
            .fetch(&format!("{}/missing.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = test_fetcher(Duration::from_millis(200))
            .fetch(&format!("{}/slow.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::NetworkError(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let err = test_fetcher(Duration::from_secs(2))
            .fetch("http://127.0.0.1:1/never.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::NetworkError(_)), "got {err:?}");
    }
}
