//! Remote upload transport.
//!
//! The synchronizer only sees the [`Uploader`] trait. [`ImmichUploader`]
//! streams the file as a multipart form to `POST {base}/assets`, passing the
//! content identity as the device asset id so the server can recognise
//! re-uploads of the same bytes.

pub mod error;

use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

pub use error::UploadError;

use crate::identity::ContentIdentity;

/// Device name reported to the server for every asset.
pub const DEVICE_ID: &str = "immich-catalog";

/// Longest response body echoed back into an error message.
const MAX_ERROR_BODY: usize = 512;

/// Successful transport outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status_code: u16,
    /// The server already held an asset with this device asset id.
    pub duplicate: bool,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        path: &Path,
        identity: &ContentIdentity,
    ) -> Result<UploadReceipt, UploadError>;
}

#[derive(Debug, Deserialize)]
struct AssetUploadResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Uploads to an Immich server authenticated with an API key.
pub struct ImmichUploader {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ImmichUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmichUploader")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl ImmichUploader {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn assets_url(&self) -> String {
        format!("{}/assets", self.base_url)
    }
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl Uploader for ImmichUploader {
    async fn upload(
        &self,
        path: &Path,
        identity: &ContentIdentity,
    ) -> Result<UploadReceipt, UploadError> {
        let file = tokio::fs::File::open(path).await?;
        let metadata = file.metadata().await?;
        let modified = metadata.modified()?;
        // Birth time is not available on every filesystem.
        let created = metadata.created().unwrap_or(modified);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "asset".to_string());

        let part = Part::stream_with_length(
            Body::wrap_stream(ReaderStream::new(file)),
            metadata.len(),
        )
        .file_name(file_name);

        let form = Form::new()
            .part("assetData", part)
            .text("deviceAssetId", identity.device_asset_id())
            .text("deviceId", DEVICE_ID)
            .text("fileCreatedAt", rfc3339(created))
            .text("fileModifiedAt", rfc3339(modified))
            .text("isFavorite", "false");

        let response = self
            .client
            .post(self.assets_url())
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut message = status
                .canonical_reason()
                .unwrap_or("Unexpected status")
                .to_string();
            let body = body.trim();
            if !body.is_empty() {
                let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
                message = format!("{message}: {snippet}");
            }
            return Err(UploadError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let status_code = status.as_u16();
        let duplicate = match response.json::<AssetUploadResponse>().await {
            Ok(body) => {
                tracing::debug!(
                    asset_id = body.id.as_deref().unwrap_or(""),
                    status = body.status.as_deref().unwrap_or(""),
                    "Server accepted asset"
                );
                body.status.as_deref() == Some("duplicate")
            }
            Err(e) => {
                tracing::debug!(error = %e, "Upload response body was not JSON");
                false
            }
        };

        Ok(UploadReceipt {
            status_code,
            duplicate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn media_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, content).unwrap();
        p
    }

    fn uploader(server: &MockServer) -> ImmichUploader {
        ImmichUploader::new(&format!("{}/", server.uri()), "secret", Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_success_returns_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assets"))
            .and(header("x-api-key", "secret"))
            .and(body_string_contains("0123456789abcdef-5"))
            .and(body_string_contains(DEVICE_ID))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "a1", "status": "created"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "x.jpg", b"hello");
        let identity = ContentIdentity::new("0123456789abcdef", 5);

        let receipt = uploader(&server).upload(&file, &identity).await.unwrap();
        assert_eq!(
            receipt,
            UploadReceipt {
                status_code: 201,
                duplicate: false
            }
        );
    }

    #[tokio::test]
    async fn test_upload_duplicate_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "a1", "status": "duplicate"})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "x.jpg", b"hello");
        let receipt = uploader(&server)
            .upload(&file, &ContentIdentity::new("0000000000000001", 5))
            .await
            .unwrap();
        assert_eq!(receipt.status_code, 200);
        assert!(receipt.duplicate);
    }

    #[tokio::test]
    async fn test_upload_server_error_is_failure_with_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database offline"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = media_file(dir.path(), "x.jpg", b"hello");
        let err = uploader(&server)
            .upload(&file, &ContentIdentity::new("0000000000000001", 5))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert!(err.to_string().contains("database offline"));
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_io_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let err = uploader(&server)
            .upload(
                &dir.path().join("gone.jpg"),
                &ContentIdentity::new("0000000000000001", 5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let u = ImmichUploader::new("http://immich.local/api", "hunter2", Duration::from_secs(1))
            .unwrap();
        let dbg = format!("{:?}", u);
        assert!(!dbg.contains("hunter2"));
        assert_eq!(u.assets_url(), "http://immich.local/api/assets");
    }
}
