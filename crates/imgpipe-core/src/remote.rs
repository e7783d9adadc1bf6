//! Client for a server-side transform endpoint.
//!
//! Operations are posted to `<endpoint>/<operation>` as a multipart form with
//! the source in an `image` part and each parameter as a text field. A 2xx
//! answer carries the transformed bytes; anything else becomes
//! [`PipelineError::ServerError`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::export::ExportBlob;
use crate::pipeline::format::OutputFormat;
use crate::pipeline::ingest::SourceCandidate;

/// Transformed bytes as returned by the endpoint.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl RemoteResponse {
    /// Treat the response as an export blob, using its content type as the
    /// format.
    pub fn into_blob(self) -> PipelineResult<ExportBlob> {
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        let format = OutputFormat::parse(mime)
            .ok_or_else(|| PipelineError::UnsupportedEncoding(self.content_type.clone()))?;
        Ok(ExportBlob::new(self.bytes, format))
    }
}

/// Something that can run a named operation on an image out of process.
///
/// Uses `async_trait` so implementations can sit behind `Box<dyn RemoteTransform>`.
#[async_trait]
pub trait RemoteTransform: Send + Sync {
    async fn transform(
        &self,
        operation: &str,
        image: &SourceCandidate,
        params: &[(String, String)],
    ) -> PipelineResult<RemoteResponse>;
}

/// HTTP implementation of [`RemoteTransform`].
pub struct RemoteTransformer {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteTransformer {
    pub fn new(endpoint: &str, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::ServerError {
                status: None,
                message: format!("Cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build from the `[remote]` config section. Fails when no endpoint is set.
    pub fn from_config(config: &RemoteConfig) -> PipelineResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| PipelineError::ServerError {
                status: None,
                message: "no remote endpoint configured".to_string(),
            })?;
        Self::new(endpoint, Duration::from_millis(config.timeout_ms))
    }

    pub fn url(&self, operation: &str) -> String {
        format!("{}/{}", self.endpoint, operation.trim_matches('/'))
    }
}

/// Map a failed response to a `ServerError`.
fn status_error(status: u16, body: &str) -> PipelineError {
    let body = body.trim();
    let message = match status {
        400 if body.is_empty() => "request rejected: missing image part".to_string(),
        501 if body.is_empty() => "operation not implemented by the server".to_string(),
        _ if body.is_empty() => "request failed".to_string(),
        _ => body.to_string(),
    };
    PipelineError::ServerError {
        status: Some(status),
        message,
    }
}

#[async_trait]
impl RemoteTransform for RemoteTransformer {
    async fn transform(
        &self,
        operation: &str,
        image: &SourceCandidate,
        params: &[(String, String)],
    ) -> PipelineResult<RemoteResponse> {
        let url = self.url(operation);
        let mime = image
            .declared_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let part = reqwest::multipart::Part::bytes(image.bytes.clone())
            .file_name(image.name.clone())
            .mime_str(mime)
            .map_err(|e| PipelineError::ServerError {
                status: None,
                message: format!("Invalid media type {mime:?}: {e}"),
            })?;
        let form = params.iter().fold(
            reqwest::multipart::Form::new().part("image", part),
            |form, (key, value)| form.text(key.clone(), value.clone()),
        );

        tracing::debug!("POST {url} ({} bytes, {} param(s))", image.bytes.len(), params.len());
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::ServerError {
                status: None,
                message: format!("Request to {url} failed: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &text));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::ServerError {
                status: Some(status.as_u16()),
                message: format!("Failed to read response body: {e}"),
            })?
            .to_vec();

        tracing::debug!("{url} answered {} bytes of {content_type}", bytes.len());
        Ok(RemoteResponse {
            bytes,
            content_type,
        })
    }
}
