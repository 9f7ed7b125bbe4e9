use super::DiagnosticBackend;
use crate::config::WorkflowConfig;
use crate::error::{ConfigError, TransportError};
use crate::types::{ImageFile, ImageLocator};
use async_trait::async_trait;
use medilab_session::Credential;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

/// `reqwest`-backed client for the clinic backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    upload_url: Url,
    diagnosis_url: Url,
    history_url: Url,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl HttpBackend {
    /// Build a client for the endpoints in `config`
    ///
    /// # Errors
    /// Invalid endpoint URLs or a client that cannot be constructed
    pub fn new(config: &WorkflowConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            client,
            upload_url: config.upload_url()?,
            diagnosis_url: config.diagnosis_url()?,
            history_url: config.history_url()?,
        })
    }
}

#[async_trait]
impl DiagnosticBackend for HttpBackend {
    async fn upload_image(
        &self,
        image: &ImageFile,
        credential: &Credential,
    ) -> Result<ImageLocator, TransportError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.name().to_string())
            .mime_str(image.mime())?;
        let form = Form::new().part("file", part);

        tracing::debug!(url = %self.upload_url, file = image.name(), len = image.len(), "uploading image");
        let response = self
            .client
            .post(self.upload_url.clone())
            .header(AUTHORIZATION, credential.as_str())
            .multipart(form)
            .send()
            .await?;

        let body: UploadResponse = ensure_success(response).await?.json().await?;
        body.image_url
            .filter(|url| !url.trim().is_empty())
            .map(ImageLocator::new)
            .ok_or(TransportError::MissingField("image_url"))
    }

    async fn request_diagnosis(
        &self,
        locator: &ImageLocator,
        credential: &Credential,
    ) -> Result<Vec<u8>, TransportError> {
        tracing::debug!(url = %self.diagnosis_url, image = %locator, "requesting diagnosis");
        let response = self
            .client
            .post(self.diagnosis_url.clone())
            .header(AUTHORIZATION, credential.as_str())
            .form(&[("image_url", locator.as_str())])
            .send()
            .await?;

        let bytes = ensure_success(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn fetch_history(
        &self,
        credential: &Credential,
    ) -> Result<serde_json::Value, TransportError> {
        tracing::debug!(url = %self.history_url, "fetching history");
        let response = self
            .client
            .get(self.history_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, credential.as_str())
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }
}

/// Map non-2xx responses to `TransportError::Status`, preferring the
/// backend's `{ "error": ... }` message
async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.error)
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    tracing::warn!(status = status.as_u16(), message = %message, "backend returned error");
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}
