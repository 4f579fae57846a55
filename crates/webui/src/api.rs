//! REST API client for Stable Diffusion WebUI.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::types::{Img2ImgRequest, ImagesResponse, SamplerInfo, SdModel, Txt2ImgRequest};

/// HTTP client for a single WebUI instance.
#[derive(Clone)]
pub struct WebUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the WebUI API layer.
#[derive(Debug, thiserror::Error)]
pub enum WebUIApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("WebUI API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("WebUI returned no images")]
    NoImages,

    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl WebUIApi {
    /// Create a client whose requests time out after `timeout`.
    ///
    /// Generation calls can take minutes; pick the timeout accordingly.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, WebUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// URL used as the liveness probe.
    pub fn health_url(&self) -> String {
        self.endpoint("options")
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/sdapi/v1/{}", self.api_url, name)
    }

    /// `GET /sdapi/v1/options`: current settings, doubles as health check.
    pub async fn options(&self) -> Result<serde_json::Value, WebUIApiError> {
        let response = self.client.get(self.health_url()).send().await?;
        Self::parse_response(response).await
    }

    pub async fn txt2img(&self, request: &Txt2ImgRequest) -> Result<ImagesResponse, WebUIApiError> {
        tracing::debug!(
            width = request.width,
            height = request.height,
            steps = request.steps,
            "Sending txt2img request",
        );
        let response = self
            .client
            .post(self.endpoint("txt2img"))
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn img2img(&self, request: &Img2ImgRequest) -> Result<ImagesResponse, WebUIApiError> {
        tracing::debug!(
            inpaint = request.mask.is_some(),
            steps = request.steps,
            "Sending img2img request",
        );
        let response = self
            .client
            .post(self.endpoint("img2img"))
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn sd_models(&self) -> Result<Vec<SdModel>, WebUIApiError> {
        let response = self.client.get(self.endpoint("sd-models")).send().await?;
        Self::parse_response(response).await
    }

    pub async fn samplers(&self) -> Result<Vec<SamplerInfo>, WebUIApiError> {
        let response = self.client.get(self.endpoint("samplers")).send().await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WebUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WebUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl ImagesResponse {
    /// Decoded bytes of the first image.
    pub fn first_image(&self) -> Result<Vec<u8>, WebUIApiError> {
        let encoded = self.images.first().ok_or(WebUIApiError::NoImages)?;
        decode_image(encoded)
    }
}

/// Decode a base64 image, tolerating a `data:<mime>;base64,` prefix.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, WebUIApiError> {
    let payload = match encoded.split_once(";base64,") {
        Some((head, rest)) if head.starts_with("data:") => rest,
        _ => encoded,
    };
    Ok(STANDARD.decode(payload.trim())?)
}

pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
