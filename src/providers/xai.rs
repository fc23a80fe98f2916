//! xAI Grok image generation provider.

use crate::config::XaiConfig;
use crate::error::{CanvasGenError, Result};
use crate::provider::{ImageGenProvider, IMAGE_TIMEOUT};
use crate::providers::{bearer, trim_base};
use crate::store::AssetStore;
use crate::types::{AssetReference, GenerationRequest};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// xAI image generation provider.
///
/// Supports at most one reference image; extras are silently dropped. A
/// reference switches the call from the generation endpoint to the edit
/// endpoint.
pub struct XaiProvider {
    config: XaiConfig,
    store: Arc<AssetStore>,
    client: reqwest::Client,
}

impl XaiProvider {
    /// Creates a provider bound to its sub-config and the asset store.
    pub fn new(config: XaiConfig, store: Arc<AssetStore>, client: reqwest::Client) -> Self {
        Self {
            config,
            store,
            client,
        }
    }
}

#[async_trait]
impl ImageGenProvider for XaiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<AssetReference> {
        let body = ImagesRequest::from_generation_request(request, &self.config.model);

        let endpoint = if body.image.is_some() {
            "images/edits"
        } else {
            "images/generations"
        };
        let url = format!("{}/{}", trim_base(&self.config.base_url), endpoint);

        let response = bearer(self.client.post(&url), &self.config.api_key)
            .timeout(IMAGE_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CanvasGenError::Api {
                provider: self.name(),
                status: status.as_u16(),
                message: text,
            });
        }

        let images_response: ImagesResponse = response.json().await?;

        if let Some(error) = images_response.error {
            return Err(CanvasGenError::Api {
                provider: self.name(),
                status: 0,
                message: error.message,
            });
        }

        let image = images_response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CanvasGenError::Parse("no image data in response".into()))?;

        if let Some(b64) = image.b64_json.filter(|b| !b.is_empty()) {
            // xAI returns JPEG for generated images.
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&b64)
                .map_err(|e| CanvasGenError::Decode(e.to_string()))?;
            return self.store.persist(&bytes, "image/jpeg");
        }

        if let Some(url) = image.url.filter(|u| !u.is_empty()) {
            return self.store.persist_from_source(&url).await;
        }

        Err(CanvasGenError::Parse("no image data in response".into()))
    }

    fn name(&self) -> &'static str {
        "xAI"
    }
}

#[derive(Debug, Serialize)]
struct ImagesRequest {
    model: String,
    prompt: String,
    response_format: String,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageUrl>,
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

impl ImagesRequest {
    fn from_generation_request(req: &GenerationRequest, model: &str) -> Self {
        // Only the first reference image is supported; the rest are
        // dropped without error.
        let image = req
            .reference_images
            .first()
            .map(|url| ImageUrl { url: url.clone() });

        Self {
            model: model.to_string(),
            prompt: req.full_prompt(),
            response_format: "b64_json".into(),
            n: 1,
            image,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigService};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_with(base_url: &str, dir: &std::path::Path) -> XaiProvider {
        let service = ConfigService::with_path(dir.join("config.json")).unwrap();
        let mut cfg: Config = service.get();
        cfg.image_gen.download_path = dir.join("assets").display().to_string();
        service.save(cfg).unwrap();

        let store = Arc::new(AssetStore::new(Arc::new(service)));
        XaiProvider::new(
            XaiConfig {
                base_url: base_url.into(),
                model: "grok-imagine-image".into(),
                api_key: "xai-key".into(),
            },
            store,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_request_without_reference() {
        let req = GenerationRequest::new("a city");
        let body = ImagesRequest::from_generation_request(&req, "grok-imagine-image");
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["response_format"], "b64_json");
        assert_eq!(json["n"], 1);
        assert!(json.get("image").is_none());
    }

    #[test]
    fn test_request_keeps_only_first_reference() {
        let req = GenerationRequest::new("a city")
            .with_reference_image("data:image/png;base64,AA==")
            .with_reference_image("data:image/png;base64,BB==")
            .with_reference_image("data:image/png;base64,CC==");
        let body = ImagesRequest::from_generation_request(&req, "m");
        let json = serde_json::to_value(&body).unwrap();

        assert!(json["image"]["url"].as_str().unwrap().ends_with("AA=="));
        assert!(!json.to_string().contains("BB=="));
        assert!(!json.to_string().contains("CC=="));
    }

    #[tokio::test]
    async fn test_edit_endpoint_used_with_reference() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let provider = provider_with(&server.uri(), dir.path());

        Mock::given(method("POST"))
            .and(path("/images/edits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"b64_json": "AQID"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest::new("a city")
            .with_reference_image("data:image/png;base64,AA==")
            .with_reference_image("data:image/png;base64,BB==")
            .with_reference_image("data:image/png;base64,CC==");
        let reference = provider.generate(&request).await.unwrap();
        assert!(reference.as_str().ends_with(".jpg"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["image"]["url"].as_str().unwrap().ends_with("AA=="));
    }

    #[tokio::test]
    async fn test_generation_endpoint_used_without_reference() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let provider = provider_with(&server.uri(), dir.path());

        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"b64_json": "AQID"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        provider
            .generate(&GenerationRequest::new("a city"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_url_fallback_when_b64_absent() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let provider = provider_with(&server.uri(), dir.path());

        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"url": format!("{}/img.jpg", server.uri())}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reference = provider
            .generate(&GenerationRequest::new("a city"))
            .await
            .unwrap();
        assert!(reference.as_str().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_error_message_in_2xx_body() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let provider = provider_with(&server.uri(), dir.path());

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "error": {"message": "content moderated"}
            })))
            .mount(&server)
            .await;

        let err = provider
            .generate(&GenerationRequest::new("a city"))
            .await
            .unwrap_err();
        match err {
            CanvasGenError::Api { message, .. } => assert_eq!(message, "content moderated"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
