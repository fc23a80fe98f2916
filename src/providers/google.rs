//! Google generative-content image provider.

use crate::codec::DataUrl;
use crate::config::GoogleConfig;
use crate::error::{CanvasGenError, Result};
use crate::provider::{ImageGenProvider, IMAGE_TIMEOUT};
use crate::providers::trim_base;
use crate::store::AssetStore;
use crate::types::{AssetReference, GenerationRequest};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Google image generation provider.
///
/// The API key travels as a URL query parameter rather than a header.
pub struct GoogleProvider {
    config: GoogleConfig,
    store: Arc<AssetStore>,
    client: reqwest::Client,
}

impl GoogleProvider {
    /// Creates a provider bound to its sub-config and the asset store.
    pub fn new(config: GoogleConfig, store: Arc<AssetStore>, client: reqwest::Client) -> Self {
        Self {
            config,
            store,
            client,
        }
    }
}

#[async_trait]
impl ImageGenProvider for GoogleProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<AssetReference> {
        let body = GenerateContentRequest::from_generation_request(request)?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            trim_base(&self.config.base_url),
            self.config.model,
            self.config.api_key,
        );

        let response = self
            .client
            .post(&url)
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

        let content_response: GenerateContentResponse = response.json().await?;

        let candidate = content_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| CanvasGenError::Parse("no candidates in response".into()))?;

        let inline = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.inline_data)
            .find(|d| !d.data.is_empty())
            .ok_or_else(|| CanvasGenError::Parse("no image data found in response".into()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&inline.data)
            .map_err(|e| CanvasGenError::Decode(e.to_string()))?;

        self.store.persist(&bytes, &inline.mime_type)
    }

    fn name(&self) -> &'static str {
        "Google"
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mime_type", alias = "mimeType")]
    mime_type: String,
    data: String,
}

impl GenerateContentRequest {
    fn from_generation_request(req: &GenerationRequest) -> crate::error::Result<Self> {
        let mut parts = Vec::with_capacity(1 + req.reference_images.len());
        parts.push(RequestPart::Text {
            text: req.full_prompt(),
        });

        for reference in &req.reference_images {
            if !DataUrl::is_data_url(reference) {
                continue;
            }
            let (mut mime, payload) = DataUrl::split_raw(reference)?;
            if mime.is_empty() {
                mime = "image/jpeg".into();
            }
            parts.push(RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: mime,
                    data: payload,
                },
            });
        }

        Ok(Self {
            contents: vec![Content { parts }],
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInlineData {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigService};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_with(base_url: &str, dir: &std::path::Path) -> GoogleProvider {
        let service = ConfigService::with_path(dir.join("config.json")).unwrap();
        let mut cfg: Config = service.get();
        cfg.image_gen.download_path = dir.join("assets").display().to_string();
        service.save(cfg).unwrap();

        let store = Arc::new(AssetStore::new(Arc::new(service)));
        GoogleProvider::new(
            GoogleConfig {
                base_url: base_url.into(),
                model: "gemini-2.5-flash-image".into(),
                api_key: "g-key".into(),
            },
            store,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_request_text_part_first() {
        let req = GenerationRequest::new("a dog").with_context("park scene");
        let body = GenerateContentRequest::from_generation_request(&req).unwrap();
        let json = serde_json::to_value(&body).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Context information:\npark scene"));
    }

    #[test]
    fn test_request_inline_data_from_reference() {
        let req = GenerationRequest::new("a dog")
            .with_reference_image("data:image/webp;base64,AQID");
        let body = GenerateContentRequest::from_generation_request(&req).unwrap();
        let json = serde_json::to_value(&body).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/webp");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
    }

    #[test]
    fn test_request_empty_mime_defaults_to_jpeg() {
        let req = GenerationRequest::new("a dog").with_reference_image("data:image/;base64,AQID");
        // Header "data:image/;base64" has mime "image/", not empty; build
        // one with a genuinely empty header through split_raw semantics.
        let body = GenerateContentRequest::from_generation_request(&req).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/");

        let (mime, _) = DataUrl::split_raw("data:;base64,AQID").unwrap();
        assert!(mime.is_empty());
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "here"},
                        {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                    ]
                }
            }]
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        let inline = resp.candidates[0].content.parts[1].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "AQID");
    }

    #[tokio::test]
    async fn test_generate_key_in_query_not_header() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let provider = provider_with(&server.uri(), dir.path());

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-image:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                ]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reference = provider
            .generate(&GenerationRequest::new("a dog"))
            .await
            .unwrap();
        assert!(reference.as_str().ends_with(".png"));

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_generate_skips_empty_inline_data() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let provider = provider_with(&server.uri(), dir.path());

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": ""}},
                    {"inlineData": {"mimeType": "image/jpeg", "data": "AQID"}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let reference = provider
            .generate(&GenerationRequest::new("a dog"))
            .await
            .unwrap();
        assert!(reference.as_str().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_generate_no_candidates_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let provider = provider_with(&server.uri(), dir.path());

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let err = provider
            .generate(&GenerationRequest::new("a dog"))
            .await
            .unwrap_err();
        assert!(matches!(err, CanvasGenError::Parse(_)));
    }
}
