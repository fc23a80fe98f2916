//! OpenRouter chat-style image generation provider.

use crate::codec::find_inline_data_url;
use crate::config::OpenRouterConfig;
use crate::error::{CanvasGenError, Result};
use crate::provider::{ImageGenProvider, IMAGE_TIMEOUT};
use crate::providers::{bearer, trim_base};
use crate::store::AssetStore;
use crate::types::{AssetReference, GenerationRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// OpenRouter image generation provider.
pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    store: Arc<AssetStore>,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Creates a provider bound to its sub-config and the asset store.
    pub fn new(config: OpenRouterConfig, store: Arc<AssetStore>, client: reqwest::Client) -> Self {
        Self {
            config,
            store,
            client,
        }
    }
}

#[async_trait]
impl ImageGenProvider for OpenRouterProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<AssetReference> {
        let body = ChatRequest::from_generation_request(request, &self.config.model);

        let url = format!("{}/chat/completions", trim_base(&self.config.base_url));
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

        let chat_response: ChatResponse = response.json().await?;

        let message = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| CanvasGenError::Parse("no choices in response".into()))?;

        // Structured images array takes priority.
        if let Some(image) = message.images.into_iter().flatten().next() {
            return self.store.persist_from_source(&image.image_url.url).await;
        }

        // Some models embed the image as an inline data URL in the content.
        if let Some(content) = message.content.as_str() {
            if let Some(data_url) = find_inline_data_url(content) {
                return self.store.persist_from_source(data_url).await;
            }
        }

        Err(CanvasGenError::Parse("no image found in response".into()))
    }

    fn name(&self) -> &'static str {
        "OpenRouter"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    modalities: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

/// Single user message content: a plain string without reference images,
/// typed parts with them.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

impl ChatRequest {
    fn from_generation_request(req: &GenerationRequest, model: &str) -> Self {
        let full_prompt = req.full_prompt();

        let content = if req.reference_images.is_empty() {
            MessageContent::Text(full_prompt)
        } else {
            let mut parts = Vec::with_capacity(1 + req.reference_images.len());
            parts.push(ContentPart::Text { text: full_prompt });
            for url in &req.reference_images {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl { url: url.clone() },
                });
            }
            MessageContent::Parts(parts)
        };

        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content,
            }],
            modalities: vec!["image".into(), "text".into()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    images: Option<Vec<ResponseImage>>,
    /// Content may be a string or structured parts; only strings are
    /// scanned for inline data URLs.
    #[serde(default)]
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ResponseImage {
    image_url: ResponseImageUrl,
}

#[derive(Debug, Deserialize)]
struct ResponseImageUrl {
    url: String,
}
