//! OpenAI image generation provider.
//!
//! Two wire protocols, selected by whether reference images are present:
//! the plain images-generations endpoint without references, and a
//! tool-forced responses call with them. OpenAI-compatible hosts that lack
//! the responses API get the legacy multipart edits endpoint instead.

use crate::codec::{force_alpha_png, DataUrl};
use crate::config::OpenAIConfig;
use crate::error::{CanvasGenError, Result};
use crate::provider::{ImageGenProvider, IMAGE_TIMEOUT};
use crate::providers::{bearer, trim_base};
use crate::store::AssetStore;
use crate::types::{AssetReference, GenerationRequest};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const DEFAULT_HOST: &str = "api.openai.com";

/// Controller models tried in order when driving the image-generation tool.
const CONTROLLER_FALLBACK: [&str; 3] = ["gpt-5", "gpt-4.1", "gpt-4o"];

/// Reference images beyond this count are dropped without error.
const MAX_REFERENCE_IMAGES: usize = 5;

/// OpenAI image generation provider.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    store: Arc<AssetStore>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Creates a provider bound to its sub-config and the asset store.
    pub fn new(config: OpenAIConfig, store: Arc<AssetStore>, client: reqwest::Client) -> Self {
        Self {
            config,
            store,
            client,
        }
    }
}

#[async_trait]
impl ImageGenProvider for OpenAIProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<AssetReference> {
        if request.reference_images.is_empty() {
            return self.generate_image(request).await;
        }

        if self.config.base_url.contains(DEFAULT_HOST) {
            let (candidates, tool_model) = controller_candidates(&self.config.model);
            self.generate_with_tool(request, &candidates, tool_model.as_deref())
                .await
        } else {
            // Compatible servers without the responses API.
            self.edit_image(request).await
        }
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }
}

/// Returns true when the model string names an image model rather than a
/// controller chat model.
fn is_image_model(model: &str) -> bool {
    model.starts_with("gpt-image") || model.starts_with("dall-e")
}

/// Selects the ordered controller-model candidate list for the responses
/// call, and the model passed to the image-generation tool itself.
///
/// An image-model name cannot drive tool calls, so it is moved onto the
/// tool and the fixed fallback chain supplies the controller. A chat-model
/// name is tried first, then the chain. An empty name uses the chain
/// directly.
fn controller_candidates(model: &str) -> (Vec<String>, Option<String>) {
    if model.is_empty() {
        let chain = CONTROLLER_FALLBACK.iter().map(|m| m.to_string()).collect();
        return (chain, None);
    }

    if is_image_model(model) {
        let chain = CONTROLLER_FALLBACK.iter().map(|m| m.to_string()).collect();
        return (chain, Some(model.to_string()));
    }

    let mut candidates = vec![model.to_string()];
    candidates.extend(
        CONTROLLER_FALLBACK
            .iter()
            .filter(|m| **m != model)
            .map(|m| m.to_string()),
    );
    (candidates, None)
}

impl OpenAIProvider {
    /// Plain images-generations call, used when no reference images are
    /// present.
    async fn generate_image(&self, request: &GenerationRequest) -> Result<AssetReference> {
        let body = GenerationsRequest::new(
            &self.config.model,
            request.full_prompt(),
            &self.config.base_url,
        );

        let url = format!("{}/images/generations", trim_base(&self.config.base_url));
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
        self.persist_b64_png(images_response)
    }

    /// Tool-forced responses call: the controller model must invoke the
    /// image-generation tool, candidates tried in order.
    async fn generate_with_tool(
        &self,
        request: &GenerationRequest,
        candidates: &[String],
        tool_model: Option<&str>,
    ) -> Result<AssetReference> {
        let mut last_error = None;

        for candidate in candidates {
            match self.try_responses_call(request, candidate, tool_model).await {
                Ok(reference) => return Ok(reference),
                Err(e) => {
                    warn!(model = %candidate, error = %e, "controller model failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| CanvasGenError::Config("no controller model candidates".into())))
    }

    async fn try_responses_call(
        &self,
        request: &GenerationRequest,
        controller: &str,
        tool_model: Option<&str>,
    ) -> Result<AssetReference> {
        let body = ResponsesRequest::new(request, controller, tool_model);

        let url = format!("{}/responses", trim_base(&self.config.base_url));
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

        let responses: ResponsesResponse = response.json().await?;

        if let Some(error) = responses.error {
            return Err(CanvasGenError::Api {
                provider: self.name(),
                status: 0,
                message: error.message,
            });
        }

        let call = responses
            .output
            .into_iter()
            .find(|item| item.kind == "image_generation_call" && !item.result_is_empty())
            .ok_or_else(|| {
                CanvasGenError::Parse("no image_generation_call output in response".into())
            })?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(call.result.as_deref().unwrap_or_default())
            .map_err(|e| CanvasGenError::Decode(e.to_string()))?;

        let mime = match call.output_format.as_deref() {
            Some("jpeg") | Some("jpg") => "image/jpeg",
            Some("webp") => "image/webp",
            _ => "image/png",
        };

        self.store.persist(&bytes, mime)
    }

    /// Legacy multipart edits call for OpenAI-compatible hosts.
    ///
    /// Reference images are re-encoded through [`force_alpha_png`]: the
    /// edits backend rejects fully-opaque images encoded without an alpha
    /// channel.
    async fn edit_image(&self, request: &GenerationRequest) -> Result<AssetReference> {
        let mut form = reqwest::multipart::Form::new()
            .text("prompt", request.full_prompt())
            .text("n", "1")
            .text("response_format", "b64_json");

        for (i, reference) in request.reference_images.iter().enumerate() {
            if !DataUrl::is_data_url(reference) {
                return Err(CanvasGenError::Decode(
                    "only data URL images are supported for image edits".into(),
                ));
            }
            let parsed = DataUrl::parse(reference)?;
            let png = force_alpha_png(&parsed.bytes)?;

            let field_name = if i == 0 {
                "image".to_string()
            } else {
                format!("image{}", i + 1)
            };
            let part = reqwest::multipart::Part::bytes(png)
                .file_name("image.png")
                .mime_str("image/png")?;
            form = form.part(field_name, part);
        }

        let url = format!("{}/images/edits", trim_base(&self.config.base_url));
        let response = bearer(self.client.post(&url), &self.config.api_key)
            .timeout(IMAGE_TIMEOUT)
            .multipart(form)
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
        self.persist_b64_png(images_response)
    }

    fn persist_b64_png(&self, response: ImagesResponse) -> Result<AssetReference> {
        if let Some(error) = response.error {
            if !error.message.is_empty() {
                return Err(CanvasGenError::Api {
                    provider: self.name(),
                    status: 0,
                    message: error.message,
                });
            }
        }

        let b64 = response
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| CanvasGenError::Parse("no image data in response".into()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&b64)
            .map_err(|e| CanvasGenError::Decode(e.to_string()))?;

        self.store.persist(&bytes, "image/png")
    }
}

#[derive(Debug, Serialize)]
struct GenerationsRequest {
    model: String,
    prompt: String,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<String>,
}

impl GenerationsRequest {
    fn new(model: &str, prompt: String, base_url: &str) -> Self {
        // DALL-E models and non-default hosts return URLs unless base64 is
        // requested explicitly; gpt-image models on the default host reject
        // the parameter.
        let wants_b64 = !base_url.contains(DEFAULT_HOST) || model == "dall-e-2" || model == "dall-e-3";

        Self {
            model: model.to_string(),
            prompt,
            n: 1,
            response_format: wants_b64.then(|| "b64_json".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputMessage>,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
}

#[derive(Debug, Serialize)]
struct InputMessage {
    role: String,
    content: Vec<InputPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputPart {
    InputText { text: String },
    InputImage { image_url: String },
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    kind: String,
}

impl ResponsesRequest {
    fn new(req: &GenerationRequest, controller: &str, tool_model: Option<&str>) -> Self {
        let mut content = Vec::with_capacity(1 + MAX_REFERENCE_IMAGES);
        content.push(InputPart::InputText {
            text: format!(
                "You must invoke the image_generation tool to produce an image. \
                 Never answer in plain text.\n\n{}",
                req.full_prompt()
            ),
        });

        for url in req.reference_images.iter().take(MAX_REFERENCE_IMAGES) {
            content.push(InputPart::InputImage {
                image_url: url.clone(),
            });
        }

        Self {
            model: controller.to_string(),
            input: vec![InputMessage {
                role: "user".into(),
                content,
            }],
            tools: vec![Tool {
                kind: "image_generation".into(),
                model: tool_model.map(str::to_string),
            }],
            tool_choice: ToolChoice {
                kind: "image_generation".into(),
            },
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
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    output_format: Option<String>,
}

impl OutputItem {
    fn result_is_empty(&self) -> bool {
        self.result.as_deref().unwrap_or("").is_empty()
    }
}
