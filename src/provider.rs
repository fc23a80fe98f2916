//! Provider trait and dispatch.

use crate::config::{ActiveProvider, ConfigService, ImageGenConfig};
use crate::error::Result;
use crate::providers::{GoogleProvider, OpenAIProvider, OpenRouterProvider, XaiProvider};
use crate::store::AssetStore;
use crate::types::{AssetReference, GenerationRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Fixed timeout for image generation calls.
pub(crate) const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);

/// Trait for image generation providers.
///
/// On success exactly one new file is written under the download root and
/// its root-relative reference is returned.
#[async_trait]
pub trait ImageGenProvider: Send + Sync {
    /// Generates an image and persists it to the asset store.
    async fn generate(&self, request: &GenerationRequest) -> Result<AssetReference>;

    /// Returns the provider name for display and diagnostics.
    fn name(&self) -> &'static str;
}

impl std::fmt::Debug for dyn ImageGenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenProvider")
            .field("name", &self.name())
            .finish()
    }
}

/// Selects and constructs the provider for the active configuration.
///
/// Fails with a configuration error when the discriminant is unrecognized
/// or its sub-config is absent. No network activity happens here.
pub fn dispatch(
    cfg: &ImageGenConfig,
    store: Arc<AssetStore>,
    client: reqwest::Client,
) -> Result<Box<dyn ImageGenProvider>> {
    Ok(match cfg.provider_config()? {
        ActiveProvider::OpenRouter(sub) => {
            Box::new(OpenRouterProvider::new(sub.clone(), store, client))
        }
        ActiveProvider::OpenAI(sub) => Box::new(OpenAIProvider::new(sub.clone(), store, client)),
        ActiveProvider::Google(sub) => Box::new(GoogleProvider::new(sub.clone(), store, client)),
        ActiveProvider::Xai(sub) => Box::new(XaiProvider::new(sub.clone(), store, client)),
    })
}

/// Entry point used by the canvas glue layer: dispatches to the configured
/// provider per call, so configuration changes take effect immediately.
pub struct ImageGenService {
    config: Arc<ConfigService>,
    store: Arc<AssetStore>,
    client: reqwest::Client,
}

impl ImageGenService {
    /// Creates a service over the shared configuration and asset store.
    pub fn new(config: Arc<ConfigService>, store: Arc<AssetStore>) -> Self {
        Self {
            config,
            store,
            client: reqwest::Client::new(),
        }
    }

    /// Generates an image using the configured provider and returns the
    /// stored asset reference.
    pub async fn generate_image(
        &self,
        prompt: &str,
        context_data: &str,
        reference_images: Vec<String>,
    ) -> Result<AssetReference> {
        let cfg = self.config.get();
        let provider = dispatch(&cfg.image_gen, self.store.clone(), self.client.clone())?;

        let request = GenerationRequest {
            prompt: prompt.to_string(),
            context_data: context_data.to_string(),
            reference_images,
        };

        tracing::debug!(
            provider = provider.name(),
            references = request.reference_images.len(),
            "dispatching image generation"
        );

        provider.generate(&request).await
    }
}
