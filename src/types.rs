//! Core request and reference types for image generation.

use serde::{Deserialize, Serialize};

/// A request to generate an image, immutable for the duration of one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Optional context from surrounding canvas nodes, prepended to the
    /// prompt.
    pub context_data: String,
    /// Reference images as data URLs, in order. Per-provider semantics
    /// vary: xAI uses only the first, OpenAI caps at five.
    pub reference_images: Vec<String>,
}

impl GenerationRequest {
    /// Creates a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context_data: String::new(),
            reference_images: Vec::new(),
        }
    }

    /// Sets the context data.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_data = context.into();
        self
    }

    /// Adds a reference image data URL.
    pub fn with_reference_image(mut self, data_url: impl Into<String>) -> Self {
        self.reference_images.push(data_url.into());
        self
    }

    /// Returns the effective prompt sent to providers.
    ///
    /// When context data is present the prompt and context are combined
    /// using a fixed template; otherwise the prompt is used unmodified.
    pub fn full_prompt(&self) -> String {
        if self.context_data.is_empty() {
            self.prompt.clone()
        } else {
            format!(
                "Context information:\n{}\n\nBased on the above context, generate an image for: {}",
                self.context_data, self.prompt
            )
        }
    }
}

/// A stored image asset, addressed by its path relative to the download
/// root with forward slashes. The only representation of a generated image
/// exchanged with callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetReference(String);

impl AssetReference {
    /// Wraps a root-relative forward-slash path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the reference as a path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AssetReference> for String {
    fn from(reference: AssetReference) -> Self {
        reference.0
    }
}
