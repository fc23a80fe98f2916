#![warn(missing_docs)]
//! CanvasGen - Multi-provider image generation for canvas documents.
//!
//! This crate dispatches image generation to a user-configured provider
//! (OpenRouter, OpenAI, Google, or xAI) and manages the resulting image
//! assets on disk. Generated images are addressed by references relative
//! to a configured download root, never by raw filesystem paths.
//!
//! # Quick Start
//!
//! ```no_run
//! use canvasgen::{AssetStore, ConfigService, ImageGenService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> canvasgen::Result<()> {
//!     let config = Arc::new(ConfigService::new()?);
//!     let store = Arc::new(AssetStore::new(config.clone()));
//!     let service = ImageGenService::new(config, store.clone());
//!
//!     let reference = service
//!         .generate_image("A golden retriever puppy", "", Vec::new())
//!         .await?;
//!     let data_url = store.read_as_data_url(reference.as_str())?;
//!     println!("{}", &data_url[..64]);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
mod error;
pub mod provider;
pub mod providers;
pub mod store;
pub mod types;

// Re-export error types at crate root
pub use error::{CanvasGenError, Result};

// Re-export the types most callers need
pub use config::{
    Config, ConfigService, GoogleConfig, ImageGenConfig, OpenAIConfig, OpenRouterConfig, Provider,
    XaiConfig,
};
pub use provider::{dispatch, ImageGenProvider, ImageGenService};
pub use store::AssetStore;
pub use types::{AssetReference, GenerationRequest};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{Config, ConfigService, Provider};
    pub use crate::error::{CanvasGenError, Result};
    pub use crate::provider::{ImageGenProvider, ImageGenService};
    pub use crate::store::AssetStore;
    pub use crate::types::{AssetReference, GenerationRequest};
}
