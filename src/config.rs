//! Configuration model and persistence.
//!
//! Provider selection is a tagged union: a `provider` discriminant plus one
//! optional sub-config per variant. The active variant is validated at
//! dispatch time, before any network activity.

use crate::error::{CanvasGenError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Provider discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenRouter chat-style image generation.
    #[default]
    OpenRouter,
    /// OpenAI image APIs (generations / responses / edits).
    OpenAI,
    /// Google generative-content API.
    Google,
    /// xAI Grok image API.
    #[serde(rename = "xai")]
    Xai,
    /// Unrecognized discriminant from an edited config file.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenRouter => write!(f, "openrouter"),
            Self::OpenAI => write!(f, "openai"),
            Self::Google => write!(f, "google"),
            Self::Xai => write!(f, "xai"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Settings for OpenRouter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// API base URL, e.g. `https://openrouter.ai/api/v1`.
    #[serde(rename = "baseURL")]
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key. Sensitive, kept in the local config only.
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

/// Settings for OpenAI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// API base URL, e.g. `https://api.openai.com/v1`.
    #[serde(rename = "baseURL")]
    pub base_url: String,
    /// Model identifier. May name an image model (`gpt-image-1`,
    /// `dall-e-3`) or a controller chat model.
    pub model: String,
    /// API key. Sensitive, kept in the local config only.
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

/// Settings for Google.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// API base URL. Defaults to the official generative-language host.
    #[serde(rename = "baseURL", default = "GoogleConfig::default_base_url")]
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key, embedded as a URL query parameter.
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

impl GoogleConfig {
    fn default_base_url() -> String {
        "https://generativelanguage.googleapis.com/v1beta".into()
    }
}

/// Settings for xAI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaiConfig {
    /// API base URL. Defaults to the official xAI host.
    #[serde(rename = "baseURL", default = "XaiConfig::default_base_url")]
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key. Sensitive, kept in the local config only.
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

impl XaiConfig {
    fn default_base_url() -> String {
        "https://api.x.ai/v1".into()
    }
}

/// The active provider's sub-config, borrowed from an [`ImageGenConfig`].
#[derive(Debug, Clone, Copy)]
pub enum ActiveProvider<'a> {
    /// OpenRouter is selected.
    OpenRouter(&'a OpenRouterConfig),
    /// OpenAI is selected.
    OpenAI(&'a OpenAIConfig),
    /// Google is selected.
    Google(&'a GoogleConfig),
    /// xAI is selected.
    Xai(&'a XaiConfig),
}

/// Image generation settings: discriminant, download root, and one
/// sub-config per provider variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenConfig {
    /// Active provider discriminant.
    pub provider: Provider,
    /// Download root, absolute or relative to the executable's directory.
    #[serde(rename = "downloadPath")]
    pub download_path: String,
    /// OpenRouter sub-config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openrouter: Option<OpenRouterConfig>,
    /// OpenAI sub-config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAIConfig>,
    /// Google sub-config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleConfig>,
    /// xAI sub-config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xai: Option<XaiConfig>,

    // Legacy flat fields from configs written before per-provider
    // sub-configs existed. Migrated on load, never written back.
    #[serde(rename = "baseURL", default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

impl ImageGenConfig {
    /// Returns the active provider's sub-config.
    ///
    /// Fails when the discriminant is unrecognized or the matching
    /// sub-config is absent.
    pub fn provider_config(&self) -> Result<ActiveProvider<'_>> {
        match self.provider {
            Provider::OpenRouter => self
                .openrouter
                .as_ref()
                .map(ActiveProvider::OpenRouter)
                .ok_or_else(|| CanvasGenError::Config("openrouter config is not set".into())),
            Provider::OpenAI => self
                .openai
                .as_ref()
                .map(ActiveProvider::OpenAI)
                .ok_or_else(|| CanvasGenError::Config("openai config is not set".into())),
            Provider::Google => self
                .google
                .as_ref()
                .map(ActiveProvider::Google)
                .ok_or_else(|| CanvasGenError::Config("google config is not set".into())),
            Provider::Xai => self
                .xai
                .as_ref()
                .map(ActiveProvider::Xai)
                .ok_or_else(|| CanvasGenError::Config("xai config is not set".into())),
            Provider::Unknown => Err(CanvasGenError::Config("unknown provider".into())),
        }
    }

    /// Migrates legacy flat `baseURL`/`model`/`apiKey` fields into the
    /// active variant's sub-config.
    fn migrate_legacy(&mut self) {
        if self.base_url.is_none() && self.model.is_none() && self.api_key.is_none() {
            return;
        }

        let base_url = self.base_url.take().unwrap_or_default();
        let model = self.model.take().unwrap_or_default();
        let api_key = self.api_key.take().unwrap_or_default();

        match self.provider {
            Provider::OpenRouter => {
                self.openrouter = Some(OpenRouterConfig {
                    base_url,
                    model,
                    api_key,
                });
            }
            Provider::OpenAI => {
                self.openai = Some(OpenAIConfig {
                    base_url,
                    model,
                    api_key,
                });
            }
            Provider::Google => {
                self.google = Some(GoogleConfig {
                    base_url: GoogleConfig::default_base_url(),
                    model,
                    api_key,
                });
            }
            Provider::Xai => {
                self.xai = Some(XaiConfig {
                    base_url: XaiConfig::default_base_url(),
                    model,
                    api_key,
                });
            }
            Provider::Unknown => {}
        }
    }
}

/// The application's local settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Image generation settings.
    #[serde(rename = "imageGen")]
    pub image_gen: ImageGenConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_gen: ImageGenConfig {
                provider: Provider::OpenRouter,
                download_path: "Image/".into(),
                openrouter: Some(OpenRouterConfig {
                    base_url: "https://openrouter.ai/api/v1".into(),
                    model: "sourceful/riverflow-v2-standard-preview".into(),
                    api_key: String::new(),
                }),
                openai: Some(OpenAIConfig {
                    base_url: "https://api.openai.com/v1".into(),
                    model: "gpt-image-1.5".into(),
                    api_key: String::new(),
                }),
                google: Some(GoogleConfig {
                    base_url: GoogleConfig::default_base_url(),
                    model: "gemini-2.5-flash-image".into(),
                    api_key: String::new(),
                }),
                xai: Some(XaiConfig {
                    base_url: XaiConfig::default_base_url(),
                    model: "grok-imagine-image".into(),
                    api_key: String::new(),
                }),
                base_url: None,
                model: None,
                api_key: None,
            },
        }
    }
}

/// Loads and saves the application configuration.
///
/// Reads take a shared lock and return a snapshot clone; saves take the
/// exclusive lock and swap the in-memory snapshot only after the file
/// write succeeded.
pub struct ConfigService {
    config: RwLock<Config>,
    config_path: PathBuf,
}

impl ConfigService {
    /// Creates a service backed by `config.json` under the user config
    /// directory, loading an existing file or writing the defaults.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CanvasGenError::Config("could not get user config directory".into()))?
            .join("canvasgen");

        std::fs::create_dir_all(&config_dir)
            .map_err(|e| CanvasGenError::io(config_dir.display().to_string(), e))?;

        Self::with_path(config_dir.join("config.json"))
    }

    /// Creates a service backed by an explicit config file path.
    pub fn with_path(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        let service = Self {
            config: RwLock::new(Config::default()),
            config_path,
        };

        if service.config_path.exists() {
            if let Err(e) = service.load() {
                tracing::warn!(error = %e, "failed to load config, continuing with defaults");
            }
        } else {
            let default = service.get();
            if let Err(e) = service.save(default) {
                tracing::warn!(error = %e, "failed to save default config");
            }
        }

        Ok(service)
    }

    /// Returns a snapshot of the current configuration.
    pub fn get(&self) -> Config {
        self.config.read().clone()
    }

    /// Persists the configuration to disk and swaps the in-memory snapshot.
    pub fn save(&self, cfg: Config) -> Result<()> {
        let mut guard = self.config.write();

        let data = serde_json::to_string_pretty(&cfg)?;
        std::fs::write(&self.config_path, data)
            .map_err(|e| CanvasGenError::io(self.config_path.display().to_string(), e))?;

        *guard = cfg;
        Ok(())
    }

    /// Reloads the configuration from disk.
    pub fn load(&self) -> Result<()> {
        let data = std::fs::read_to_string(&self.config_path)
            .map_err(|e| CanvasGenError::io(self.config_path.display().to_string(), e))?;

        let mut cfg: Config = serde_json::from_str(&data)?;
        cfg.image_gen.migrate_legacy();

        *self.config.write() = cfg;
        Ok(())
    }

    /// Resolves the configured download path to an absolute directory.
    ///
    /// Absolute paths are used verbatim; relative paths are joined onto
    /// the running executable's directory.
    pub fn resolve_download_root(&self) -> Result<PathBuf> {
        let download_path = self.config.read().image_gen.download_path.clone();

        let path = Path::new(&download_path);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }

        Ok(executable_dir()?.join(path))
    }
}

/// Returns the directory containing the running executable.
pub(crate) fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| CanvasGenError::io("current_exe", e))?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| CanvasGenError::Config("executable has no parent directory".into()))
}
