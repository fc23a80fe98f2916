//! Local asset store for generated images.
//!
//! Persists decoded image bytes under the configured download root and
//! resolves root-relative asset references back to readable files, guarding
//! against path traversal and handling the legacy executable-relative
//! layout.

use crate::codec::{self, DataUrl};
use crate::config::{executable_dir, ConfigService};
use crate::error::{CanvasGenError, Result};
use crate::types::AssetReference;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Stores generated images and resolves asset references.
pub struct AssetStore {
    config: Arc<ConfigService>,
    client: reqwest::Client,
}

impl AssetStore {
    /// Creates a store bound to the shared configuration.
    pub fn new(config: Arc<ConfigService>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Persists raw image bytes under the download root.
    ///
    /// The filename combines a timestamp and the process id so concurrent
    /// generations never collide without a lock. Returns the path relative
    /// to the download root with forward slashes.
    pub fn persist(&self, bytes: &[u8], mime: &str) -> Result<AssetReference> {
        let root = self.config.resolve_download_root()?;

        std::fs::create_dir_all(&root)
            .map_err(|e| CanvasGenError::io(root.display().to_string(), e))?;

        let ext = codec::extension_for_mime(mime);
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("image_{}_{}.{}", timestamp, std::process::id(), ext);
        let file_path = root.join(&filename);

        std::fs::write(&file_path, bytes)
            .map_err(|e| CanvasGenError::io(file_path.display().to_string(), e))?;

        debug!(path = %file_path.display(), size = bytes.len(), "saved image asset");

        Ok(AssetReference::new(filename))
    }

    /// Persists an image given either a data URL or a plain HTTP URL.
    ///
    /// Data URLs are decoded locally; anything else is fetched with a GET,
    /// taking the mime type from the response content type or sniffing it
    /// from the bytes.
    pub async fn persist_from_source(&self, source: &str) -> Result<AssetReference> {
        if DataUrl::is_data_url(source) {
            let parsed = DataUrl::parse(source)?;
            return self.persist(&parsed.bytes, &parsed.mime);
        }

        let response = self.client.get(source).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CanvasGenError::Api {
                provider: "image download",
                status: status.as_u16(),
                message: format!("failed to download image from {source}"),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let bytes = response.bytes().await?.to_vec();
        let mime = match content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => ct.to_string(),
            _ => codec::sniff_mime(&bytes).to_string(),
        };

        self.persist(&bytes, &mime)
    }

    /// Resolves an asset reference to an absolute, security-checked path.
    ///
    /// Rejects absolute input and parent-directory segments. When the
    /// primary (download-root-relative) path does not exist, falls back to
    /// the legacy executable-relative layout if that file exists; otherwise
    /// the primary path is returned so callers get a consistent not-found
    /// error downstream.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let root = self.config.resolve_download_root()?;
        resolve_with_roots(reference, &root, executable_dir().ok().as_deref())
    }

    /// Reads an asset back as a `data:{mime};base64,{payload}` URL.
    ///
    /// Mime type is looked up from the file extension, falling back to
    /// content sniffing for unknown extensions.
    pub fn read_as_data_url(&self, reference: &str) -> Result<String> {
        let path = self.resolve(reference)?;
        let bytes =
            std::fs::read(&path).map_err(|e| CanvasGenError::io(path.display().to_string(), e))?;

        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if matches!(
                ext.to_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "gif" | "webp"
            ) =>
            {
                codec::mime_for_extension(ext)
            }
            _ => codec::sniff_mime(&bytes),
        };

        Ok(DataUrl::encode(mime, &bytes))
    }
}

/// Clean-join-revalidate path resolution against explicit roots.
///
/// Separated from [`AssetStore::resolve`] so the escape checks and the
/// legacy fallback can be exercised against arbitrary directories.
fn resolve_with_roots(
    reference: &str,
    download_root: &Path,
    exe_dir: Option<&Path>,
) -> Result<PathBuf> {
    let src = Path::new(reference);
    if src.is_absolute() {
        return Err(CanvasGenError::Security(
            "absolute paths are not allowed".into(),
        ));
    }
    if reference.contains("..") {
        return Err(CanvasGenError::Security(
            "path traversal is not allowed".into(),
        ));
    }

    // Clean the input, then re-derive the relative path after the join and
    // reject anything that escapes the root.
    let cleaned: PathBuf = src
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();

    let full_path = download_root.join(&cleaned);
    let relative = full_path
        .strip_prefix(download_root)
        .map_err(|_| CanvasGenError::Security("resolved path is outside the allowed directory".into()))?;

    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(CanvasGenError::Security(
            "resolved path is outside the allowed directory".into(),
        ));
    }

    if full_path.exists() {
        return Ok(full_path);
    }

    // Assets stored before the download-root scheme existed were relative
    // to the executable's directory.
    if let Some(exe_dir) = exe_dir {
        let compat_path = exe_dir.join(src);
        if compat_path.exists() {
            return Ok(compat_path);
        }
    }

    Ok(full_path)
}
