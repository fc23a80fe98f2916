//! Data-URL, mime-type, and image re-encoding helpers.
//!
//! Leaf utilities shared by every provider and the asset store.

use crate::error::{CanvasGenError, Result};
use base64::Engine;
use std::sync::OnceLock;

/// A decoded `data:{mime};base64,{payload}` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Mime type from the header, e.g. `image/png`.
    pub mime: String,
    /// Decoded payload bytes.
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Parses a data URL, splitting on the first comma and taking the mime
    /// from the header before the first semicolon.
    pub fn parse(source: &str) -> Result<Self> {
        if !source.starts_with("data:") {
            return Err(CanvasGenError::Decode("invalid data URL format".into()));
        }

        let (header, payload) = source
            .split_once(',')
            .ok_or_else(|| CanvasGenError::Decode("invalid data URL format".into()))?;

        let mime = header
            .split(';')
            .next()
            .unwrap_or("")
            .trim_start_matches("data:")
            .to_string();

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| CanvasGenError::Decode(e.to_string()))?;

        Ok(Self { mime, bytes })
    }

    /// Splits a data URL into its mime type and raw base64 payload without
    /// decoding. Providers that re-embed the payload (Google inline_data)
    /// use this to avoid a decode/encode round trip.
    pub fn split_raw(source: &str) -> Result<(String, String)> {
        let (header, payload) = source
            .split_once(',')
            .ok_or_else(|| CanvasGenError::Decode("invalid data URL format".into()))?;

        let mime = header
            .split(';')
            .next()
            .unwrap_or("")
            .trim_start_matches("data:")
            .to_string();

        Ok((mime, payload.to_string()))
    }

    /// Encodes bytes as a data URL string.
    pub fn encode(mime: &str, bytes: &[u8]) -> String {
        format!(
            "data:{};base64,{}",
            mime,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    /// Returns true if the string looks like an image data URL.
    pub fn is_data_url(source: &str) -> bool {
        source.starts_with("data:image/")
    }
}

/// Returns the file extension for a mime type. Unknown types default to png.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Returns the mime type for a file extension. Unknown extensions default
/// to png.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// Detects the image mime type from magic bytes. Defaults to png.
pub fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return "image/png";
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return "image/webp";
    }
    "image/png"
}

/// Finds the first inline image data URL embedded in free-form text.
///
/// Some chat-style models return the image inside the message content
/// instead of a structured field.
pub fn find_inline_data_url(text: &str) -> Option<&str> {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"data:image/[^;]+;base64,[a-zA-Z0-9+/=]+")
            .expect("inline data URL pattern is valid")
    });
    re.find(text).map(|m| m.as_str())
}

/// Re-encodes an image as RGBA PNG, guaranteeing an alpha channel.
///
/// If every pixel is fully opaque, exactly one pixel's alpha is set to 254.
/// PNG encoders drop the alpha channel of fully-opaque images, and some
/// provider edit backends reject images without one.
pub fn force_alpha_png(data: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)
        .map_err(|e| CanvasGenError::Decode(format!("failed to decode image bytes: {e}")))?;

    let mut rgba = img.to_rgba8();

    if rgba.pixels().all(|p| p.0[3] == 255) {
        if let Some(pixel) = rgba.get_pixel_mut_checked(0, 0) {
            pixel.0[3] = 254;
        }
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(rgba)
        .write_to(
            &mut std::io::Cursor::new(&mut out),
            image::ImageFormat::Png,
        )
        .map_err(|e| CanvasGenError::Decode(format!("failed to encode RGBA PNG: {e}")))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_data_url_parse() {
        let url = DataUrl::encode("image/png", &[1, 2, 3]);
        let parsed = DataUrl::parse(&url).unwrap();
        assert_eq!(parsed.mime, "image/png");
        assert_eq!(parsed.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_data_url_parse_rejects_plain_url() {
        assert!(DataUrl::parse("https://example.com/a.png").is_err());
    }

    #[test]
    fn test_data_url_parse_missing_comma() {
        assert!(DataUrl::parse("data:image/png;base64").is_err());
    }

    #[test]
    fn test_data_url_split_raw() {
        let (mime, payload) = DataUrl::split_raw("data:image/jpeg;base64,AQID").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(payload, "AQID");
    }

    #[test]
    fn test_is_data_url() {
        assert!(DataUrl::is_data_url("data:image/png;base64,AQID"));
        assert!(!DataUrl::is_data_url("https://example.com/a.png"));
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/gif"), "gif");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("application/pdf"), "png");
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("jpg"), "image/jpeg");
        assert_eq!(mime_for_extension("JPEG"), "image/jpeg");
        assert_eq!(mime_for_extension("webp"), "image/webp");
        assert_eq!(mime_for_extension("bin"), "image/png");
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&PNG_MAGIC), "image/png");
        assert_eq!(sniff_mime(&JPEG_MAGIC), "image/jpeg");
        assert_eq!(sniff_mime(&WEBP_MAGIC), "image/webp");
        assert_eq!(sniff_mime(b"GIF89a\x00"), "image/gif");
        assert_eq!(sniff_mime(&[0, 1, 2]), "image/png");
    }

    #[test]
    fn test_find_inline_data_url() {
        let text = "Here is your image: data:image/png;base64,AQIDBA== done";
        assert_eq!(
            find_inline_data_url(text),
            Some("data:image/png;base64,AQIDBA==")
        );
        assert!(find_inline_data_url("no image here").is_none());
    }

    #[test]
    fn test_force_alpha_png_opaque_input() {
        // 2x2 fully opaque red image
        let mut img = image::RgbaImage::new(2, 2);
        for p in img.pixels_mut() {
            p.0 = [255, 0, 0, 255];
        }
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let out = force_alpha_png(&png).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();
        assert!(decoded.pixels().any(|p| p.0[3] != 255));
        assert_eq!(decoded.get_pixel(0, 0).0[3], 254);
    }

    #[test]
    fn test_force_alpha_png_transparent_input_untouched() {
        let mut img = image::RgbaImage::new(2, 2);
        img.get_pixel_mut(1, 1).0 = [0, 0, 0, 100];
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let out = force_alpha_png(&png).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();
        // Already had transparency, no pixel should be flipped
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
        assert_eq!(decoded.get_pixel(1, 1).0[3], 100);
    }

    #[test]
    fn test_force_alpha_png_rejects_garbage() {
        assert!(force_alpha_png(&[1, 2, 3]).is_err());
    }
}
