//! Image source utilities.
//!
//! Decodes images from the asset directory and from base64 or percent-encoded
//! data URIs, and provides the [`AssetFetcher`] used by the layout loader.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use collage_core::{CollageError, CollageResult, ImageFetcher, LoadedImage};

use crate::error::{RenderError, RenderResult};

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG with alpha support.
    Png,
    /// JPEG (no alpha).
    Jpeg,
    /// WebP (alpha support).
    WebP,
    /// Unknown/other format.
    Unknown,
}

impl ImageFormat {
    /// Detect format from magic bytes.
    #[must_use]
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() < 4 {
            return Self::Unknown;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Self::Png;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Self::WebP;
        }

        Self::Unknown
    }

    /// MIME type, or `None` for unknown formats.
    #[must_use]
    pub fn mime(self) -> Option<&'static str> {
        match self {
            Self::Png => Some("image/png"),
            Self::Jpeg => Some("image/jpeg"),
            Self::WebP => Some("image/webp"),
            Self::Unknown => None,
        }
    }
}

/// Read the pixel dimensions of encoded image bytes without a full decode.
///
/// # Errors
///
/// Returns an error if the format is not recognized or the header is invalid.
pub fn image_dimensions(data: &[u8]) -> RenderResult<(u32, u32)> {
    let (width, height) = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| RenderError::Resource(format!("Failed to read image header: {e}")))?
        .into_dimensions()
        .map_err(|e| RenderError::Resource(format!("Failed to decode image: {e}")))?;

    if width == 0 || height == 0 {
        return Err(RenderError::Resource("Image has zero size".to_string()));
    }
    Ok((width, height))
}

/// Decode the payload of a data URI.
///
/// Supports formats like: `data:image/png;base64,iVBORw0KGgo...`
///
/// # Errors
///
/// Returns an error if the URI is malformed.
pub fn decode_data_uri(uri: &str) -> RenderResult<Vec<u8>> {
    let uri_data = uri
        .strip_prefix("data:")
        .ok_or_else(|| RenderError::Resource("Not a data URI".to_string()))?;

    let (metadata, encoded_data) = uri_data
        .split_once(',')
        .ok_or_else(|| RenderError::Resource("Invalid data URI: missing comma".to_string()))?;

    if metadata.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(encoded_data)
            .map_err(|e| RenderError::Resource(format!("Failed to decode base64: {e}")))
    } else {
        percent_decode(encoded_data)
    }
}

/// Encode image bytes as a base64 data URI, detecting the MIME type.
#[must_use]
pub fn to_data_uri(data: &[u8]) -> String {
    let mime = ImageFormat::from_magic_bytes(data)
        .mime()
        .unwrap_or("application/octet-stream");
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    format!("data:{mime};base64,{encoded}")
}

/// Percent-decoding for non-base64 data URIs.
fn percent_decode(input: &str) -> RenderResult<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| RenderError::Resource("Invalid URL encoding".to_string()))?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }

    Ok(result)
}

/// Fetches image sources from an asset directory or inline data URIs.
///
/// Absolute sources like `/layouts/bg.jpg` resolve against the asset root.
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    root: PathBuf,
}

impl AssetFetcher {
    /// Create a fetcher serving files under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Asset root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a source path under the root, refusing to escape it.
    ///
    /// # Errors
    ///
    /// Returns an error for paths containing `..` or prefixes.
    pub fn resolve(&self, src: &str) -> RenderResult<PathBuf> {
        let relative = Path::new(src.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(RenderError::Resource(format!(
                "Source escapes the asset root: {src}"
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn read(&self, src: &str) -> RenderResult<Vec<u8>> {
        if src.starts_with("data:") {
            return decode_data_uri(src);
        }
        let path = self.resolve(src)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| RenderError::Resource(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl ImageFetcher for AssetFetcher {
    async fn fetch(&self, src: &str) -> CollageResult<LoadedImage> {
        let bytes = self.read(src).await?;
        let (width, height) = image_dimensions(&bytes)
            .map_err(|e| CollageError::ResourceLoad(format!("{src}: {e}")))?;
        tracing::debug!("Fetched {} ({width}x{height}, {} bytes)", short_src(src), bytes.len());
        Ok(LoadedImage::new(src, width, height, bytes))
    }
}

/// Source string shortened for log output; data URIs can be megabytes long.
fn short_src(src: &str) -> &str {
    if src.starts_with("data:") {
        src.split_once(',').map_or(src, |(meta, _)| meta)
    } else {
        src
    }
}
