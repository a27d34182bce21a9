//! Surface export to raster images.
//!
//! Renders a [`Surface`] to PNG or JPEG using an SVG intermediate
//! representation and the resvg/tiny-skia rasterization pipeline. Selection
//! decorations are never drawn; only the background and the layers are.

use std::fmt::Write;
use std::sync::Arc;

use collage_core::layer::TEXT_LINE_HEIGHT;
use collage_core::storage::PREVIEW_IMAGE_KEY;
use collage_core::{Layer, LayerKind, PreviewMessage, SessionStorage, Surface, TextAlign};
use futures::channel::mpsc::UnboundedSender;
use image::ImageEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};
use crate::image::to_data_uri;

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// PNG image.
    #[default]
    Png,
    /// JPEG image, flattened onto the configured background.
    Jpeg,
}

impl ExportFormat {
    /// MIME type of the encoded output.
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Configuration for surface export.
///
/// Deserializes from camelCase JSON; missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    /// Output resolution as a multiple of the surface's logical size (default: 2.0).
    pub multiplier: f32,
    /// Output format (default: PNG).
    pub format: ExportFormat,
    /// JPEG quality 1-100 (default: 85).
    pub jpeg_quality: u8,
    /// Matte color as RGBA bytes, used when flattening transparency for JPEG.
    pub background: [u8; 4],
    /// Load system fonts so text layers rasterize (default: true).
    pub load_system_fonts: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            multiplier: 2.0,
            format: ExportFormat::Png,
            jpeg_quality: 85,
            background: [255, 255, 255, 255],
            load_system_fonts: true,
        }
    }
}

/// An encoded export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Encoding of `bytes`.
    pub format: ExportFormat,
    /// Encoded image.
    pub bytes: Vec<u8>,
}

impl ExportedImage {
    /// MIME type of the encoded image.
    #[must_use]
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    /// The image as a base64 `data:` URL.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{encoded}", self.mime())
    }
}

/// Resets a surface's zoom to 1 for the guard's lifetime.
struct ZoomReset<'a> {
    surface: &'a Surface,
    previous: f32,
}

impl<'a> ZoomReset<'a> {
    fn new(surface: &'a Surface) -> RenderResult<Self> {
        let previous = surface.zoom();
        if (previous - 1.0).abs() > f32::EPSILON {
            surface.set_zoom(1.0)?;
        }
        Ok(Self { surface, previous })
    }
}

impl Drop for ZoomReset<'_> {
    fn drop(&mut self) {
        if (self.surface.zoom() - self.previous).abs() > f32::EPSILON {
            if let Err(e) = self.surface.set_zoom(self.previous) {
                tracing::warn!("Failed to restore zoom {} after export: {e}", self.previous);
            }
        }
    }
}

/// Exports a [`Surface`] to PNG or JPEG.
pub struct SceneExporter {
    config: ExportConfig,
    fontdb: Arc<usvg::fontdb::Database>,
}

impl std::fmt::Debug for SceneExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneExporter")
            .field("config", &self.config)
            .field("fonts", &self.fontdb.len())
            .finish()
    }
}

impl SceneExporter {
    /// Create a new exporter with the given configuration.
    #[must_use]
    pub fn new(config: ExportConfig) -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        if config.load_system_fonts {
            fontdb.load_system_fonts();
            tracing::debug!("Loaded {} system font faces for export", fontdb.len());
        }
        Self {
            config,
            fontdb: Arc::new(fontdb),
        }
    }

    /// Create an exporter with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ExportConfig::default())
    }

    /// Export configuration.
    #[must_use]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Rasterize and encode the surface.
    ///
    /// Zoom is reset to 1 for the duration of the export and restored after,
    /// whether or not the export succeeds. The surface's layers are not touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplier is invalid, the surface is disposed,
    /// or rendering or encoding fails.
    pub fn export(&self, surface: &Surface) -> RenderResult<ExportedImage> {
        let _zoom = ZoomReset::new(surface)?;
        let svg = self.render_to_svg(surface)?;
        let pixmap = self.rasterize_svg(&svg)?;

        let bytes = match self.config.format {
            ExportFormat::Png => pixmap
                .encode_png()
                .map_err(|e| RenderError::Export(format!("PNG encoding failed: {e}")))?,
            ExportFormat::Jpeg => self.encode_jpeg(&pixmap)?,
        };

        tracing::debug!(
            "Exported {}x{} {:?} ({} bytes)",
            pixmap.width(),
            pixmap.height(),
            self.config.format,
            bytes.len()
        );
        Ok(ExportedImage {
            width: pixmap.width(),
            height: pixmap.height(),
            format: self.config.format,
            bytes,
        })
    }

    /// Export the surface and hand it to the preview view.
    ///
    /// The image is stored under `previewImage` in session storage and, when a
    /// channel is given, sent as a [`PreviewMessage`].
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Storage`] if the image does not fit in session
    /// storage (nothing is stored or sent), or any export error.
    pub fn publish_preview(
        &self,
        surface: &Surface,
        storage: &SessionStorage,
        preview_tx: Option<&UnboundedSender<PreviewMessage>>,
    ) -> RenderResult<ExportedImage> {
        let image = self.export(surface)?;
        let data_url = image.to_data_url();

        if let Err(e) = storage.set_item(PREVIEW_IMAGE_KEY, &data_url) {
            tracing::error!("Preview image could not be stored: {e}");
            return Err(e.into());
        }

        if let Some(tx) = preview_tx {
            if tx.unbounded_send(PreviewMessage::preview(data_url)).is_err() {
                tracing::warn!("Preview view is gone; image kept in session storage only");
            }
        }
        Ok(image)
    }

    /// Render the surface to an SVG string.
    ///
    /// The document is `multiplier` times the logical size with a view box at
    /// the logical size. Images are embedded as data URIs from the surface's
    /// decoded assets.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplier is not a positive number.
    pub fn render_to_svg(&self, surface: &Surface) -> RenderResult<String> {
        let (out_w, out_h) = self.output_dimensions(surface)?;
        let (view_w, view_h) = (surface.width(), surface.height());

        let mut svg = String::with_capacity(4096);
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{out_w}\" height=\"{out_h}\" viewBox=\"0 0 {view_w} {view_h}\">",
        );

        let _ = write!(
            svg,
            "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
            escape_xml(&surface.background_color()),
        );

        if let Some(background) = surface.background() {
            match asset_href(surface, &background.src) {
                Some(href) => {
                    let (bg_w, bg_h) = background.scaled_size();
                    let _ = write!(
                        svg,
                        "<image x=\"0\" y=\"0\" width=\"{bg_w}\" height=\"{bg_h}\" preserveAspectRatio=\"none\" xlink:href=\"{href}\"/>",
                    );
                }
                None => tracing::warn!(
                    "No decoded asset for background {}, exporting without it",
                    background.src
                ),
            }
        }

        for layer in surface.objects() {
            render_layer_svg(&mut svg, surface, &layer);
        }

        svg.push_str("</svg>");
        Ok(svg)
    }

    /// Output dimensions (width, height) in pixels.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn output_dimensions(&self, surface: &Surface) -> RenderResult<(u32, u32)> {
        let multiplier = self.config.multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(RenderError::Export(format!(
                "multiplier must be a positive number, got {multiplier}"
            )));
        }
        let out_w = (surface.width() * multiplier).round() as u32;
        let out_h = (surface.height() * multiplier).round() as u32;
        Ok((out_w.max(1), out_h.max(1)))
    }

    /// Rasterize an SVG string to a tiny-skia Pixmap.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn rasterize_svg(&self, svg_string: &str) -> RenderResult<tiny_skia::Pixmap> {
        let opt = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..usvg::Options::default()
        };
        let tree = usvg::Tree::from_str(svg_string, &opt)
            .map_err(|e| RenderError::Export(format!("SVG parsing failed: {e}")))?;

        let px_w = tree.size().width().round() as u32;
        let px_h = tree.size().height().round() as u32;

        let mut pixmap = tiny_skia::Pixmap::new(px_w.max(1), px_h.max(1))
            .ok_or_else(|| RenderError::Export("Failed to create pixmap".to_string()))?;

        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        Ok(pixmap)
    }

    /// Flatten premultiplied RGBA onto the matte color and encode as JPEG.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn encode_jpeg(&self, pixmap: &tiny_skia::Pixmap) -> RenderResult<Vec<u8>> {
        let (width, height) = (pixmap.width(), pixmap.height());
        let bg = &self.config.background;
        let mut rgb_data = Vec::with_capacity((width * height * 3) as usize);
        for pixel in pixmap.data().chunks_exact(4) {
            let inv = 1.0 - f32::from(pixel[3]) / 255.0;
            for (&value, &matte) in pixel[..3].iter().zip(&bg[..3]) {
                let blended = f32::from(matte).mul_add(inv, f32::from(value));
                rgb_data.push(blended.round().clamp(0.0, 255.0) as u8);
            }
        }

        let mut buf = std::io::Cursor::new(Vec::new());
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, self.config.jpeg_quality);
        encoder
            .write_image(&rgb_data, width, height, image::ExtendedColorType::Rgb8)
            .map_err(|e| RenderError::Export(format!("JPEG encoding failed: {e}")))?;

        Ok(buf.into_inner())
    }
}

/// Embeddable href for an image source, from the surface's decoded assets.
fn asset_href(surface: &Surface, src: &str) -> Option<String> {
    match surface.asset(src) {
        Some(asset) if !asset.bytes.is_empty() => Some(to_data_uri(&asset.bytes)),
        _ if src.starts_with("data:") => Some(escape_xml(src)),
        _ => None,
    }
}

/// Render a single layer to SVG.
fn render_layer_svg(svg: &mut String, surface: &Surface, layer: &Layer) {
    let tf = &layer.transform;
    let opacity = layer.opacity.clamp(0.0, 1.0);

    match &layer.kind {
        LayerKind::Image {
            src,
            natural_width,
            natural_height,
        } => {
            let Some(href) = asset_href(surface, src) else {
                tracing::warn!("No decoded asset for {src}, layer left out of export");
                return;
            };
            let _ = write!(
                svg,
                "<g transform=\"translate({} {}) rotate({}) scale({} {})\" opacity=\"{opacity}\"><image width=\"{natural_width}\" height=\"{natural_height}\" preserveAspectRatio=\"none\" xlink:href=\"{href}\"/></g>",
                tf.left, tf.top, tf.angle, tf.scale_x, tf.scale_y,
            );
        }

        LayerKind::Text {
            content,
            font_size,
            fill,
            font_family,
            align,
        } => {
            let (width, _) = layer.intrinsic_size();
            let (anchor, x) = match align {
                TextAlign::Left | TextAlign::Justify => ("start", 0.0),
                TextAlign::Center => ("middle", width / 2.0),
                TextAlign::Right => ("end", width),
            };
            let _ = write!(
                svg,
                "<g transform=\"translate({} {}) rotate({}) scale({} {})\" opacity=\"{opacity}\"><text font-size=\"{font_size}\" fill=\"{}\" font-family=\"{}, sans-serif\" text-anchor=\"{anchor}\" xml:space=\"preserve\">",
                tf.left,
                tf.top,
                tf.angle,
                tf.scale_x,
                tf.scale_y,
                escape_xml(fill),
                escape_xml(font_family),
            );
            let mut baseline = *font_size;
            for line in content.lines() {
                let _ = write!(
                    svg,
                    "<tspan x=\"{x}\" y=\"{baseline}\">{}</tspan>",
                    escape_xml(line)
                );
                baseline += font_size * TEXT_LINE_HEIGHT;
            }
            svg.push_str("</text></g>");
        }
    }
}

/// Escape special XML characters.
fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
