//! Zoom and scroll geometry for presenting a surface inside a container.
//!
//! Zoom only affects presentation: the surface's pixel size and paint scale.
//! Layer coordinates stay logical and zoom is never part of a snapshot.

use crate::surface::Surface;
use crate::{CollageError, CollageResult};

/// Smallest allowed zoom factor.
pub const MIN_ZOOM: f32 = 0.5;

/// Largest allowed zoom factor.
pub const MAX_ZOOM: f32 = 3.0;

/// Container the surface is presented in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportConfig {
    /// Visible container width in device pixels.
    pub container_width: f32,
    /// Visible container height in device pixels.
    pub container_height: f32,
    /// Fixed padding around the surface on each side.
    pub padding: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            container_width: 1280.0,
            container_height: 800.0,
            padding: 40.0,
        }
    }
}

/// Presentation geometry for one zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    /// Applied zoom.
    pub zoom: f32,
    /// Surface width in device pixels.
    pub pixel_width: f32,
    /// Surface height in device pixels.
    pub pixel_height: f32,
    /// Scrollable content width (surface plus padding).
    pub content_width: f32,
    /// Scrollable content height (surface plus padding).
    pub content_height: f32,
    /// Horizontal scroll offset centering the surface.
    pub scroll_left: f32,
    /// Vertical scroll offset centering the surface.
    pub scroll_top: f32,
}

/// Applies zoom to a surface and computes centered scroll offsets.
#[derive(Debug, Clone, Default)]
pub struct ViewportController {
    config: ViewportConfig,
}

impl ViewportController {
    /// Create a controller for the given container.
    #[must_use]
    pub fn new(config: ViewportConfig) -> Self {
        Self { config }
    }

    /// Current container configuration.
    #[must_use]
    pub fn config(&self) -> ViewportConfig {
        self.config
    }

    /// Update the container size, e.g. after a window resize.
    pub fn set_container_size(&mut self, width: f32, height: f32) {
        self.config.container_width = width;
        self.config.container_height = height;
    }

    /// Clamp a requested zoom to `[MIN_ZOOM, MAX_ZOOM]`.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::InvalidOperation`] for NaN or infinite values.
    pub fn clamp_zoom(zoom: f32) -> CollageResult<f32> {
        if !zoom.is_finite() {
            return Err(CollageError::InvalidOperation(format!(
                "zoom must be finite, got {zoom}"
            )));
        }
        Ok(zoom.clamp(MIN_ZOOM, MAX_ZOOM))
    }

    /// Largest zoom at which the whole surface fits the container, clamped.
    #[must_use]
    pub fn fit_zoom(&self, surface: &Surface) -> f32 {
        let available_w = (self.config.container_width - 2.0 * self.config.padding).max(1.0);
        let available_h = (self.config.container_height - 2.0 * self.config.padding).max(1.0);
        let fit = (available_w / surface.width()).min(available_h / surface.height());
        if fit.is_finite() {
            fit.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        }
    }

    /// Clamp and apply a zoom to the surface, returning the re-centered geometry.
    ///
    /// # Errors
    ///
    /// Returns an error for non-finite zoom values or a disposed surface.
    pub fn apply(&self, surface: &Surface, zoom: f32) -> CollageResult<ViewportGeometry> {
        let zoom = Self::clamp_zoom(zoom)?;
        surface.set_zoom(zoom)?;
        tracing::debug!("Viewport zoom set to {zoom}");
        Ok(self.recenter(surface))
    }

    /// Geometry for the surface at its current zoom.
    #[must_use]
    pub fn recenter(&self, surface: &Surface) -> ViewportGeometry {
        let zoom = surface.zoom();
        let (pixel_width, pixel_height) = surface.pixel_size();
        let content_width = pixel_width + 2.0 * self.config.padding;
        let content_height = pixel_height + 2.0 * self.config.padding;
        ViewportGeometry {
            zoom,
            pixel_width,
            pixel_height,
            content_width,
            content_height,
            scroll_left: ((content_width - self.config.container_width) / 2.0).max(0.0),
            scroll_top: ((content_height - self.config.container_height) / 2.0).max(0.0),
        }
    }
}
