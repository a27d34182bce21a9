//! # Collage Renderer
//!
//! Raster export for collage surfaces.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐   ┌────────────┐
//! │ Surface  │──▶│ SVG document │──▶│ resvg pixmap  │──▶│ PNG / JPEG │
//! │ + assets │   │ (viewBox 1x) │   │ (multiplier)  │   │ data URL   │
//! └──────────┘   └──────────────┘   └───────────────┘   └────────────┘
//! ```
//!
//! Image sources are fetched by [`AssetFetcher`] from an asset directory or
//! inline data URIs, and kept on the surface so export can embed them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod export;
pub mod image;

pub use error::{RenderError, RenderResult};
pub use export::{ExportConfig, ExportFormat, ExportedImage, SceneExporter};
pub use crate::image::{AssetFetcher, ImageFormat};

/// Collage renderer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
