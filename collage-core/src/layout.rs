//! Layout templates - the starting points users pick from.

use serde::{Deserialize, Serialize};

use crate::layer::{normalize_hex_color, TextAlign};
use crate::{CollageError, CollageResult, Layer, LayerKind, Transform};

/// Image placed by a template, scaled uniformly to a declared width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image source.
    pub src: String,
    /// X position.
    pub left: f32,
    /// Y position.
    pub top: f32,
    /// Rendered width; height follows the source aspect ratio.
    pub width: f32,
    /// Stacking key; lower values are painted first.
    #[serde(default)]
    pub z_index: i32,
    /// Whether the layer starts locked.
    #[serde(default)]
    pub locked: bool,
}

/// Text box placed by a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpec {
    /// Initial text.
    pub text: String,
    /// X position.
    pub left: f32,
    /// Y position.
    pub top: f32,
    /// Font size in pixels.
    pub font_size: f32,
    /// Fill color.
    #[serde(default = "TextSpec::default_fill")]
    pub fill: String,
    /// Font family.
    #[serde(default = "TextSpec::default_font_family")]
    pub font_family: String,
    /// Alignment.
    #[serde(default)]
    pub text_align: TextAlign,
    /// Stacking key; lower values are painted first.
    #[serde(default)]
    pub z_index: i32,
    /// Whether the layer starts locked.
    #[serde(default)]
    pub locked: bool,
}

impl TextSpec {
    fn default_fill() -> String {
        "#000000".to_string()
    }

    fn default_font_family() -> String {
        "Roboto".to_string()
    }
}

/// A layer declared by a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSpec {
    /// An image layer.
    Image(ImageSpec),
    /// A text layer.
    Text(TextSpec),
}

impl LayerSpec {
    /// Stacking key.
    #[must_use]
    pub fn z_index(&self) -> i32 {
        match self {
            Self::Image(spec) => spec.z_index,
            Self::Text(spec) => spec.z_index,
        }
    }

    /// Whether the layer starts locked.
    #[must_use]
    pub fn locked(&self) -> bool {
        match self {
            Self::Image(spec) => spec.locked,
            Self::Text(spec) => spec.locked,
        }
    }
}

impl ImageSpec {
    /// Materialize the layer for a decoded source of the given natural size.
    ///
    /// The scale is uniform so the rendered width equals the declared width.
    #[must_use]
    pub fn to_layer(&self, natural_width: f32, natural_height: f32) -> Layer {
        let scale = self.width / natural_width;
        Layer::new(LayerKind::Image {
            src: self.src.clone(),
            natural_width,
            natural_height,
        })
        .with_transform(Transform {
            left: self.left,
            top: self.top,
            scale_x: scale,
            scale_y: scale,
            angle: 0.0,
        })
        .with_locked(self.locked)
    }
}

impl TextSpec {
    /// Materialize the text layer.
    #[must_use]
    pub fn to_layer(&self) -> Layer {
        Layer::new(LayerKind::Text {
            content: self.text.clone(),
            font_size: self.font_size,
            fill: self.fill.clone(),
            font_family: self.font_family.clone(),
            align: self.text_align,
        })
        .with_transform(Transform::at(self.left, self.top))
        .with_locked(self.locked)
    }
}

/// An immutable layout template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTemplate {
    /// Identifier used in routes.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Thumbnail shown in the layout chooser.
    #[serde(default)]
    pub preview: String,
    /// Canvas width in pixels.
    pub width: f32,
    /// Canvas height in pixels.
    pub height: f32,
    /// Background image, stretched to the canvas.
    pub background: String,
    /// Initial layers.
    pub layers: Vec<LayerSpec>,
}

impl LayoutTemplate {
    /// Layers sorted by ascending `z_index`, ties keeping declaration order.
    #[must_use]
    pub fn layers_in_paint_order(&self) -> Vec<&LayerSpec> {
        let mut layers: Vec<_> = self.layers.iter().collect();
        layers.sort_by_key(|spec| spec.z_index());
        layers
    }

    /// Every image source the template needs, background first, without duplicates.
    #[must_use]
    pub fn image_sources(&self) -> Vec<String> {
        let mut sources = vec![self.background.clone()];
        for spec in &self.layers {
            if let LayerSpec::Image(image) = spec {
                if !sources.contains(&image.src) {
                    sources.push(image.src.clone());
                }
            }
        }
        sources
    }
}

/// A set of layout templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutCatalog {
    templates: Vec<LayoutTemplate>,
}

impl Default for LayoutCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LayoutCatalog {
    /// Build a catalog from templates.
    #[must_use]
    pub fn new(templates: Vec<LayoutTemplate>) -> Self {
        Self { templates }
    }

    /// Parse a catalog from a JSON array of templates.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe templates.
    pub fn from_json(json: &str) -> CollageResult<Self> {
        let templates: Vec<LayoutTemplate> = serde_json::from_str(json)?;
        Ok(Self::new(templates))
    }

    /// All templates in declaration order.
    #[must_use]
    pub fn templates(&self) -> &[LayoutTemplate] {
        &self.templates
    }

    /// Look up a template by id.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::TemplateNotFound`] for unknown ids.
    pub fn get(&self, id: &str) -> CollageResult<&LayoutTemplate> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CollageError::TemplateNotFound(id.to_string()))
    }

    /// The templates shipped with the editor.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![
            LayoutTemplate {
                id: "vertical".to_string(),
                name: "Vertical layout".to_string(),
                preview: "/layouts/vertical-preview.png".to_string(),
                background: "/layouts/vertical-bg.jpg".to_string(),
                width: 1080.0,
                height: 1920.0,
                layers: vec![
                    image("/layouts/img1.jpg", 100.0, 200.0, 300.0, 0),
                    image("/layouts/img2.jpg", 680.0, 200.0, 300.0, 1),
                    text("Headline", 100.0, 600.0, 36.0, "#000000", "Montserrat", TextAlign::Left, 2),
                    text(
                        "Description on the right",
                        680.0,
                        600.0,
                        30.0,
                        "#444",
                        "Open Sans",
                        TextAlign::Center,
                        3,
                    ),
                ],
            },
            LayoutTemplate {
                id: "horizontal".to_string(),
                name: "Horizontal layout".to_string(),
                preview: "/layouts/horizontal-preview.png".to_string(),
                background: "/layouts/horizontal-bg.jpg".to_string(),
                width: 1920.0,
                height: 1080.0,
                layers: vec![
                    image("/layouts/img1.jpg", 300.0, 100.0, 400.0, 0),
                    image("/layouts/img2.jpg", 1100.0, 100.0, 400.0, 1),
                    text("Left caption", 300.0, 550.0, 28.0, "#222", "Roboto", TextAlign::Left, 2),
                    text("Right caption", 1100.0, 550.0, 28.0, "#222", "Roboto", TextAlign::Right, 3),
                ],
            },
            LayoutTemplate {
                id: "cinema-poster".to_string(),
                name: "Movie poster".to_string(),
                preview: "/layouts/poster-preview.png".to_string(),
                background: "/layouts/poster-bg.jpg".to_string(),
                width: 1080.0,
                height: 1920.0,
                layers: vec![
                    image("/layouts/poster-main.jpg", 90.0, 300.0, 900.0, 0),
                    text("MOVIE TITLE", 100.0, 100.0, 48.0, "#ffffff", "Cinzel", TextAlign::Center, 1),
                    text(
                        "In cinemas December 25",
                        100.0,
                        1250.0,
                        28.0,
                        "#ccc",
                        "Open Sans",
                        TextAlign::Center,
                        2,
                    ),
                ],
            },
        ])
    }
}

fn image(src: &str, left: f32, top: f32, width: f32, z_index: i32) -> LayerSpec {
    LayerSpec::Image(ImageSpec {
        src: src.to_string(),
        left,
        top,
        width,
        z_index,
        locked: false,
    })
}

#[allow(clippy::too_many_arguments)]
fn text(
    text: &str,
    left: f32,
    top: f32,
    font_size: f32,
    fill: &str,
    font_family: &str,
    text_align: TextAlign,
    z_index: i32,
) -> LayerSpec {
    LayerSpec::Text(TextSpec {
        text: text.to_string(),
        left,
        top,
        font_size,
        fill: normalize_hex_color(fill),
        font_family: font_family.to_string(),
        text_align,
        z_index,
        locked: false,
    })
}
