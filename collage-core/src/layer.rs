//! Layers - the visual building blocks placed on a surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line height multiplier applied to text boxes.
pub const TEXT_LINE_HEIGHT: f32 = 1.16;

/// Average glyph advance as a fraction of the font size, used to estimate text box width.
const AVERAGE_GLYPH_ADVANCE: f32 = 0.6;

/// Characters of text shown in a layer list entry before truncation.
const DISPLAY_NAME_CHARS: usize = 20;

/// Unique identifier for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(Uuid);

impl LayerId {
    /// Create a new unique layer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a layer ID from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Horizontal alignment of text inside its box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Flush left.
    #[default]
    Left,
    /// Centered.
    Center,
    /// Flush right.
    Right,
    /// Justified.
    Justify,
}

/// The content a layer carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LayerKind {
    /// A raster image.
    Image {
        /// Image source path, URL or data URI.
        src: String,
        /// Decoded width of the source in pixels.
        natural_width: f32,
        /// Decoded height of the source in pixels.
        natural_height: f32,
    },

    /// An editable text box.
    Text {
        /// Text content, lines separated by `\n`.
        content: String,
        /// Font size in pixels.
        font_size: f32,
        /// Fill color as hex.
        fill: String,
        /// Font family name.
        font_family: String,
        /// Alignment inside the box.
        align: TextAlign,
    },
}

/// Position, scale and rotation of a layer in logical surface coordinates.
///
/// The origin is the layer's top-left corner; rotation is applied around it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    /// X position (pixels from left).
    pub left: f32,
    /// Y position (pixels from top).
    pub top: f32,
    /// Horizontal scale factor.
    pub scale_x: f32,
    /// Vertical scale factor.
    pub scale_y: f32,
    /// Rotation in degrees, clockwise.
    pub angle: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
        }
    }
}

impl Transform {
    /// Transform placed at the given position with unit scale.
    #[must_use]
    pub fn at(left: f32, top: f32) -> Self {
        Self {
            left,
            top,
            ..Self::default()
        }
    }
}

/// Axis-aligned bounding box in logical surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Left edge.
    pub left: f32,
    /// Top edge.
    pub top: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Bounds {
    /// Check if a point lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

/// A layer on the rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Unique identifier.
    pub id: LayerId,
    /// Layer content.
    #[serde(flatten)]
    pub kind: LayerKind,
    /// Position, scale and rotation.
    pub transform: Transform,
    /// Opacity in `[0, 1]`.
    #[serde(default = "Layer::default_opacity")]
    pub opacity: f32,
    /// Locked layers ignore pointer selection and transforms.
    #[serde(default)]
    pub locked: bool,
}

impl Layer {
    /// Create a new unlocked, fully opaque layer with the given kind.
    #[must_use]
    pub fn new(kind: LayerKind) -> Self {
        Self {
            id: LayerId::new(),
            kind,
            transform: Transform::default(),
            opacity: 1.0,
            locked: false,
        }
    }

    const fn default_opacity() -> f32 {
        1.0
    }

    /// Set the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the lock flag.
    #[must_use]
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Whether pointer gestures may select this layer.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.locked
    }

    /// Whether pointer gestures may move this layer.
    #[must_use]
    pub fn is_movable(&self) -> bool {
        !self.locked
    }

    /// Whether pointer gestures may scale or rotate this layer.
    #[must_use]
    pub fn is_resizable(&self) -> bool {
        !self.locked
    }

    /// Whether this is an image layer.
    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(self.kind, LayerKind::Image { .. })
    }

    /// Image source, if this is an image layer.
    #[must_use]
    pub fn image_src(&self) -> Option<&str> {
        match &self.kind {
            LayerKind::Image { src, .. } => Some(src),
            LayerKind::Text { .. } => None,
        }
    }

    /// Unscaled size of the layer content.
    ///
    /// Text boxes are estimated from the longest line and the line count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn intrinsic_size(&self) -> (f32, f32) {
        match &self.kind {
            LayerKind::Image {
                natural_width,
                natural_height,
                ..
            } => (*natural_width, *natural_height),
            LayerKind::Text {
                content, font_size, ..
            } => {
                let longest = content
                    .lines()
                    .map(|line| line.chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(1);
                let lines = content.lines().count().max(1);
                (
                    longest as f32 * font_size * AVERAGE_GLYPH_ADVANCE,
                    lines as f32 * font_size * TEXT_LINE_HEIGHT,
                )
            }
        }
    }

    /// Rendered width: intrinsic width times horizontal scale.
    #[must_use]
    pub fn scaled_width(&self) -> f32 {
        self.intrinsic_size().0 * self.transform.scale_x
    }

    /// Rendered height: intrinsic height times vertical scale.
    #[must_use]
    pub fn scaled_height(&self) -> f32 {
        self.intrinsic_size().1 * self.transform.scale_y
    }

    /// Axis-aligned bounding box of the transformed layer.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        let t = &self.transform;
        let (w, h) = (self.scaled_width(), self.scaled_height());
        #[allow(clippy::float_cmp)]
        let axis_aligned = t.angle == 0.0;
        if axis_aligned {
            return Bounds {
                left: t.left,
                top: t.top,
                width: w,
                height: h,
            };
        }

        let (sin, cos) = t.angle.to_radians().sin_cos();
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)]
            .map(|(x, y)| (t.left + x * cos - y * sin, t.top + x * sin + y * cos));
        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);
        Bounds {
            left: min_x,
            top: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    /// Check if a point (in logical coordinates) is within this layer's bounds.
    #[must_use]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        self.bounds().contains(x, y)
    }

    /// Label shown in a layer list.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.kind {
            LayerKind::Image { src, .. } => {
                if src.starts_with("data:") {
                    return "Image".to_string();
                }
                src.rsplit('/')
                    .next()
                    .filter(|name| !name.is_empty())
                    .map_or_else(|| "Image".to_string(), str::to_string)
            }
            LayerKind::Text { content, .. } => {
                if content.is_empty() {
                    return "Text".to_string();
                }
                let mut name: String = content.chars().take(DISPLAY_NAME_CHARS).collect();
                if content.chars().count() > DISPLAY_NAME_CHARS {
                    name.push_str("...");
                }
                name
            }
        }
    }
}

/// Expand 3-digit hex colors (`#444`) to their 6-digit form (`#444444`).
///
/// Anything else is returned unchanged.
#[must_use]
pub fn normalize_hex_color(color: &str) -> String {
    match color.strip_prefix('#') {
        Some(digits) if digits.len() == 3 && digits.chars().all(|c| c.is_ascii_hexdigit()) => {
            let mut full = String::with_capacity(7);
            full.push('#');
            for c in digits.chars() {
                full.push(c);
                full.push(c);
            }
            full
        }
        _ => color.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(natural_width: f32, natural_height: f32) -> Layer {
        Layer::new(LayerKind::Image {
            src: "/layouts/img1.jpg".to_string(),
            natural_width,
            natural_height,
        })
    }

    #[test]
    fn test_interactivity_follows_lock() {
        let layer = image(100.0, 100.0);
        assert!(layer.is_selectable() && layer.is_movable() && layer.is_resizable());

        let locked = layer.with_locked(true);
        assert!(!locked.is_selectable());
        assert!(!locked.is_movable());
        assert!(!locked.is_resizable());
    }

    #[test]
    fn test_scaled_size_and_bounds() {
        let layer = image(600.0, 400.0).with_transform(Transform {
            left: 10.0,
            top: 20.0,
            scale_x: 0.5,
            scale_y: 0.5,
            angle: 0.0,
        });
        assert!((layer.scaled_width() - 300.0).abs() < f32::EPSILON);
        assert!((layer.scaled_height() - 200.0).abs() < f32::EPSILON);
        assert!(layer.contains_point(15.0, 25.0));
        assert!(!layer.contains_point(5.0, 25.0));
        assert!(!layer.contains_point(311.0, 25.0));
        assert_eq!(
            layer.bounds(),
            Bounds {
                left: 10.0,
                top: 20.0,
                width: 300.0,
                height: 200.0,
            }
        );
    }

    #[test]
    fn test_rotated_bounds_grow() {
        let layer = image(100.0, 100.0).with_transform(Transform {
            angle: 90.0,
            ..Transform::at(200.0, 0.0)
        });
        let bounds = layer.bounds();
        assert!((bounds.left - 100.0).abs() < 1e-3);
        assert!((bounds.width - 100.0).abs() < 1e-3);
        assert!(layer.contains_point(150.0, 50.0));
        assert!(!layer.contains_point(250.0, 50.0));
    }

    #[test]
    fn test_text_intrinsic_size() {
        let layer = Layer::new(LayerKind::Text {
            content: "abcd\nab".to_string(),
            font_size: 10.0,
            fill: "#000".to_string(),
            font_family: "Roboto".to_string(),
            align: TextAlign::Left,
        });
        let (w, h) = layer.intrinsic_size();
        assert!((w - 24.0).abs() < 1e-4);
        assert!((h - 23.2).abs() < 1e-4);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(image(1.0, 1.0).display_name(), "img1.jpg");

        let inline = Layer::new(LayerKind::Image {
            src: "data:image/png;base64,AAAA".to_string(),
            natural_width: 1.0,
            natural_height: 1.0,
        });
        assert_eq!(inline.display_name(), "Image");

        let text = |content: &str| {
            Layer::new(LayerKind::Text {
                content: content.to_string(),
                font_size: 12.0,
                fill: "#000000".to_string(),
                font_family: "Arial".to_string(),
                align: TextAlign::Left,
            })
        };
        assert_eq!(text("Title").display_name(), "Title");
        assert_eq!(text("").display_name(), "Text");
        assert_eq!(
            text("Description block on the right").display_name(),
            "Description block on..."
        );
    }

    #[test]
    fn test_normalize_hex_color() {
        assert_eq!(normalize_hex_color("#444"), "#444444");
        assert_eq!(normalize_hex_color("#aBc"), "#aaBBcc");
        assert_eq!(normalize_hex_color("#123456"), "#123456");
        assert_eq!(normalize_hex_color("red"), "red");
        assert_eq!(normalize_hex_color("#xyz"), "#xyz");
    }

    #[test]
    fn test_layer_json_uses_kind_tag() {
        let json = serde_json::to_value(image(10.0, 20.0)).expect("serialize");
        assert_eq!(json["kind"], "image");
        assert_eq!(json["src"], "/layouts/img1.jpg");
        assert_eq!(json["locked"], false);
        assert_eq!(json["naturalWidth"], 10.0);
        assert_eq!(json["transform"]["scaleX"], 1.0);
        assert!(json.get("natural_width").is_none());
    }

    #[test]
    fn test_text_layer_json_fields_are_camel_case() {
        let layer = Layer::new(LayerKind::Text {
            content: "Hi".to_string(),
            font_size: 12.0,
            fill: "#000000".to_string(),
            font_family: "Roboto".to_string(),
            align: TextAlign::Center,
        });
        let json = serde_json::to_value(&layer).expect("serialize");
        assert_eq!(json["kind"], "text");
        assert_eq!(json["fontSize"], 12.0);
        assert_eq!(json["fontFamily"], "Roboto");

        let back: Layer = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, layer);
    }
}
