//! Scene store: the editor-facing view of the active surface.
//!
//! A [`SceneStore`] is a cloneable handle passed to every component that needs
//! the layer list or the selection. It mirrors the bound [`Surface`] through
//! an event subscription that is released when the surface is unbound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::layer::normalize_hex_color;
use crate::loader::LoadedImage;
use crate::surface::{SelectionOrigin, Subscription, Surface, SurfaceEvent};
use crate::{CollageError, CollageResult, Layer, LayerId, LayerKind, TextAlign};

/// Direction for moving a layer in the display list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerMove {
    /// Towards the top of the list (painted later).
    Up,
    /// Towards the bottom of the list (painted earlier).
    Down,
}

/// A pointer-driven transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Drag by an offset in logical pixels.
    Move {
        /// Horizontal offset.
        dx: f32,
        /// Vertical offset.
        dy: f32,
    },
    /// Scale uniformly by a factor.
    Scale {
        /// Multiplier applied to both scale axes.
        factor: f32,
    },
    /// Rotate by an angle.
    Rotate {
        /// Degrees added to the current angle.
        degrees: f32,
    },
}

struct Binding {
    surface: Surface,
    _subscription: Subscription,
}

#[derive(Default)]
struct StoreState {
    binding: Option<Binding>,
    layers: Vec<Layer>,
    selected: Option<LayerId>,
}

struct StoreInner {
    state: RwLock<StoreState>,
    skip_locked_check: AtomicBool,
}

/// Shared scene state: bound surface, derived layer list and selection.
///
/// # Example
///
/// ```
/// use collage_core::{Layer, LayerKind, SceneStore, Surface, TextAlign};
///
/// let store = SceneStore::new();
/// let surface = Surface::new(1080.0, 1920.0);
/// store.bind_surface(Some(surface.clone()));
///
/// let id = surface
///     .add(Layer::new(LayerKind::Text {
///         content: "Hello".to_string(),
///         font_size: 24.0,
///         fill: "#000000".to_string(),
///         font_family: "Roboto".to_string(),
///         align: TextAlign::Left,
///     }))
///     .unwrap();
///
/// assert_eq!(store.layers()[0].id, id);
/// store.bind_surface(None);
/// assert!(store.layers().is_empty());
/// ```
#[derive(Clone)]
pub struct SceneStore {
    inner: Arc<StoreInner>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SceneStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SceneStore")
            .field("bound", &state.binding.is_some())
            .field("layers", &state.layers.len())
            .field("selected", &state.selected)
            .finish_non_exhaustive()
    }
}

impl SceneStore {
    /// Create a store with no surface bound.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState::default()),
                skip_locked_check: AtomicBool::new(false),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Replace the active surface. `None` detaches the current one.
    ///
    /// The previous subscription is released before the new one is made, and
    /// the layer list and selection are re-derived from the new surface.
    pub fn bind_surface(&self, surface: Option<Surface>) {
        let previous = self.write().binding.take();
        drop(previous);
        self.inner.skip_locked_check.store(false, Ordering::SeqCst);

        let Some(surface) = surface else {
            let mut state = self.write();
            state.layers.clear();
            state.selected = None;
            tracing::debug!("Scene store unbound");
            return;
        };

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let subscription = surface.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                SceneStore { inner }.handle_event(*event);
            }
        });

        let layers = display_order(surface.objects());
        let selected = surface.active_object();
        let mut state = self.write();
        state.layers = layers;
        state.selected = selected;
        state.binding = Some(Binding {
            surface,
            _subscription: subscription,
        });
        tracing::debug!("Scene store bound to surface with {} layers", state.layers.len());
    }

    /// The bound surface, if any.
    #[must_use]
    pub fn surface(&self) -> Option<Surface> {
        self.read().binding.as_ref().map(|b| b.surface.clone())
    }

    /// Re-derive the layer list and selection from the bound surface.
    pub fn refresh(&self) {
        let Some(surface) = self.surface() else {
            return;
        };
        let layers = display_order(surface.objects());
        let active = surface.active_object();
        let mut state = self.write();
        state.layers = layers;
        state.selected = active;
    }

    fn require_surface(&self) -> CollageResult<Surface> {
        self.surface().ok_or(CollageError::NoSurface)
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    /// Layers topmost first: the reverse of the surface paint order.
    #[must_use]
    pub fn layers(&self) -> Vec<Layer> {
        self.read().layers.clone()
    }

    /// ID of the selected layer.
    #[must_use]
    pub fn selected_id(&self) -> Option<LayerId> {
        self.read().selected
    }

    /// The selected layer.
    #[must_use]
    pub fn selected_layer(&self) -> Option<Layer> {
        let state = self.read();
        let id = state.selected?;
        state.layers.iter().find(|l| l.id == id).cloned()
    }

    // -----------------------------------------------------------------------
    // Selection and lock policy
    // -----------------------------------------------------------------------

    /// Allow the next selection event to select a locked layer.
    ///
    /// The flag is consumed by the next selection event, whatever its target.
    pub fn set_skip_locked_check(&self, skip: bool) {
        self.inner.skip_locked_check.store(skip, Ordering::SeqCst);
    }

    /// Whether the one-shot lock override is armed.
    #[must_use]
    pub fn skip_locked_check(&self) -> bool {
        self.inner.skip_locked_check.load(Ordering::SeqCst)
    }

    /// Whether a pointer selection of `layer` would currently be honored.
    #[must_use]
    pub fn is_selectable(&self, layer: &Layer) -> bool {
        layer.is_selectable() || self.skip_locked_check()
    }

    /// Select a layer from the layer list. Locked layers are allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the layer does not exist.
    pub fn select_layer(&self, id: LayerId) -> CollageResult<()> {
        self.require_surface()?
            .set_active_object(id, SelectionOrigin::LayerList)
    }

    /// Pointer selection at a logical point. Returns the resulting selection.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or it has been disposed.
    pub fn select_at(&self, x: f32, y: f32) -> CollageResult<Option<LayerId>> {
        self.require_surface()?.select_at(x, y)?;
        Ok(self.selected_id())
    }

    /// Clear the selection.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or it has been disposed.
    pub fn clear_selection(&self) -> CollageResult<()> {
        self.require_surface()?.discard_active_object()
    }

    fn handle_event(&self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::ObjectAdded(_) | SurfaceEvent::ObjectModified(_) => self.refresh_layers(),
            SurfaceEvent::ObjectRemoved(id) => {
                self.refresh_layers();
                let mut state = self.write();
                if state.selected == Some(id) {
                    state.selected = None;
                }
            }
            SurfaceEvent::SelectionCreated { id, origin }
            | SurfaceEvent::SelectionUpdated { id, origin } => self.on_selection(id, origin),
            SurfaceEvent::SelectionCleared => self.write().selected = None,
        }
    }

    fn refresh_layers(&self) {
        if let Some(surface) = self.surface() {
            let layers = display_order(surface.objects());
            self.write().layers = layers;
        }
    }

    fn on_selection(&self, id: LayerId, origin: SelectionOrigin) {
        let skip = self.inner.skip_locked_check.swap(false, Ordering::SeqCst);
        let Some(surface) = self.surface() else {
            return;
        };

        let locked = surface.object(id).is_some_and(|l| l.locked);
        if locked && origin == SelectionOrigin::Pointer && !skip {
            tracing::debug!("Suppressing pointer selection of locked layer {id}");
            self.write().selected = None;
            if let Err(e) = surface.discard_active_object() {
                tracing::warn!("Failed to clear selection of locked layer {id}: {e}");
            }
            return;
        }
        self.write().selected = Some(id);
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Remove the selected layer. Returns it, or `None` if nothing was selected.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the removal fails.
    pub fn delete_selected(&self) -> CollageResult<Option<Layer>> {
        let surface = self.require_surface()?;
        let Some(id) = self.selected_id() else {
            return Ok(None);
        };
        let removed = surface.remove(id)?;
        surface.prune_assets();
        Ok(Some(removed))
    }

    /// Swap the layer at `display_index` with its neighbour in the display list.
    ///
    /// Returns `false` when the move would leave the list.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the reorder fails.
    pub fn move_layer(&self, display_index: usize, direction: LayerMove) -> CollageResult<bool> {
        let surface = self.require_surface()?;
        let layers = self.layers();
        let target = match direction {
            LayerMove::Up => display_index.checked_sub(1),
            LayerMove::Down => display_index.checked_add(1),
        };
        let (Some(layer), Some(target)) = (layers.get(display_index), target) else {
            return Ok(false);
        };
        if target >= layers.len() {
            return Ok(false);
        }

        surface.move_to(layer.id, layers.len() - 1 - target)?;
        Ok(true)
    }

    /// Lock or unlock a layer.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the layer does not exist.
    pub fn set_locked(&self, id: LayerId, locked: bool) -> CollageResult<()> {
        self.require_surface()?.modify(id, |layer| layer.locked = locked)
    }

    /// Set a layer's opacity, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound, the layer does not exist, or the
    /// value is not a number.
    pub fn set_opacity(&self, id: LayerId, opacity: f32) -> CollageResult<()> {
        if opacity.is_nan() {
            return Err(CollageError::InvalidOperation(
                "opacity must be a number".to_string(),
            ));
        }
        let opacity = opacity.clamp(0.0, 1.0);
        self.require_surface()?.modify(id, |layer| layer.opacity = opacity)
    }

    /// Change a text layer's font family.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the layer is not a text layer.
    pub fn set_font_family(&self, id: LayerId, family: &str) -> CollageResult<()> {
        let family = family.to_string();
        self.modify_text(id, move |kind| {
            if let LayerKind::Text { font_family, .. } = kind {
                *font_family = family;
            }
        })
    }

    /// Change a text layer's fill color. Short hex colors are expanded.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the layer is not a text layer.
    pub fn set_fill(&self, id: LayerId, color: &str) -> CollageResult<()> {
        let color = normalize_hex_color(color);
        self.modify_text(id, move |kind| {
            if let LayerKind::Text { fill, .. } = kind {
                *fill = color;
            }
        })
    }

    /// Change a text layer's alignment.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the layer is not a text layer.
    pub fn set_text_align(&self, id: LayerId, align: TextAlign) -> CollageResult<()> {
        self.modify_text(id, move |kind| {
            if let LayerKind::Text { align: current, .. } = kind {
                *current = align;
            }
        })
    }

    /// Replace a text layer's content.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the layer is not a text layer.
    pub fn set_text(&self, id: LayerId, text: &str) -> CollageResult<()> {
        let text = text.to_string();
        self.modify_text(id, move |kind| {
            if let LayerKind::Text { content, .. } = kind {
                *content = text;
            }
        })
    }

    fn modify_text<F>(&self, id: LayerId, f: F) -> CollageResult<()>
    where
        F: FnOnce(&mut LayerKind),
    {
        let surface = self.require_surface()?;
        let layer = surface
            .object(id)
            .ok_or_else(|| CollageError::LayerNotFound(id.to_string()))?;
        if layer.is_image() {
            return Err(CollageError::InvalidOperation(format!(
                "layer {id} is not a text layer"
            )));
        }
        surface.modify(id, |layer| f(&mut layer.kind))
    }

    /// Apply a pointer gesture. Locked layers are left untouched and `false` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound, the layer does not exist, or a
    /// scale factor is not a positive number.
    pub fn apply_gesture(&self, id: LayerId, gesture: Gesture) -> CollageResult<bool> {
        let surface = self.require_surface()?;
        let layer = surface
            .object(id)
            .ok_or_else(|| CollageError::LayerNotFound(id.to_string()))?;

        let allowed = match gesture {
            Gesture::Move { .. } => layer.is_movable(),
            Gesture::Scale { .. } | Gesture::Rotate { .. } => layer.is_resizable(),
        };
        if !allowed {
            tracing::debug!("Ignoring {gesture:?} on locked layer {id}");
            return Ok(false);
        }
        if let Gesture::Scale { factor } = gesture {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(CollageError::InvalidOperation(format!(
                    "scale factor must be positive, got {factor}"
                )));
            }
        }

        surface.modify(id, |layer| {
            let t = &mut layer.transform;
            match gesture {
                Gesture::Move { dx, dy } => {
                    t.left += dx;
                    t.top += dy;
                }
                Gesture::Scale { factor } => {
                    t.scale_x *= factor;
                    t.scale_y *= factor;
                }
                Gesture::Rotate { degrees } => t.angle = (t.angle + degrees).rem_euclid(360.0),
            }
        })?;
        Ok(true)
    }

    /// Swap an image layer's source, keeping its position, scale, angle, opacity,
    /// lock flag and stacking position. The new layer becomes selected.
    ///
    /// # Errors
    ///
    /// Returns an error if no surface is bound or the layer is not an image layer.
    pub fn replace_image(&self, id: LayerId, image: Arc<LoadedImage>) -> CollageResult<LayerId> {
        let surface = self.require_surface()?;
        let old = surface
            .object(id)
            .ok_or_else(|| CollageError::LayerNotFound(id.to_string()))?;
        if !old.is_image() {
            return Err(CollageError::InvalidOperation(format!(
                "layer {id} is not an image layer"
            )));
        }

        let (natural_width, natural_height) = image.natural_size();
        let mut replacement = Layer::new(LayerKind::Image {
            src: image.src.clone(),
            natural_width,
            natural_height,
        })
        .with_transform(old.transform)
        .with_locked(old.locked);
        replacement.opacity = old.opacity;
        let new_id = replacement.id;

        surface.register_asset(image)?;
        surface.replace(id, replacement)?;
        surface.prune_assets();
        surface.set_active_object(new_id, SelectionOrigin::Programmatic)?;
        Ok(new_id)
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Display order is the reverse of paint order: topmost layer first.
#[must_use]
pub fn display_order(mut paint_order: Vec<Layer>) -> Vec<Layer> {
    paint_order.reverse();
    paint_order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transform;

    fn text_layer(content: &str, left: f32, top: f32) -> Layer {
        Layer::new(LayerKind::Text {
            content: content.to_string(),
            font_size: 20.0,
            fill: "#000000".to_string(),
            font_family: "Roboto".to_string(),
            align: TextAlign::Left,
        })
        .with_transform(Transform::at(left, top))
    }

    fn image_layer(left: f32, top: f32) -> Layer {
        Layer::new(LayerKind::Image {
            src: "/layouts/img1.jpg".to_string(),
            natural_width: 100.0,
            natural_height: 50.0,
        })
        .with_transform(Transform::at(left, top))
    }

    fn bound_store() -> (SceneStore, Surface) {
        let store = SceneStore::new();
        let surface = Surface::new(800.0, 600.0);
        store.bind_surface(Some(surface.clone()));
        (store, surface)
    }

    fn ids(layers: &[Layer]) -> Vec<LayerId> {
        layers.iter().map(|l| l.id).collect()
    }

    #[test]
    fn test_layers_are_reverse_paint_order() {
        let (store, surface) = bound_store();
        let a = surface.add(text_layer("a", 0.0, 0.0)).expect("add");
        let b = surface.add(text_layer("b", 0.0, 0.0)).expect("add");
        let c = surface.add(text_layer("c", 0.0, 0.0)).expect("add");

        assert_eq!(ids(&store.layers()), vec![c, b, a]);
        let mut paint = ids(&surface.objects());
        paint.reverse();
        assert_eq!(ids(&store.layers()), paint);
    }

    #[test]
    fn test_bind_mirrors_existing_content() {
        let surface = Surface::new(800.0, 600.0);
        let a = surface.add(text_layer("a", 0.0, 0.0)).expect("add");
        surface
            .set_active_object(a, SelectionOrigin::Programmatic)
            .expect("select");

        let store = SceneStore::new();
        store.bind_surface(Some(surface));
        assert_eq!(ids(&store.layers()), vec![a]);
        assert_eq!(store.selected_id(), Some(a));
    }

    #[test]
    fn test_unbind_releases_subscription() {
        let (store, surface) = bound_store();
        assert_eq!(surface.subscriber_count(), 1);

        store.bind_surface(None);
        assert_eq!(surface.subscriber_count(), 0);
        assert!(store.surface().is_none());

        surface.add(text_layer("late", 0.0, 0.0)).expect("add");
        assert!(store.layers().is_empty());
    }

    #[test]
    fn test_rebinding_switches_surfaces() {
        let (store, first) = bound_store();
        first.add(text_layer("a", 0.0, 0.0)).expect("add");

        let second = Surface::new(400.0, 400.0);
        store.bind_surface(Some(second.clone()));
        assert_eq!(first.subscriber_count(), 0);
        assert_eq!(second.subscriber_count(), 1);
        assert!(store.layers().is_empty());
        assert_eq!(store.surface(), Some(second));
    }

    #[test]
    fn test_removing_selected_layer_clears_selection() {
        let (store, surface) = bound_store();
        let a = surface.add(text_layer("a", 0.0, 0.0)).expect("add");
        store.select_layer(a).expect("select");
        assert_eq!(store.selected_id(), Some(a));

        surface.remove(a).expect("remove");
        assert!(store.selected_id().is_none());
        assert!(store.selected_layer().is_none());
    }

    #[test]
    fn test_pointer_selection_of_locked_layer_is_suppressed() {
        let (store, surface) = bound_store();
        let locked = surface
            .add(image_layer(10.0, 10.0).with_locked(true))
            .expect("add");

        assert!(!store.is_selectable(&surface.object(locked).expect("layer")));
        assert_eq!(store.select_at(20.0, 20.0).expect("click"), None);
        assert!(surface.active_object().is_none());
    }

    #[test]
    fn test_locked_pointer_selection_clears_previous_selection() {
        let (store, surface) = bound_store();
        let free = surface.add(text_layer("free", 500.0, 500.0)).expect("add");
        let _locked = surface
            .add(image_layer(10.0, 10.0).with_locked(true))
            .expect("add");

        store.select_layer(free).expect("select");
        assert_eq!(store.select_at(20.0, 20.0).expect("click"), None);
        assert!(store.selected_id().is_none());
    }

    #[test]
    fn test_skip_flag_allows_exactly_one_selection() {
        let (store, surface) = bound_store();
        let locked = surface
            .add(image_layer(10.0, 10.0).with_locked(true))
            .expect("add");
        let layer = surface.object(locked).expect("layer");

        store.set_skip_locked_check(true);
        assert!(store.is_selectable(&layer));
        assert_eq!(store.select_at(20.0, 20.0).expect("click"), Some(locked));
        assert!(!store.skip_locked_check());
        assert!(!store.is_selectable(&layer));

        store.clear_selection().expect("clear");
        assert_eq!(store.select_at(20.0, 20.0).expect("click again"), None);
    }

    #[test]
    fn test_layer_list_selects_locked_layer() {
        let (store, surface) = bound_store();
        let locked = surface
            .add(image_layer(10.0, 10.0).with_locked(true))
            .expect("add");

        store.select_layer(locked).expect("select");
        assert_eq!(store.selected_id(), Some(locked));
        assert!(!store.skip_locked_check());
    }

    #[test]
    fn test_move_layer_up_and_down() {
        let (store, surface) = bound_store();
        let a = surface.add(text_layer("a", 0.0, 0.0)).expect("add");
        let b = surface.add(text_layer("b", 0.0, 0.0)).expect("add");
        let c = surface.add(text_layer("c", 0.0, 0.0)).expect("add");
        // display: c, b, a

        assert!(store.move_layer(2, LayerMove::Up).expect("move a up"));
        assert_eq!(ids(&store.layers()), vec![c, a, b]);
        assert_eq!(ids(&surface.objects()), vec![b, a, c]);

        assert!(store.move_layer(0, LayerMove::Down).expect("move c down"));
        assert_eq!(ids(&store.layers()), vec![a, c, b]);

        assert!(!store.move_layer(0, LayerMove::Up).expect("top stays"));
        assert!(!store.move_layer(2, LayerMove::Down).expect("bottom stays"));
        assert!(!store.move_layer(7, LayerMove::Up).expect("out of range"));
    }

    #[test]
    fn test_move_layer_at_max_index_is_noop() {
        let (store, surface) = bound_store();
        let a = surface.add(text_layer("a", 0.0, 0.0)).expect("add");
        let b = surface.add(text_layer("b", 0.0, 0.0)).expect("add");

        assert!(!store.move_layer(usize::MAX, LayerMove::Down).expect("max down"));
        assert!(!store.move_layer(usize::MAX, LayerMove::Up).expect("max up"));
        assert_eq!(ids(&surface.objects()), vec![a, b]);
    }

    #[test]
    fn test_text_property_setters() {
        let (store, surface) = bound_store();
        let id = surface.add(text_layer("a", 0.0, 0.0)).expect("add");

        store.set_font_family(id, "Cinzel").expect("font");
        store.set_fill(id, "#abc").expect("fill");
        store.set_text_align(id, TextAlign::Justify).expect("align");
        store.set_text(id, "Poster").expect("text");
        store.set_opacity(id, 1.5).expect("opacity");

        let layer = store.layers()[0].clone();
        assert_eq!(
            layer.kind,
            LayerKind::Text {
                content: "Poster".to_string(),
                font_size: 20.0,
                fill: "#aabbcc".to_string(),
                font_family: "Cinzel".to_string(),
                align: TextAlign::Justify,
            }
        );
        assert!((layer.opacity - 1.0).abs() < f32::EPSILON);
        assert!(store.set_opacity(id, f32::NAN).is_err());
    }

    #[test]
    fn test_text_setters_reject_images() {
        let (store, surface) = bound_store();
        let id = surface.add(image_layer(0.0, 0.0)).expect("add");
        assert!(matches!(
            store.set_fill(id, "#fff"),
            Err(CollageError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_gestures_respect_lock() {
        let (store, surface) = bound_store();
        let id = surface.add(image_layer(10.0, 10.0)).expect("add");

        assert!(store.apply_gesture(id, Gesture::Move { dx: 5.0, dy: -5.0 }).expect("move"));
        assert!(store.apply_gesture(id, Gesture::Scale { factor: 2.0 }).expect("scale"));
        assert!(store.apply_gesture(id, Gesture::Rotate { degrees: -90.0 }).expect("rotate"));
        let t = surface.object(id).expect("layer").transform;
        assert_eq!(
            t,
            Transform {
                left: 15.0,
                top: 5.0,
                scale_x: 2.0,
                scale_y: 2.0,
                angle: 270.0,
            }
        );

        store.set_locked(id, true).expect("lock");
        assert!(!store.apply_gesture(id, Gesture::Move { dx: 1.0, dy: 1.0 }).expect("locked"));
        assert_eq!(surface.object(id).expect("layer").transform, t);
        assert!(store.apply_gesture(id, Gesture::Scale { factor: 0.0 }).is_ok());

        store.set_locked(id, false).expect("unlock");
        assert!(store.apply_gesture(id, Gesture::Scale { factor: 0.0 }).is_err());
    }

    #[test]
    fn test_delete_selected() {
        let (store, surface) = bound_store();
        assert!(store.delete_selected().expect("nothing selected").is_none());

        let a = surface.add(text_layer("a", 0.0, 0.0)).expect("add");
        store.select_layer(a).expect("select");
        let removed = store.delete_selected().expect("delete").expect("removed");
        assert_eq!(removed.id, a);
        assert!(store.layers().is_empty());
        assert!(store.selected_id().is_none());
    }

    #[test]
    fn test_replace_image_keeps_geometry_and_position() {
        let (store, surface) = bound_store();
        let below = surface.add(text_layer("below", 0.0, 0.0)).expect("add");
        let original = surface
            .add(image_layer(30.0, 40.0).with_transform(Transform {
                left: 30.0,
                top: 40.0,
                scale_x: 0.5,
                scale_y: 0.5,
                angle: 15.0,
            }))
            .expect("add");
        let above = surface.add(text_layer("above", 0.0, 0.0)).expect("add");
        surface
            .register_asset(Arc::new(LoadedImage::new("/layouts/img1.jpg", 100, 50, Vec::new())))
            .expect("old asset");

        let image = Arc::new(LoadedImage::new("data:image/png;base64,AAAA", 64, 32, Vec::new()));
        let new_id = store.replace_image(original, image).expect("replace");

        assert_eq!(ids(&surface.objects()), vec![below, new_id, above]);
        let layer = surface.object(new_id).expect("layer");
        assert!((layer.transform.scale_x - 0.5).abs() < f32::EPSILON);
        assert!((layer.transform.angle - 15.0).abs() < f32::EPSILON);
        assert_eq!(layer.image_src(), Some("data:image/png;base64,AAAA"));
        assert_eq!(store.selected_id(), Some(new_id));
        assert!(surface.asset("data:image/png;base64,AAAA").is_some());
        assert!(surface.asset("/layouts/img1.jpg").is_none());

        assert!(store.replace_image(below, Arc::new(LoadedImage::new("x", 1, 1, Vec::new()))).is_err());
    }

    #[test]
    fn test_operations_without_surface() {
        let store = SceneStore::new();
        assert!(matches!(
            store.select_layer(LayerId::new()),
            Err(CollageError::NoSurface)
        ));
        assert!(matches!(store.delete_selected(), Err(CollageError::NoSurface)));
    }
}
