//! Retained-mode rendering surface.
//!
//! A [`Surface`] owns the ordered object list (index 0 is painted first), the
//! non-interactive background, the active selection, decoded image assets and
//! the presentation zoom. Every mutation notifies subscribers after the
//! internal lock is released, so handlers may call back into the surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::future::AbortHandle;
use serde::{Deserialize, Serialize};

use crate::loader::LoadedImage;
use crate::{CollageError, CollageResult, Layer, LayerId};

/// Background color painted beneath the background image.
pub const DEFAULT_BACKGROUND_COLOR: &str = "#f8f8f8";

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Where a selection request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    /// A click or tap hit-tested on the surface. Subject to lock checks.
    Pointer,
    /// An explicit pick from the layer list. Bypasses lock checks.
    LayerList,
    /// Selection made by editor code (e.g. after replacing an image).
    Programmatic,
}

/// Notification emitted by a surface after a mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceEvent {
    /// A layer was added.
    ObjectAdded(LayerId),
    /// A layer was removed.
    ObjectRemoved(LayerId),
    /// A layer's properties or stacking position changed.
    ObjectModified(LayerId),
    /// A layer became active while nothing was selected.
    SelectionCreated {
        /// Newly active layer.
        id: LayerId,
        /// Source of the request.
        origin: SelectionOrigin,
    },
    /// The active layer changed to another layer.
    SelectionUpdated {
        /// Newly active layer.
        id: LayerId,
        /// Source of the request.
        origin: SelectionOrigin,
    },
    /// The selection was cleared.
    SelectionCleared,
}

/// Background image stretched to fill the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    /// Image source.
    pub src: String,
    /// Decoded source width.
    pub natural_width: f32,
    /// Decoded source height.
    pub natural_height: f32,
    /// Horizontal scale.
    pub scale_x: f32,
    /// Vertical scale.
    pub scale_y: f32,
}

impl Background {
    /// Stretch an image independently on each axis to exactly cover `width` x `height`.
    #[must_use]
    pub fn stretched(src: impl Into<String>, natural: (f32, f32), width: f32, height: f32) -> Self {
        let (natural_width, natural_height) = natural;
        Self {
            src: src.into(),
            natural_width,
            natural_height,
            scale_x: width / natural_width,
            scale_y: height / natural_height,
        }
    }

    /// Rendered size of the background.
    #[must_use]
    pub fn scaled_size(&self) -> (f32, f32) {
        (
            self.natural_width * self.scale_x,
            self.natural_height * self.scale_y,
        )
    }
}

/// Serialized form of a surface: everything needed to rebuild its layout.
///
/// Zoom is a presentation setting and is deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSnapshot {
    /// Format version.
    pub version: u32,
    /// Logical width.
    pub width: f32,
    /// Logical height.
    pub height: f32,
    /// Color beneath the background image.
    pub background_color: String,
    /// Background image, if any.
    pub background: Option<Background>,
    /// Layers in paint order.
    pub objects: Vec<Layer>,
    /// Layout the snapshot was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_id: Option<String>,
}

impl SurfaceSnapshot {
    /// Tag the snapshot with the layout it belongs to.
    #[must_use]
    pub fn for_layout(mut self, layout_id: impl Into<String>) -> Self {
        self.layout_id = Some(layout_id.into());
        self
    }

    /// Whether the snapshot was taken from the given layout.
    #[must_use]
    pub fn belongs_to(&self, layout_id: &str) -> bool {
        self.layout_id.as_deref() == Some(layout_id)
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CollageResult<String> {
        serde_json::to_string(self).map_err(CollageError::Serialization)
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not a valid snapshot.
    pub fn from_json(json: &str) -> CollageResult<Self> {
        serde_json::from_str(json).map_err(CollageError::Serialization)
    }
}

type Handler = Arc<dyn Fn(&SurfaceEvent) + Send + Sync>;

#[derive(Debug)]
struct SurfaceState {
    width: f32,
    height: f32,
    zoom: f32,
    background_color: String,
    background: Option<Background>,
    objects: Vec<Layer>,
    active: Option<LayerId>,
    assets: HashMap<String, Arc<LoadedImage>>,
    disposed: bool,
    load_generation: u64,
    pending_loads: Vec<AbortHandle>,
}

struct SurfaceInner {
    state: RwLock<SurfaceState>,
    handlers: RwLock<Vec<(u64, Handler)>>,
    next_handler: AtomicU64,
}

/// Shared handle to a rendering surface.
#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Surface")
            .field("width", &state.width)
            .field("height", &state.height)
            .field("zoom", &state.zoom)
            .field("objects", &state.objects.len())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Guard for a surface event subscription. Dropping it unsubscribes.
#[must_use = "dropping a subscription immediately unsubscribes the handler"]
pub struct Subscription {
    surface: Weak<SurfaceInner>,
    id: u64,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.surface.upgrade() {
            inner
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Surface {
    /// Create an empty surface with the given logical size.
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                state: RwLock::new(SurfaceState {
                    width,
                    height,
                    zoom: 1.0,
                    background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
                    background: None,
                    objects: Vec::new(),
                    active: None,
                    assets: HashMap::new(),
                    disposed: false,
                    load_generation: 0,
                    pending_loads: Vec::new(),
                }),
                handlers: RwLock::new(Vec::new()),
                next_handler: AtomicU64::new(0),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Register an event handler. It stays registered while the guard lives.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SurfaceEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        Subscription {
            surface: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn emit(&self, event: SurfaceEvent) {
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    fn emit_all(&self, events: Vec<SurfaceEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    // -----------------------------------------------------------------------
    // Geometry and zoom
    // -----------------------------------------------------------------------

    /// Logical (unzoomed) width.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.read().width
    }

    /// Logical (unzoomed) height.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.read().height
    }

    /// Current paint-time zoom.
    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.read().zoom
    }

    /// Pixel size of the displayed surface: logical size times zoom.
    #[must_use]
    pub fn pixel_size(&self) -> (f32, f32) {
        let state = self.read();
        (state.width * state.zoom, state.height * state.zoom)
    }

    /// Set the paint-time zoom. Layer coordinates are untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed or the zoom is not a positive number.
    pub fn set_zoom(&self, zoom: f32) -> CollageResult<()> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(CollageError::InvalidOperation(format!(
                "zoom must be a positive number, got {zoom}"
            )));
        }
        let mut state = self.write_live()?;
        state.zoom = zoom;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// All layers in paint order (bottom first).
    #[must_use]
    pub fn objects(&self) -> Vec<Layer> {
        self.read().objects.clone()
    }

    /// Number of layers.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.read().objects.len()
    }

    /// Get a layer by ID.
    #[must_use]
    pub fn object(&self, id: LayerId) -> Option<Layer> {
        self.read().objects.iter().find(|l| l.id == id).cloned()
    }

    /// Paint-order index of a layer.
    #[must_use]
    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.read().objects.iter().position(|l| l.id == id)
    }

    /// Add a layer on top of all others.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn add(&self, layer: Layer) -> CollageResult<LayerId> {
        let index = self.read().objects.len();
        self.insert_at(index, layer)
    }

    /// Insert a layer at a paint-order index (clamped to the list length).
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn insert_at(&self, index: usize, layer: Layer) -> CollageResult<LayerId> {
        let id = layer.id;
        {
            let mut state = self.write_live()?;
            let index = index.min(state.objects.len());
            state.objects.insert(index, layer);
        }
        self.emit(SurfaceEvent::ObjectAdded(id));
        Ok(id)
    }

    /// Remove a layer. Clears the selection if it pointed at the layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed or the layer does not exist.
    pub fn remove(&self, id: LayerId) -> CollageResult<Layer> {
        let (layer, was_active) = {
            let mut state = self.write_live()?;
            let index = state
                .objects
                .iter()
                .position(|l| l.id == id)
                .ok_or_else(|| CollageError::LayerNotFound(id.to_string()))?;
            let layer = state.objects.remove(index);
            let was_active = state.active == Some(id);
            if was_active {
                state.active = None;
            }
            (layer, was_active)
        };

        self.emit(SurfaceEvent::ObjectRemoved(id));
        if was_active {
            self.emit(SurfaceEvent::SelectionCleared);
        }
        Ok(layer)
    }

    /// Swap a layer for another at the same paint-order index.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed or the layer does not exist.
    pub fn replace(&self, id: LayerId, replacement: Layer) -> CollageResult<Layer> {
        let new_id = replacement.id;
        let (old, was_active) = {
            let mut state = self.write_live()?;
            let index = state
                .objects
                .iter()
                .position(|l| l.id == id)
                .ok_or_else(|| CollageError::LayerNotFound(id.to_string()))?;
            let old = std::mem::replace(&mut state.objects[index], replacement);
            let was_active = state.active == Some(id);
            if was_active {
                state.active = None;
            }
            (old, was_active)
        };

        self.emit(SurfaceEvent::ObjectRemoved(id));
        if was_active {
            self.emit(SurfaceEvent::SelectionCleared);
        }
        self.emit(SurfaceEvent::ObjectAdded(new_id));
        Ok(old)
    }

    /// Update a layer in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed or the layer does not exist.
    pub fn modify<F>(&self, id: LayerId, f: F) -> CollageResult<()>
    where
        F: FnOnce(&mut Layer),
    {
        {
            let mut state = self.write_live()?;
            let layer = state
                .objects
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or_else(|| CollageError::LayerNotFound(id.to_string()))?;
            f(layer);
        }
        self.emit(SurfaceEvent::ObjectModified(id));
        Ok(())
    }

    /// Move a layer to a paint-order index (clamped to the list bounds).
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed or the layer does not exist.
    pub fn move_to(&self, id: LayerId, index: usize) -> CollageResult<()> {
        {
            let mut state = self.write_live()?;
            let from = state
                .objects
                .iter()
                .position(|l| l.id == id)
                .ok_or_else(|| CollageError::LayerNotFound(id.to_string()))?;
            let layer = state.objects.remove(from);
            let to = index.min(state.objects.len());
            state.objects.insert(to, layer);
        }
        self.emit(SurfaceEvent::ObjectModified(id));
        Ok(())
    }

    /// Remove every layer, the background, the selection and cached assets, and
    /// reset the background color.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn clear(&self) -> CollageResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write_live()?;
            events.extend(
                state
                    .objects
                    .drain(..)
                    .map(|l| SurfaceEvent::ObjectRemoved(l.id)),
            );
            state.background = None;
            state.background_color = DEFAULT_BACKGROUND_COLOR.to_string();
            state.assets.clear();
            if state.active.take().is_some() {
                events.push(SurfaceEvent::SelectionCleared);
            }
        }
        self.emit_all(events);
        Ok(())
    }

    /// Topmost layer containing the point, in logical coordinates.
    #[must_use]
    pub fn object_at(&self, x: f32, y: f32) -> Option<LayerId> {
        self.read()
            .objects
            .iter()
            .rev()
            .find(|l| l.contains_point(x, y))
            .map(|l| l.id)
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Currently active layer.
    #[must_use]
    pub fn active_object(&self) -> Option<LayerId> {
        self.read().active
    }

    /// Make a layer active.
    ///
    /// Emits `SelectionCreated` when nothing was active, `SelectionUpdated` when a
    /// different layer was active, and nothing when the layer is already active.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed or the layer does not exist.
    pub fn set_active_object(&self, id: LayerId, origin: SelectionOrigin) -> CollageResult<()> {
        let previous = {
            let mut state = self.write_live()?;
            if !state.objects.iter().any(|l| l.id == id) {
                return Err(CollageError::LayerNotFound(id.to_string()));
            }
            state.active.replace(id)
        };

        match previous {
            None => self.emit(SurfaceEvent::SelectionCreated { id, origin }),
            Some(prev) if prev != id => self.emit(SurfaceEvent::SelectionUpdated { id, origin }),
            Some(_) => {}
        }
        Ok(())
    }

    /// Clear the active layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn discard_active_object(&self) -> CollageResult<()> {
        let previous = self.write_live()?.active.take();
        if previous.is_some() {
            self.emit(SurfaceEvent::SelectionCleared);
        }
        Ok(())
    }

    /// Pointer selection at a logical point: activates the topmost hit layer or
    /// clears the selection on a miss. Returns the hit layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn select_at(&self, x: f32, y: f32) -> CollageResult<Option<LayerId>> {
        match self.object_at(x, y) {
            Some(id) => {
                self.set_active_object(id, SelectionOrigin::Pointer)?;
                Ok(Some(id))
            }
            None => {
                self.discard_active_object()?;
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Background and assets
    // -----------------------------------------------------------------------

    /// Current background image.
    #[must_use]
    pub fn background(&self) -> Option<Background> {
        self.read().background.clone()
    }

    /// Set the background image.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn set_background(&self, background: Background) -> CollageResult<()> {
        self.write_live()?.background = Some(background);
        Ok(())
    }

    /// Color beneath the background image.
    #[must_use]
    pub fn background_color(&self) -> String {
        self.read().background_color.clone()
    }

    /// Set the color beneath the background image.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn set_background_color(&self, color: impl Into<String>) -> CollageResult<()> {
        self.write_live()?.background_color = color.into();
        Ok(())
    }

    /// Keep a decoded image so it can be rasterized later.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn register_asset(&self, image: Arc<LoadedImage>) -> CollageResult<()> {
        self.write_live()?
            .assets
            .insert(image.src.clone(), image);
        Ok(())
    }

    /// Look up a decoded image by source.
    #[must_use]
    pub fn asset(&self, src: &str) -> Option<Arc<LoadedImage>> {
        self.read().assets.get(src).cloned()
    }

    /// Drop cached images no longer referenced by the background or a layer.
    /// Returns how many were dropped.
    pub fn prune_assets(&self) -> usize {
        let mut state = self.write();
        let SurfaceState {
            assets,
            objects,
            background,
            ..
        } = &mut *state;
        let before = assets.len();
        assets.retain(|src, _| {
            background.as_ref().is_some_and(|bg| &bg.src == src)
                || objects.iter().any(|l| l.image_src() == Some(src.as_str()))
        });
        before - assets.len()
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    /// Capture the serializable state of the surface.
    #[must_use]
    pub fn to_snapshot(&self) -> SurfaceSnapshot {
        let state = self.read();
        SurfaceSnapshot {
            version: SNAPSHOT_VERSION,
            width: state.width,
            height: state.height,
            background_color: state.background_color.clone(),
            background: state.background.clone(),
            objects: state.objects.clone(),
            layout_id: None,
        }
    }

    /// Serialize the surface to snapshot JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CollageResult<String> {
        self.to_snapshot().to_json()
    }

    // -----------------------------------------------------------------------
    // Lifecycle and loads
    // -----------------------------------------------------------------------

    /// Whether the surface has been torn down.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.read().disposed
    }

    /// Tear the surface down: abort in-flight loads, drop handlers, layers and assets.
    pub fn dispose(&self) {
        let pending = {
            let mut state = self.write();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.objects.clear();
            state.background = None;
            state.active = None;
            state.assets.clear();
            std::mem::take(&mut state.pending_loads)
        };
        for handle in pending {
            handle.abort();
        }
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("Surface disposed");
    }

    /// Start a new load generation, aborting loads from older generations.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is disposed.
    pub fn begin_load(&self) -> CollageResult<u64> {
        let (generation, superseded) = {
            let mut state = self.write_live()?;
            state.load_generation += 1;
            (state.load_generation, std::mem::take(&mut state.pending_loads))
        };
        if !superseded.is_empty() {
            tracing::debug!(
                "Load generation {generation} aborts {} in-flight image loads",
                superseded.len()
            );
        }
        for handle in superseded {
            handle.abort();
        }
        Ok(generation)
    }

    /// Register an in-flight load so it is aborted on dispose or supersession.
    ///
    /// Aborts immediately when `generation` is no longer current.
    pub fn track_load(&self, generation: u64, handle: AbortHandle) {
        let mut state = self.write();
        if state.disposed || state.load_generation != generation {
            handle.abort();
        } else {
            state.pending_loads.push(handle);
        }
    }

    /// Whether results of `generation` may still be applied.
    #[must_use]
    pub fn is_current_load(&self, generation: u64) -> bool {
        let state = self.read();
        !state.disposed && state.load_generation == generation
    }

    /// Drop the abort handles of a finished load generation.
    pub fn finish_load(&self, generation: u64) {
        let mut state = self.write();
        if state.load_generation == generation {
            state.pending_loads.clear();
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SurfaceState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SurfaceState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_live(&self) -> CollageResult<RwLockWriteGuard<'_, SurfaceState>> {
        let state = self.write();
        if state.disposed {
            return Err(CollageError::SurfaceDisposed);
        }
        Ok(state)
    }
}
