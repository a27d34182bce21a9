//! Editor session lifecycle: mount a layout, restore or load it, persist on unmount.

use std::sync::Arc;

use crate::layout::LayoutCatalog;
use crate::loader::{LayoutLoader, LoadOutcome};
use crate::storage::{SessionStorage, CANVAS_STATE_KEY, LAYOUT_ID_KEY};
use crate::surface::{Surface, SurfaceSnapshot};
use crate::viewport::{ViewportController, ViewportGeometry};
use crate::{CollageError, CollageResult, SceneStore};

/// How a mounted surface was populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountSource {
    /// Rebuilt from the stored snapshot.
    Snapshot,
    /// Loaded fresh from the layout template.
    Template,
}

/// Result of mounting a layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MountReport {
    /// Where the content came from.
    pub source: MountSource,
    /// Outcome of the image loads.
    pub outcome: LoadOutcome,
    /// Viewport geometry after re-centering.
    pub geometry: ViewportGeometry,
}

/// One editor view: a scene store bound to the surface of the current layout.
#[derive(Debug)]
pub struct EditorSession {
    store: SceneStore,
    storage: SessionStorage,
    catalog: Arc<LayoutCatalog>,
    loader: LayoutLoader,
    viewport: ViewportController,
    layout_id: Option<String>,
}

impl EditorSession {
    /// Create a session. Nothing is mounted yet.
    #[must_use]
    pub fn new(
        store: SceneStore,
        storage: SessionStorage,
        catalog: Arc<LayoutCatalog>,
        loader: LayoutLoader,
        viewport: ViewportController,
    ) -> Self {
        Self {
            store,
            storage,
            catalog,
            loader,
            viewport,
            layout_id: None,
        }
    }

    /// The scene store shared with the editor components.
    #[must_use]
    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    /// Session storage shared with the preview view.
    #[must_use]
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Layout catalog.
    #[must_use]
    pub fn catalog(&self) -> &LayoutCatalog {
        &self.catalog
    }

    /// Viewport controller, e.g. to update the container size.
    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    /// Id of the mounted layout.
    #[must_use]
    pub fn layout_id(&self) -> Option<&str> {
        self.layout_id.as_deref()
    }

    /// Mount a layout on a fresh surface.
    ///
    /// A stored snapshot tagged with the same layout is restored; otherwise (or
    /// if the snapshot cannot be parsed) the template is loaded. A previously
    /// mounted layout is unmounted first.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::TemplateNotFound`] for an unknown layout id, or an
    /// error if the surface rejects a mutation while loading.
    pub async fn mount(&mut self, layout_id: &str) -> CollageResult<MountReport> {
        let catalog = Arc::clone(&self.catalog);
        let template = catalog.get(layout_id)?;

        if self.store.surface().is_some() {
            if let Err(e) = self.unmount() {
                tracing::warn!("Previous layout was not persisted: {e}");
            }
        }

        let surface = Surface::new(template.width, template.height);
        self.store.bind_surface(Some(surface.clone()));
        self.layout_id = Some(layout_id.to_string());

        if let Err(e) = self.storage.set_item(LAYOUT_ID_KEY, layout_id) {
            tracing::warn!("Failed to remember layout id: {e}");
        }

        let stored = self
            .storage
            .get_item(CANVAS_STATE_KEY)
            .map(|json| SurfaceSnapshot::from_json(&json));
        let snapshot = match stored {
            Some(Ok(snapshot)) if snapshot.belongs_to(layout_id) => Some(snapshot),
            Some(Ok(snapshot)) => {
                tracing::debug!(
                    "Ignoring stored snapshot of layout {:?} while mounting {layout_id}",
                    snapshot.layout_id
                );
                None
            }
            Some(Err(e)) => {
                tracing::warn!("Stored snapshot is unreadable, loading template for {layout_id}: {e}");
                None
            }
            None => None,
        };

        let (source, outcome) = match snapshot {
            Some(snapshot) => (
                MountSource::Snapshot,
                self.loader.restore(&surface, snapshot).await?,
            ),
            None => (
                MountSource::Template,
                self.loader.load_template(&surface, template).await?,
            ),
        };

        self.store.refresh();
        let geometry = self.viewport.recenter(&surface);
        tracing::debug!("Mounted layout {layout_id} from {source:?}");
        Ok(MountReport {
            source,
            outcome,
            geometry,
        })
    }

    /// Persist the scene, dispose the surface and unbind the store.
    ///
    /// Teardown always happens; a persistence failure is returned afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::Storage`] if the snapshot does not fit in session
    /// storage, or a serialization error.
    pub fn unmount(&mut self) -> CollageResult<()> {
        let Some(surface) = self.store.surface() else {
            return Ok(());
        };

        let mut snapshot = surface.to_snapshot();
        if let Some(layout_id) = &self.layout_id {
            snapshot = snapshot.for_layout(layout_id.clone());
        }
        let persisted = snapshot
            .to_json()
            .and_then(|json| {
                self.storage
                    .set_item(CANVAS_STATE_KEY, &json)
                    .map_err(CollageError::from)
            });
        if let Err(ref e) = persisted {
            tracing::warn!("Failed to persist scene on unmount: {e}");
        }

        self.store.bind_surface(None);
        surface.dispose();
        self.layout_id = None;
        persisted
    }

    /// Change the zoom of the mounted surface.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::NoSurface`] when nothing is mounted, or an error
    /// for a non-finite zoom.
    pub fn set_zoom(&self, zoom: f32) -> CollageResult<ViewportGeometry> {
        let surface = self.store.surface().ok_or(CollageError::NoSurface)?;
        self.viewport.apply(&surface, zoom)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::loader::{ImageFetcher, LoadedImage};
    use crate::viewport::ViewportConfig;
    use crate::Layer;

    struct SquareFetcher;

    #[async_trait]
    impl ImageFetcher for SquareFetcher {
        async fn fetch(&self, src: &str) -> CollageResult<LoadedImage> {
            Ok(LoadedImage::new(src, 600, 600, Vec::new()))
        }
    }

    fn session(storage: SessionStorage) -> EditorSession {
        EditorSession::new(
            SceneStore::new(),
            storage,
            Arc::new(LayoutCatalog::builtin()),
            LayoutLoader::new(Arc::new(SquareFetcher)),
            ViewportController::new(ViewportConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_mount_unknown_layout() {
        let mut session = session(SessionStorage::new());
        let err = session.mount("does-not-exist").await.expect_err("unknown");
        assert!(matches!(err, CollageError::TemplateNotFound(_)));
        assert!(session.store().surface().is_none());
    }

    #[tokio::test]
    async fn test_mount_loads_template_then_restores_snapshot() {
        let storage = SessionStorage::new();
        let mut editor = session(storage.clone());

        let report = editor.mount("vertical").await.expect("mount");
        assert_eq!(report.source, MountSource::Template);
        assert_eq!(storage.get_item(LAYOUT_ID_KEY).as_deref(), Some("vertical"));

        let first = editor.store().layers()[0].id;
        editor.store().set_locked(first, true).expect("lock");
        let expected = editor.store().layers();
        let surface = editor.store().surface().expect("surface");

        editor.unmount().expect("unmount");
        assert!(surface.is_disposed());
        assert!(editor.store().surface().is_none());
        assert!(storage.get_item(CANVAS_STATE_KEY).is_some());

        let report = editor.mount("vertical").await.expect("remount");
        assert_eq!(report.source, MountSource::Snapshot);
        assert_eq!(editor.store().layers(), expected);
    }

    #[tokio::test]
    async fn test_snapshot_of_other_layout_is_ignored() {
        let storage = SessionStorage::new();
        let mut editor = session(storage.clone());

        editor.mount("vertical").await.expect("mount");
        editor.unmount().expect("unmount");

        let report = editor.mount("horizontal").await.expect("mount other");
        assert_eq!(report.source, MountSource::Template);
        let surface = editor.store().surface().expect("surface");
        assert!((surface.width() - 1920.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_garbage_snapshot_falls_back_to_template() {
        let storage = SessionStorage::new();
        storage.set_item(LAYOUT_ID_KEY, "vertical").expect("set");
        storage.set_item(CANVAS_STATE_KEY, "not json").expect("set");

        let mut editor = session(storage);
        let report = editor.mount("vertical").await.expect("mount");
        assert_eq!(report.source, MountSource::Template);
        assert!(!editor.store().layers().is_empty());
    }

    #[tokio::test]
    async fn test_unmount_quota_failure_still_tears_down() {
        let storage = SessionStorage::with_quota(64);
        let mut editor = session(storage.clone());
        editor.mount("vertical").await.expect("mount");

        let err = editor.unmount().expect_err("snapshot exceeds quota");
        assert!(matches!(err, CollageError::Storage(_)));
        assert!(editor.store().surface().is_none());
        assert!(storage.get_item(CANVAS_STATE_KEY).is_none());
    }

    #[tokio::test]
    async fn test_failed_unmount_does_not_leak_snapshot_into_other_layout() {
        let sizing = SessionStorage::new();
        let mut scratch = session(sizing.clone());
        scratch.mount("cinema-poster").await.expect("mount");
        scratch.unmount().expect("unmount");
        let quota = sizing.used_bytes();

        let storage = SessionStorage::with_quota(quota);
        let mut editor = session(storage.clone());
        editor.mount("cinema-poster").await.expect("mount poster");
        editor.unmount().expect("poster snapshot fits");

        editor.mount("vertical").await.expect("mount vertical");
        let err = editor.unmount().expect_err("vertical snapshot exceeds quota");
        assert!(matches!(err, CollageError::Storage(_)));
        assert_eq!(storage.get_item(LAYOUT_ID_KEY).as_deref(), Some("vertical"));

        let report = editor.mount("vertical").await.expect("remount vertical");
        assert_eq!(report.source, MountSource::Template);
        let names: Vec<String> = editor.store().layers().iter().map(Layer::display_name).collect();
        assert!(names.iter().all(|n| n != "poster-main.jpg"), "{names:?}");
    }

    #[tokio::test]
    async fn test_abandoned_session_does_not_leak_snapshot() {
        let storage = SessionStorage::new();
        let mut first = session(storage.clone());
        first.mount("cinema-poster").await.expect("mount poster");
        first.unmount().expect("unmount");

        first.mount("horizontal").await.expect("mount horizontal");
        drop(first);

        let mut second = session(storage);
        let report = second.mount("horizontal").await.expect("remount");
        assert_eq!(report.source, MountSource::Template);
    }

    #[tokio::test]
    async fn test_set_zoom_requires_mount() {
        let mut editor = session(SessionStorage::new());
        assert!(matches!(editor.set_zoom(2.0), Err(CollageError::NoSurface)));

        editor.mount("vertical").await.expect("mount");
        let geometry = editor.set_zoom(5.0).expect("zoom");
        assert!((geometry.zoom - 3.0).abs() < f32::EPSILON);
    }
}
