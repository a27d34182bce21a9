//! Materializes layout templates and snapshots onto a surface.
//!
//! Image sources are fetched concurrently through an [`ImageFetcher`]. Every
//! fetch is an abortable future registered with the target surface, so
//! disposing the surface (or starting a newer load on it) cancels it. Results
//! are only applied while the load generation is still current.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, AbortHandle, Abortable};

use crate::layout::{LayerSpec, LayoutTemplate};
use crate::surface::{Background, Surface, SurfaceSnapshot};
use crate::{CollageError, CollageResult, LayerKind};

/// A decoded image source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    /// Source the image was fetched from.
    pub src: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Encoded bytes (PNG, JPEG, ...) as fetched.
    pub bytes: Arc<[u8]>,
}

impl LoadedImage {
    /// Create a loaded image.
    #[must_use]
    pub fn new(src: impl Into<String>, width: u32, height: u32, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            src: src.into(),
            width,
            height,
            bytes: bytes.into(),
        }
    }

    /// Size as floating point logical pixels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn natural_size(&self) -> (f32, f32) {
        (self.width as f32, self.height as f32)
    }
}

/// Fetches and decodes image sources.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the image at `src`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or decoded.
    async fn fetch(&self, src: &str) -> CollageResult<LoadedImage>;
}

/// Summary of a completed load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Layers added to the surface.
    pub added: usize,
    /// Sources whose layer (or background) was skipped after a failed load.
    pub skipped: Vec<String>,
}

/// Result of a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The surface was populated.
    Completed(LoadReport),
    /// The surface was disposed or a newer load superseded this one; nothing was applied.
    Discarded,
}

type FetchResults = HashMap<String, Result<Arc<LoadedImage>, String>>;

/// Loads templates and snapshots onto surfaces.
#[derive(Clone)]
pub struct LayoutLoader {
    fetcher: Arc<dyn ImageFetcher>,
}

impl std::fmt::Debug for LayoutLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutLoader").finish_non_exhaustive()
    }
}

impl LayoutLoader {
    /// Create a loader backed by the given fetcher.
    #[must_use]
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Clear the surface and populate it from a template.
    ///
    /// The background is stretched to the surface size; layers are added in
    /// ascending `z_index`. A failed image skips only its own layer.
    ///
    /// # Errors
    ///
    /// Returns an error only if the surface rejects a mutation mid-load.
    pub async fn load_template(
        &self,
        surface: &Surface,
        template: &LayoutTemplate,
    ) -> CollageResult<LoadOutcome> {
        let Some(generation) = Self::begin(surface)? else {
            return Ok(LoadOutcome::Discarded);
        };
        tracing::debug!(
            "Loading layout {} ({} layers, generation {generation})",
            template.id,
            template.layers.len()
        );

        let fetched = self
            .fetch_all(surface, generation, template.image_sources())
            .await;
        if !surface.is_current_load(generation) {
            tracing::debug!("Discarding stale load of layout {}", template.id);
            return Ok(LoadOutcome::Discarded);
        }

        let mut report = LoadReport::default();
        match fetched.get(&template.background) {
            Some(Ok(image)) => {
                surface.register_asset(Arc::clone(image))?;
                surface.set_background(Background::stretched(
                    template.background.clone(),
                    image.natural_size(),
                    surface.width(),
                    surface.height(),
                ))?;
            }
            Some(Err(e)) => {
                tracing::warn!("Background {} failed to load: {e}", template.background);
                report.skipped.push(template.background.clone());
            }
            None => return Ok(LoadOutcome::Discarded),
        }

        for spec in template.layers_in_paint_order() {
            match spec {
                LayerSpec::Image(image_spec) => match fetched.get(&image_spec.src) {
                    Some(Ok(image)) => {
                        surface.register_asset(Arc::clone(image))?;
                        let (w, h) = image.natural_size();
                        surface.add(image_spec.to_layer(w, h))?;
                        report.added += 1;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Image {} failed to load, skipping layer: {e}", image_spec.src);
                        report.skipped.push(image_spec.src.clone());
                    }
                    None => return Ok(LoadOutcome::Discarded),
                },
                LayerSpec::Text(text_spec) => {
                    surface.add(text_spec.to_layer())?;
                    report.added += 1;
                }
            }
        }

        surface.finish_load(generation);
        Ok(LoadOutcome::Completed(report))
    }

    /// Clear the surface and rebuild it from snapshot JSON, preserving layer order.
    ///
    /// # Errors
    ///
    /// Returns [`CollageError::Serialization`] if the JSON is not a snapshot, or
    /// an error if the surface rejects a mutation mid-load.
    pub async fn restore_snapshot(&self, surface: &Surface, json: &str) -> CollageResult<LoadOutcome> {
        let snapshot = SurfaceSnapshot::from_json(json)?;
        self.restore(surface, snapshot).await
    }

    /// Clear the surface and rebuild it from a parsed snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface rejects a mutation mid-load.
    pub async fn restore(
        &self,
        surface: &Surface,
        snapshot: SurfaceSnapshot,
    ) -> CollageResult<LoadOutcome> {
        #[allow(clippy::float_cmp)]
        let same_size = snapshot.width == surface.width() && snapshot.height == surface.height();
        if !same_size {
            tracing::warn!(
                "Snapshot is {}x{} but surface is {}x{}",
                snapshot.width,
                snapshot.height,
                surface.width(),
                surface.height()
            );
        }

        let Some(generation) = Self::begin(surface)? else {
            return Ok(LoadOutcome::Discarded);
        };

        let mut sources: Vec<String> = Vec::new();
        let layer_sources = snapshot.objects.iter().filter_map(|l| l.image_src());
        for src in snapshot
            .background
            .as_ref()
            .map(|bg| bg.src.as_str())
            .into_iter()
            .chain(layer_sources)
        {
            if !sources.iter().any(|s| s == src) {
                sources.push(src.to_string());
            }
        }

        let fetched = self.fetch_all(surface, generation, sources).await;
        if !surface.is_current_load(generation) {
            tracing::debug!("Discarding stale snapshot restore");
            return Ok(LoadOutcome::Discarded);
        }

        let mut report = LoadReport::default();
        surface.set_background_color(snapshot.background_color)?;
        if let Some(background) = snapshot.background {
            match fetched.get(&background.src) {
                Some(Ok(image)) => {
                    surface.register_asset(Arc::clone(image))?;
                    surface.set_background(background)?;
                }
                Some(Err(e)) => {
                    tracing::warn!("Background {} failed to load: {e}", background.src);
                    report.skipped.push(background.src);
                }
                None => return Ok(LoadOutcome::Discarded),
            }
        }

        for layer in snapshot.objects {
            if let LayerKind::Image { src, .. } = &layer.kind {
                match fetched.get(src) {
                    Some(Ok(image)) => surface.register_asset(Arc::clone(image))?,
                    Some(Err(e)) => {
                        tracing::warn!("Image {src} failed to load, skipping layer: {e}");
                        report.skipped.push(src.clone());
                        continue;
                    }
                    None => return Ok(LoadOutcome::Discarded),
                }
            }
            surface.add(layer)?;
            report.added += 1;
        }

        surface.finish_load(generation);
        Ok(LoadOutcome::Completed(report))
    }

    /// Start a load generation and clear the surface. `None` if the surface is gone.
    fn begin(surface: &Surface) -> CollageResult<Option<u64>> {
        let generation = match surface.begin_load() {
            Ok(generation) => generation,
            Err(CollageError::SurfaceDisposed) => {
                tracing::debug!("Skipping load onto a disposed surface");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        surface.clear()?;
        Ok(Some(generation))
    }

    /// Fetch every source concurrently. Aborted fetches are absent from the result.
    async fn fetch_all(&self, surface: &Surface, generation: u64, sources: Vec<String>) -> FetchResults {
        let loads = sources.into_iter().map(|src| {
            let (handle, registration) = AbortHandle::new_pair();
            surface.track_load(generation, handle);
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                let result = Abortable::new(fetcher.fetch(&src), registration).await;
                (src, result)
            }
        });

        let mut fetched = HashMap::new();
        for (src, result) in join_all(loads).await {
            match result {
                Ok(Ok(image)) if image.width == 0 || image.height == 0 => {
                    fetched.insert(src, Err("image has no pixels".to_string()));
                }
                Ok(Ok(image)) => {
                    fetched.insert(src, Ok(Arc::new(image)));
                }
                Ok(Err(e)) => {
                    fetched.insert(src, Err(e.to_string()));
                }
                Err(_aborted) => {
                    tracing::debug!("Load of {src} was cancelled");
                }
            }
        }
        fetched
    }
}
