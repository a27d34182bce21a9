//! Integration tests for surface export (collage-renderer).
//!
//! Loads templates from an on-disk asset root, exports them, and checks the
//! preview handoff through session storage and the preview channel.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use collage_core::storage::PREVIEW_IMAGE_KEY;
use collage_core::{
    load_preview, ImageSpec, LayerSpec, LayoutLoader, LayoutTemplate, LoadOutcome, PreviewPage,
    SceneStore, SessionStorage, StorageError, Surface,
};
use collage_renderer::{
    AssetFetcher, ExportConfig, ExportFormat, RenderError, SceneExporter,
};
use futures::channel::mpsc;

/// Write a solid PNG of the given size under the asset root.
fn write_png(root: &Path, name: &str, width: u32, height: u32) {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([90, 160, 60, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    std::fs::write(root.join(name), buf.into_inner()).expect("write png");
}

fn image_spec(src: &str, left: f32, z_index: i32) -> LayerSpec {
    LayerSpec::Image(ImageSpec {
        src: src.to_string(),
        left,
        top: 100.0,
        width: 300.0,
        z_index,
        locked: false,
    })
}

fn template(width: f32, height: f32) -> LayoutTemplate {
    LayoutTemplate {
        id: "test".to_string(),
        name: "Test layout".to_string(),
        preview: String::new(),
        width,
        height,
        background: "/bg.png".to_string(),
        layers: vec![image_spec("/small.png", 40.0, 0), image_spec("/large.png", 400.0, 1)],
    }
}

fn exporter(multiplier: f32) -> SceneExporter {
    SceneExporter::new(ExportConfig {
        multiplier,
        load_system_fonts: false,
        ..ExportConfig::default()
    })
}

async fn loaded_surface(root: &Path, template: &LayoutTemplate) -> Surface {
    let surface = Surface::new(template.width, template.height);
    let outcome = LayoutLoader::new(Arc::new(AssetFetcher::new(root)))
        .load_template(&surface, template)
        .await
        .expect("load");
    assert!(matches!(outcome, LoadOutcome::Completed(ref r) if r.skipped.is_empty()));
    surface
}

fn assets() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    write_png(dir.path(), "bg.png", 108, 192);
    write_png(dir.path(), "small.png", 150, 100);
    write_png(dir.path(), "large.png", 1200, 800);
    dir
}

// ==========================================================================
// Dimensions
// ==========================================================================

#[tokio::test]
async fn test_export_at_double_multiplier() {
    let dir = assets();
    let surface = loaded_surface(dir.path(), &template(400.0, 300.0)).await;
    let before = surface.objects();

    let image = exporter(2.0).export(&surface).expect("export");
    assert_eq!((image.width, image.height), (800, 600));

    let decoded = image::load_from_memory(&image.bytes).expect("decode export");
    assert_eq!((decoded.width(), decoded.height()), (800, 600));
    assert_eq!(surface.objects(), before);
}

#[tokio::test]
async fn test_declared_width_survives_export() {
    let dir = assets();
    let surface = loaded_surface(dir.path(), &template(1080.0, 1920.0)).await;

    for layer in surface.objects() {
        assert!((layer.scaled_width() - 300.0).abs() < 1e-3);
    }

    let svg = exporter(1.0).render_to_svg(&surface).expect("svg");
    // 150px source scaled x2, 1200px source scaled x0.25: both 300 wide.
    assert!(svg.contains("scale(2 2)"));
    assert!(svg.contains("scale(0.25 0.25)"));
    assert!(svg.contains("width=\"1080\" height=\"1920\""));

    let image = exporter(0.25).export(&surface).expect("export");
    assert_eq!((image.width, image.height), (270, 480));
}

#[tokio::test]
async fn test_jpeg_export_of_loaded_template() {
    let dir = assets();
    let surface = loaded_surface(dir.path(), &template(400.0, 300.0)).await;

    let exporter = SceneExporter::new(ExportConfig {
        multiplier: 1.0,
        format: ExportFormat::Jpeg,
        jpeg_quality: 70,
        load_system_fonts: false,
        ..ExportConfig::default()
    });
    let image = exporter.export(&surface).expect("jpeg");
    assert_eq!(&image.bytes[0..2], &[0xFF, 0xD8]);
    assert!(image.to_data_url().starts_with("data:image/jpeg;base64,"));
}

// ==========================================================================
// Zoom
// ==========================================================================

#[tokio::test]
async fn test_export_ignores_and_restores_zoom() {
    let dir = assets();
    let surface = loaded_surface(dir.path(), &template(400.0, 300.0)).await;
    surface.set_zoom(2.5).expect("zoom");

    let image = exporter(1.0).export(&surface).expect("export");
    assert_eq!((image.width, image.height), (400, 300));
    assert!((surface.zoom() - 2.5).abs() < f32::EPSILON);
}

// ==========================================================================
// Preview handoff
// ==========================================================================

#[tokio::test]
async fn test_publish_preview_stores_and_sends() {
    let dir = assets();
    let surface = loaded_surface(dir.path(), &template(400.0, 300.0)).await;
    let storage = SessionStorage::new();
    let (tx, mut rx) = mpsc::unbounded();

    let image = exporter(1.0)
        .publish_preview(&surface, &storage, Some(&tx))
        .expect("publish");

    let message = rx
        .try_next()
        .expect("message ready")
        .expect("channel open");
    assert_eq!(message.data_url(), image.to_data_url());
    assert_eq!(
        load_preview(&storage),
        PreviewPage::Image(image.to_data_url())
    );
}

#[tokio::test]
async fn test_quota_failure_leaves_scene_unchanged() {
    let dir = assets();
    let surface = loaded_surface(dir.path(), &template(400.0, 300.0)).await;
    let store = SceneStore::new();
    store.bind_surface(Some(surface.clone()));
    let layers_before = store.layers();
    surface.set_zoom(0.75).expect("zoom");

    let storage = SessionStorage::with_quota(64);
    let (tx, mut rx) = mpsc::unbounded();
    let result = exporter(1.0).publish_preview(&surface, &storage, Some(&tx));

    assert!(matches!(
        result,
        Err(RenderError::Storage(StorageError::QuotaExceeded { .. }))
    ));
    assert!(storage.get_item(PREVIEW_IMAGE_KEY).is_none());
    assert!(rx.try_next().is_err(), "nothing should be sent");
    assert_eq!(store.layers(), layers_before);
    assert_eq!(surface.object_count(), 2);
    assert!((surface.zoom() - 0.75).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_publish_without_listener() {
    let surface = Surface::new(50.0, 50.0);
    let storage = SessionStorage::new();
    let (tx, rx) = mpsc::unbounded();
    drop(rx);

    exporter(1.0)
        .publish_preview(&surface, &storage, Some(&tx))
        .expect("storage still receives the image");
    assert!(storage.get_item(PREVIEW_IMAGE_KEY).is_some());
}
