//! # Collage Core
//!
//! Core editor logic for template-based photo collages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                collage-core                 │
//! ├─────────────────────────────────────────────┤
//! │  Scene Store      │  Layout Catalog         │
//! │  - Layer list     │  - Templates            │
//! │  - Selection      │  - Layer specs          │
//! │  - Lock policy    │                         │
//! ├─────────────────────────────────────────────┤
//! │  Surface          │  Layout Loader          │
//! │  - Object list    │  - Abortable fetches    │
//! │  - Hit-testing    │  - Snapshot restore     │
//! │  - Events         │  Session Storage        │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod layer;
pub mod layout;
pub mod loader;
pub mod preview;
pub mod session;
pub mod storage;
pub mod store;
pub mod surface;
pub mod viewport;

pub use error::{CollageError, CollageResult};
pub use layer::{normalize_hex_color, Bounds, Layer, LayerId, LayerKind, TextAlign, Transform};
pub use layout::{ImageSpec, LayerSpec, LayoutCatalog, LayoutTemplate, TextSpec};
pub use loader::{ImageFetcher, LayoutLoader, LoadOutcome, LoadReport, LoadedImage};
pub use preview::{back_to_editor_route, load_preview, PreviewMessage, PreviewPage};
pub use session::{EditorSession, MountReport, MountSource};
pub use storage::{SessionStorage, StorageError};
pub use store::{Gesture, LayerMove, SceneStore};
pub use surface::{
    Background, SelectionOrigin, Subscription, Surface, SurfaceEvent, SurfaceSnapshot,
};
pub use viewport::{ViewportConfig, ViewportController, ViewportGeometry, MAX_ZOOM, MIN_ZOOM};

/// Collage core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
