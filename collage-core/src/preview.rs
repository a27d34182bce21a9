//! Preview view: reads the exported image handed over by the editor.

use serde::{Deserialize, Serialize};

use crate::storage::{SessionStorage, LAYOUT_ID_KEY, PREVIEW_IMAGE_KEY};

/// Layout used when the session has no layout id.
pub const DEFAULT_LAYOUT_ID: &str = "vertical";

/// Route of the layout chooser.
pub const LAYOUT_CHOOSER_ROUTE: &str = "/layouts";

/// Cross-view message carrying an exported image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PreviewMessage {
    /// A freshly exported preview.
    Preview {
        /// Image encoded as a `data:` URL.
        #[serde(rename = "dataURL")]
        data_url: String,
    },
}

impl PreviewMessage {
    /// Build a preview message.
    #[must_use]
    pub fn preview(data_url: impl Into<String>) -> Self {
        Self::Preview {
            data_url: data_url.into(),
        }
    }

    /// The carried data URL.
    #[must_use]
    pub fn data_url(&self) -> &str {
        match self {
            Self::Preview { data_url } => data_url,
        }
    }
}

/// What the preview view should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewPage {
    /// Show the stored image (a `data:` URL).
    Image(String),
    /// Nothing to show; navigate to this route instead.
    Redirect(String),
}

/// Read the preview image from session storage.
#[must_use]
pub fn load_preview(storage: &SessionStorage) -> PreviewPage {
    match storage.get_item(PREVIEW_IMAGE_KEY) {
        Some(image) if !image.is_empty() => PreviewPage::Image(image),
        _ => {
            tracing::debug!("No preview image stored, redirecting to layout chooser");
            PreviewPage::Redirect(LAYOUT_CHOOSER_ROUTE.to_string())
        }
    }
}

/// Route back to the editor for the layout of this session.
#[must_use]
pub fn back_to_editor_route(storage: &SessionStorage) -> String {
    let layout_id = storage
        .get_item(LAYOUT_ID_KEY)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_LAYOUT_ID.to_string());
    format!("/editor/{layout_id}")
}
