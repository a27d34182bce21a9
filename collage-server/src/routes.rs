//! API route handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use collage_core::{CollageError, LayoutTemplate};

use crate::AppState;

/// Plain-text greeting served at `/`.
pub const ROOT_MESSAGE: &str = "🚀 Server is running!";

/// Root greeting.
pub async fn root() -> &'static str {
    ROOT_MESSAGE
}

/// List the layout templates.
#[tracing::instrument(name = "list_layouts", skip(state))]
pub async fn list_layouts(State(state): State<AppState>) -> Json<Vec<LayoutTemplate>> {
    Json(state.catalog.templates().to_vec())
}

/// Fetch one layout template.
#[tracing::instrument(name = "get_layout", skip(state))]
pub async fn get_layout(
    State(state): State<AppState>,
    Path(layout_id): Path<String>,
) -> impl IntoResponse {
    match state.catalog.get(&layout_id) {
        Ok(template) => Json(template.clone()).into_response(),
        Err(e @ CollageError::TemplateNotFound(_)) => {
            tracing::debug!("{e}");
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
