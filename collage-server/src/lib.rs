//! # Collage Server Library
//!
//! Router and shared state for the collage editor backend.
//! This library is used by both the binary and integration tests.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use collage_core::LayoutCatalog;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub mod health;
pub mod routes;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Layout templates offered to the editor.
    pub catalog: Arc<LayoutCatalog>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            catalog: Arc::new(LayoutCatalog::builtin()),
        }
    }
}

/// Build a CORS layer that only allows localhost origins.
#[must_use]
pub fn build_cors_layer(port: u16) -> CorsLayer {
    let localhost_origins = [
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
        "http://localhost:5173".to_string(), // Vite
        "http://127.0.0.1:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ];

    let origins: Vec<HeaderValue> = localhost_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Build the application router.
pub fn router(state: AppState, port: u16) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api/layouts", get(routes::list_layouts))
        .route("/api/layouts/{layout_id}", get(routes::get_layout))
        .layer(build_cors_layer(port))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
