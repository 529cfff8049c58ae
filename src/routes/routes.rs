//! Defines the routes the gateway intercepts in front of the explorer.
//!
//! ## Structure
//! - **Link endpoints**
//!   - `GET /download/{*key}` — stream an object through the gateway
//!   - `GET /api/direct-download?key=` — issue a presigned URL as JSON
//!   - `GET /presigned/{*key}` — serve links signed by the local disk store
//!
//! - **Probes**
//!   - `GET /healthz`, `GET /readyz`
//!
//! - **Everything else** falls through to the explorer; HTML pages come back
//!   with the direct-link script injected.
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`; the
//! bare prefixes are routed too so an empty key gets a 400 instead of
//! reaching the explorer.

use crate::{
    handlers::{
        download_handlers::{direct_download_link, download_object, presigned_object},
        explorer_handlers::delegate_to_explorer,
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Build and return the router for the gateway.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // link endpoints
        .route("/download/", get(download_object))
        .route("/download/{*key}", get(download_object))
        .route("/api/direct-download", get(direct_download_link))
        .route("/presigned/", get(presigned_object))
        .route("/presigned/{*key}", get(presigned_object))
        // explorer passthrough
        .fallback(delegate_to_explorer)
        .layer(TraceLayer::new_for_http())
}
