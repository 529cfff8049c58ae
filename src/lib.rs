//! Direct-link gateway for a bucket file explorer.
//!
//! Intercepts `/download/{key}` and `/api/direct-download`, forwards every
//! other request to the explorer, and injects a "direct download link"
//! button into the explorer's HTML pages.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;

/// Build the full application router with its state attached.
pub fn app(state: state::AppState) -> Router {
    routes::routes::routes().with_state(state)
}
