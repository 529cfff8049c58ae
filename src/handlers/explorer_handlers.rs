//! Fallback handler: everything not intercepted goes to the explorer.

use axum::{body::Body, extract::State, http::Request, response::Response};
use tracing::debug;

use crate::{errors::AppError, services::html_injector::is_html, state::AppState};

/// Forward the request to the explorer with a per-request config and patch
/// HTML pages on the way back.
pub async fn delegate_to_explorer(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let config = state.explorer_config();
    let path = request.uri().path().to_string();

    let response = state.explorer.handle(request, config).await?;
    debug!(%path, status = response.status().as_u16(), "explorer responded");

    if !is_html(response.headers()) {
        return Ok(response);
    }
    Ok(state.injector.process(response).await?)
}
