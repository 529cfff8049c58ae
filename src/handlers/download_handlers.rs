//! HTTP handlers that hand out objects or links to them.
//! Object bodies are streamed straight from the gateway; nothing is buffered.

use crate::{
    errors::AppError,
    models::object::{PresignOptions, StoredObject},
    services::disk_store::PRESIGNED_PREFIX,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Path prefix of the streaming download route.
pub const DOWNLOAD_PREFIX: &str = "/download/";

/// Path of the presigned-link issuance route.
pub const DIRECT_DOWNLOAD_PATH: &str = "/api/direct-download";

#[derive(Debug, Deserialize)]
pub struct DirectDownloadQuery {
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PresignedQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

#[derive(Debug, Serialize)]
struct LinkResponse {
    url: String,
}

/// Percent-decode the part of `uri`'s path after `prefix`.
///
/// `Ok(None)` means the remainder is empty.
fn key_from_path(uri: &Uri, prefix: &str) -> Result<Option<String>, AppError> {
    let raw = uri.path().strip_prefix(prefix).unwrap_or_default();
    let key = urlencoding::decode(raw).map_err(|_| AppError::bad_request("Invalid file name"))?;
    if key.is_empty() {
        Ok(None)
    } else {
        Ok(Some(key.into_owned()))
    }
}

/// IMF-fixdate, the HTTP date format (`Sun, 06 Nov 1994 08:49:37 GMT`).
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Build a streaming response carrying the object's bytes and metadata.
fn object_response(object: StoredObject) -> Result<Response, AppError> {
    let etag = object.http_etag();
    let Some(body) = object.body else {
        return Err(AppError::not_found("File not found"));
    };

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    object.http_metadata.write_http_metadata(headers);
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size));
    if let Some(uploaded) = object.uploaded {
        if let Ok(value) = HeaderValue::from_str(&http_date(uploaded)) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    Ok(response)
}

/// GET `/download/{*key}` — stream an object through the gateway.
pub async fn download_object(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Response, AppError> {
    let Some(key) = key_from_path(&uri, DOWNLOAD_PREFIX)? else {
        return Err(AppError::bad_request("Missing file name"));
    };

    let object = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| AppError::not_found("File not found"))?;

    info!(key = %key, size = object.size, store = state.store.scheme(), "serving download");
    object_response(object)
}

/// GET `/api/direct-download?key=` — issue a presigned GET URL as JSON.
pub async fn direct_download_link(
    State(state): State<AppState>,
    Query(query): Query<DirectDownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    let key = query
        .key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing key"))?;

    if state.store.head(&key).await?.is_none() {
        return Err(AppError::not_found("Object not found"));
    }

    let link = state
        .store
        .presign(&key, PresignOptions::get(state.presign_ttl))
        .await?;
    info!(key = %key, expires_at = %link.expires_at, "issued presigned link");

    Ok((StatusCode::OK, Json(LinkResponse { url: link.url })))
}

/// GET `/presigned/{*key}?expires=&signature=` — serve a link signed by this
/// gateway's own store.
pub async fn presigned_object(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<PresignedQuery>,
) -> Result<Response, AppError> {
    let Some(key) = key_from_path(&uri, PRESIGNED_PREFIX)? else {
        return Err(AppError::bad_request("Missing file name"));
    };
    let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
        return Err(AppError::forbidden("Invalid or expired link"));
    };
    if !state.store.verify_signature(&key, expires, signature) {
        return Err(AppError::forbidden("Invalid or expired link"));
    }

    let object = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| AppError::not_found("File not found"))?;
    object_response(object)
}
