//! Represents an object (file) held by the bucket behind the gateway.

use axum::http::{HeaderMap, HeaderValue, Method, header};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use std::{fmt, io, time::Duration};

/// Streaming payload of a stored object.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

/// HTTP metadata stored alongside an object.
///
/// Mirrors the subset of headers object stores keep per object and replay
/// on download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMetadata {
    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
}

impl HttpMetadata {
    /// Copy every present field onto `headers`, skipping values that are not
    /// valid header text.
    pub fn write_http_metadata(&self, headers: &mut HeaderMap) {
        let fields = [
            (header::CONTENT_TYPE, &self.content_type),
            (header::CONTENT_LANGUAGE, &self.content_language),
            (header::CONTENT_DISPOSITION, &self.content_disposition),
            (header::CONTENT_ENCODING, &self.content_encoding),
            (header::CACHE_CONTROL, &self.cache_control),
        ];
        for (name, value) in fields {
            if let Some(value) = value.as_deref() {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.insert(name, value);
                    }
                    Err(_) => tracing::debug!(header = %name, "skipping invalid metadata value"),
                }
            }
        }
    }
}

/// A stored object handle as returned by the gateway.
///
/// `body` is `None` for `head` lookups and for stores that return metadata
/// without a payload.
pub struct StoredObject {
    /// Object key within the bucket.
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Content hash, unquoted (e.g. hex MD5).
    pub etag: String,

    /// Last upload/modification time, when the store reports it.
    pub uploaded: Option<DateTime<Utc>>,

    pub http_metadata: HttpMetadata,

    pub body: Option<ObjectBody>,
}

impl StoredObject {
    /// The etag in its quoted HTTP form.
    pub fn http_etag(&self) -> String {
        if self.etag.starts_with('"') || self.etag.starts_with("W/") {
            self.etag.clone()
        } else {
            format!("\"{}\"", self.etag)
        }
    }
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("key", &self.key)
            .field("size", &self.size)
            .field("etag", &self.etag)
            .field("uploaded", &self.uploaded)
            .field("http_metadata", &self.http_metadata)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Options for a presigned URL request.
#[derive(Debug, Clone)]
pub struct PresignOptions {
    pub method: Method,
    pub expires_in: Duration,
}

impl PresignOptions {
    pub fn get(expires_in: Duration) -> Self {
        Self {
            method: Method::GET,
            expires_in,
        }
    }
}

/// A time-limited signed URL for out-of-band object access.
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
