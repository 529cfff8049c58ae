//! Object Store Gateway: the narrow interface the gateway needs from a bucket.
//!
//! Listing, uploads and deletes belong to the explorer; the gateway only
//! reads objects and issues links for them.

use async_trait::async_trait;
use std::io;
use thiserror::Error;

use crate::models::object::{PresignOptions, PresignedUrl, StoredObject};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("failed to sign url: {0}")]
    Signing(String),
    #[error("object store request failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Read-side access to a bucket of named objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object with its body. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>>;

    /// Fetch object metadata only. `Ok(None)` when the key does not exist.
    async fn head(&self, key: &str) -> StoreResult<Option<StoredObject>>;

    /// Create a time-limited signed URL for `key`.
    async fn presign(&self, key: &str, options: PresignOptions) -> StoreResult<PresignedUrl>;

    /// Check a signature produced by [`ObjectStore::presign`] when the signed
    /// URL points back at this gateway. Stores whose URLs are served by the
    /// backend itself never accept one.
    fn verify_signature(&self, _key: &str, _expires: i64, _signature: &str) -> bool {
        false
    }

    /// Cheap connectivity check used by the readiness probe.
    async fn ping(&self) -> StoreResult<()>;

    /// Short backend name for logs (e.g. "disk", "s3").
    fn scheme(&self) -> &'static str;
}

/// Key validation shared by every backend: non-empty and at most 1024 bytes.
///
/// Bucket keys are opaque, so `..`, leading `/` and the like are legal here;
/// backends that map keys onto a filesystem add their own checks.
pub fn ensure_key_valid(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
