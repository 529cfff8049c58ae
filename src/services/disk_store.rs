//! DiskStore: read-only gateway over a local directory.
//!
//! Objects live at `base_path/{key}`. The etag is derived from the file's
//! size and modification time, so `head` never touches the payload. The
//! content type comes from the key's extension, with magic-byte sniffing of
//! the first few KiB for extensionless keys. Presigned URLs point back at
//! this service's `/presigned/{key}` route and carry an HMAC-SHA256
//! signature over the key and expiry.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    io::{ErrorKind, SeekFrom},
    path::{Component, Path, PathBuf},
    time::UNIX_EPOCH,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
    models::object::{HttpMetadata, PresignOptions, PresignedUrl, StoredObject},
    services::object_store::{ObjectStore, StoreError, StoreResult, ensure_key_valid},
};

type HmacSha256 = Hmac<Sha256>;

const SNIFF_LEN: usize = 8192;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Route prefix the signed URLs are served from.
pub const PRESIGNED_PREFIX: &str = "/presigned/";

#[derive(Clone)]
pub struct DiskStore {
    /// Directory holding the bucket's objects.
    base_path: PathBuf,

    /// Public origin of this gateway, used to build signed URLs.
    public_url: String,

    signing_key: Vec<u8>,
}

impl DiskStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
        signing_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            signing_key: signing_key.into(),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// Open the object file, returning `None` for missing keys and directories.
    async fn open(&self, key: &str) -> StoreResult<Option<(File, std::fs::Metadata)>> {
        ensure_relative_path(key)?;
        let path = self.object_path(key);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err)),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            debug!(path = %path.display(), "key resolves to a non-file entry");
            return Ok(None);
        }
        Ok(Some((file, meta)))
    }

    /// Build the object handle from file metadata alone.
    ///
    /// `sniff` is the leading bytes of the file, if they were read; they are
    /// only consulted when the key's extension says nothing.
    fn describe(key: &str, meta: &std::fs::Metadata, sniff: Option<&[u8]>) -> StoredObject {
        let content_type = mime_guess::from_path(key)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .or_else(|| sniff.and_then(infer::get).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        StoredObject {
            key: key.to_string(),
            size: meta.len(),
            etag: metadata_etag(meta),
            uploaded: meta.modified().ok().map(DateTime::<Utc>::from),
            http_metadata: HttpMetadata {
                content_type: Some(content_type),
                ..Default::default()
            },
            body: None,
        }
    }

    /// Read up to [`SNIFF_LEN`] leading bytes, then rewind.
    ///
    /// Skipped when the extension already names a type.
    async fn sniff(key: &str, file: &mut File) -> StoreResult<Option<Vec<u8>>> {
        if mime_guess::from_path(key).first().is_some() {
            return Ok(None);
        }
        let mut head = Vec::with_capacity(SNIFF_LEN);
        (&mut *file).take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
        file.seek(SeekFrom::Start(0)).await?;
        Ok(Some(head))
    }

    fn sign(&self, key: &str, expires: i64) -> StoreResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|err| StoreError::Signing(err.to_string()))?;
        mac.update(format!("GET\n{key}\n{expires}").as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        let Some((mut file, meta)) = self.open(key).await? else {
            return Ok(None);
        };
        let sniff = Self::sniff(key, &mut file).await?;
        let mut object = Self::describe(key, &meta, sniff.as_deref());
        object.body = Some(ReaderStream::new(file).boxed());
        debug!(key = %key, size = object.size, "object opened");
        Ok(Some(object))
    }

    async fn head(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        let Some((mut file, meta)) = self.open(key).await? else {
            return Ok(None);
        };
        let sniff = Self::sniff(key, &mut file).await?;
        Ok(Some(Self::describe(key, &meta, sniff.as_deref())))
    }

    async fn presign(&self, key: &str, options: PresignOptions) -> StoreResult<PresignedUrl> {
        ensure_relative_path(key)?;
        if options.method != axum::http::Method::GET {
            return Err(StoreError::Signing(format!(
                "method {} is not supported for local links",
                options.method
            )));
        }
        let ttl = chrono::Duration::from_std(options.expires_in)
            .map_err(|err| StoreError::Signing(err.to_string()))?;
        let expires_at = Utc::now() + ttl;
        let expires = expires_at.timestamp();
        let signature = self.sign(key, expires)?;

        Ok(PresignedUrl {
            url: format!(
                "{}{}{}?expires={}&signature={}",
                self.public_url,
                PRESIGNED_PREFIX,
                encode_key_path(key),
                expires,
                signature
            ),
            expires_at,
        })
    }

    fn verify_signature(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(provided) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.signing_key) else {
            return false;
        };
        mac.update(format!("GET\n{key}\n{expires}").as_bytes());
        // verify_slice compares in constant time
        mac.verify_slice(&provided).is_ok()
    }

    async fn ping(&self) -> StoreResult<()> {
        let meta = fs::metadata(&self.base_path).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Backend(format!(
                "{} is not a directory",
                self.base_path.display()
            )))
        }
    }

    fn scheme(&self) -> &'static str {
        "disk"
    }
}

/// Etag from size and modification time, the way static file servers do.
fn metadata_etag(meta: &std::fs::Metadata) -> String {
    let modified = meta
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_nanos())
        .unwrap_or_default();
    format!("{:x}", md5::compute(format!("{}-{}", meta.len(), modified)))
}

/// Keys must stay inside the bucket directory once joined onto it.
///
/// Rejects leading `/`, `..` segments, backslashes and control characters on
/// top of the shared key checks.
fn ensure_relative_path(key: &str) -> StoreResult<()> {
    ensure_key_valid(key)?;
    let escapes = Path::new(key)
        .components()
        .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
    if escapes || key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Percent-encode each path segment of `key`, keeping the `/` separators.
pub fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn store_with(files: &[(&str, &[u8])]) -> (TempDir, DiskStore) {
        let dir = tempfile::tempdir().unwrap();
        for (key, data) in files {
            let path = dir.path().join(key);
            fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            fs::write(&path, data).await.unwrap();
        }
        let store = DiskStore::new(dir.path(), "http://localhost:3000/", b"secret".to_vec());
        (dir, store)
    }

    #[tokio::test]
    async fn get_streams_bytes_with_metadata_etag() {
        let (_dir, store) = store_with(&[("reports/q1.txt", b"abc")]).await;

        let object = store.get("reports/q1.txt").await.unwrap().unwrap();
        assert_eq!(object.size, 3);
        assert_eq!(object.etag.len(), 32);
        assert_eq!(object.http_metadata.content_type.as_deref(), Some("text/plain"));

        let head = store.head("reports/q1.txt").await.unwrap().unwrap();
        assert_eq!(head.etag, object.etag);

        let chunks: Vec<_> = object.body.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"abc");
    }

    #[tokio::test]
    async fn content_type_follows_the_extension() {
        let (_dir, store) = store_with(&[
            ("reports/q1.pdf", b"abc"),
            ("notes.txt", b"hello"),
            ("site/style.css", b"body{}"),
            ("data.json", b"{}"),
        ])
        .await;

        for (key, expected) in [
            ("reports/q1.pdf", "application/pdf"),
            ("notes.txt", "text/plain"),
            ("site/style.css", "text/css"),
            ("data.json", "application/json"),
        ] {
            let object = store.head(key).await.unwrap().unwrap();
            assert_eq!(object.http_metadata.content_type.as_deref(), Some(expected), "{key}");
        }
    }

    #[tokio::test]
    async fn extensionless_keys_are_sniffed() {
        let (_dir, store) = store_with(&[("scan", b"%PDF-1.7\n%fake"), ("blob", b"abc")]).await;

        let scan = store.get("scan").await.unwrap().unwrap();
        assert_eq!(scan.http_metadata.content_type.as_deref(), Some("application/pdf"));
        let chunks: Vec<_> = scan.body.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"%PDF-1.7\n%fake");

        let blob = store.head("blob").await.unwrap().unwrap();
        assert_eq!(
            blob.http_metadata.content_type.as_deref(),
            Some(DEFAULT_CONTENT_TYPE)
        );
    }

    #[tokio::test]
    async fn head_reads_only_metadata() {
        let (dir, store) = store_with(&[]).await;
        // sparse 1 GiB file
        let file = std::fs::File::create(dir.path().join("huge.bin")).unwrap();
        file.set_len(1 << 30).unwrap();
        drop(file);

        let started = std::time::Instant::now();
        let object = store.head("huge.bin").await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(object.size, 1 << 30);
        assert!(object.body.is_none());

        let fetched = store.get("huge.bin").await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(fetched.etag, object.etag);
    }

    #[tokio::test]
    async fn etag_changes_with_content() {
        let (dir, store) = store_with(&[("a.txt", b"one")]).await;
        let before = store.head("a.txt").await.unwrap().unwrap().etag;
        fs::write(dir.path().join("a.txt"), b"three").await.unwrap();
        let after = store.head("a.txt").await.unwrap().unwrap().etag;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn missing_keys_and_directories_are_absent() {
        let (_dir, store) = store_with(&[("folder/file.txt", b"x")]).await;
        assert!(store.get("nope.txt").await.unwrap().is_none());
        assert!(store.head("folder").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let (_dir, store) = store_with(&[]).await;
        for key in ["../etc/passwd", "/etc/passwd", "a/../../b", "a\\b", "a\nb"] {
            assert!(
                matches!(store.get(key).await, Err(StoreError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
        assert!(store.head("photos/img..final.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn presigned_url_round_trips_through_verification() {
        let (_dir, store) = store_with(&[("a b/c.txt", b"x")]).await;
        let link = store
            .presign("a b/c.txt", PresignOptions::get(Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(link.url.starts_with("http://localhost:3000/presigned/a%20b/c.txt?expires="));
        let query = link.url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut signature = "";
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("signature", v) => signature = v,
                _ => {}
            }
        }

        assert!(store.verify_signature("a b/c.txt", expires, signature));
        assert!(!store.verify_signature("a b/other.txt", expires, signature));
        assert!(!store.verify_signature("a b/c.txt", expires + 1, signature));
    }

    #[tokio::test]
    async fn expired_signature_is_rejected() {
        let (_dir, store) = store_with(&[]).await;
        let expires = Utc::now().timestamp() - 10;
        let signature = store.sign("k", expires).unwrap();
        assert!(!store.verify_signature("k", expires, &signature));
    }

    #[tokio::test]
    async fn ping_requires_a_directory() {
        let (dir, store) = store_with(&[]).await;
        assert!(store.ping().await.is_ok());

        let missing = DiskStore::new(dir.path().join("missing"), "http://x", b"k".to_vec());
        assert!(missing.ping().await.is_err());
    }
}
