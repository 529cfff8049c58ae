//! Shared fixtures for gateway integration tests.
//!
//! The object store and the explorer are replaced with in-memory fakes so
//! tests exercise the real router without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use bytes::Bytes;
use chrono::Utc;
use explorer_gateway::{
    app,
    models::object::{HttpMetadata, PresignOptions, PresignedUrl, StoredObject},
    services::{
        explorer::{Explorer, ExplorerConfig, ExplorerError},
        html_injector::{HtmlInjector, LinkMode, ScriptOptions},
        object_store::{ObjectStore, StoreError, StoreResult},
    },
    state::AppState,
};
use futures::StreamExt;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;

/// In-memory bucket keyed by object key.
#[derive(Default)]
pub struct MemoryStore {
    objects: HashMap<String, (Bytes, HttpMetadata)>,
    pub fail_presign: bool,
}

impl MemoryStore {
    pub fn with(mut self, key: &str, data: &'static [u8], content_type: &str) -> Self {
        self.objects.insert(
            key.to_string(),
            (
                Bytes::from_static(data),
                HttpMetadata {
                    content_type: Some(content_type.to_string()),
                    ..Default::default()
                },
            ),
        );
        self
    }

    fn describe(&self, key: &str) -> Option<StoredObject> {
        let (data, meta) = self.objects.get(key)?;
        Some(StoredObject {
            key: key.to_string(),
            size: data.len() as u64,
            etag: format!("{:x}", md5::compute(data)),
            uploaded: None,
            http_metadata: meta.clone(),
            body: None,
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        let Some(mut object) = self.describe(key) else {
            return Ok(None);
        };
        let data = self.objects[key].0.clone();
        object.body = Some(futures::stream::iter([Ok(data)]).boxed());
        Ok(Some(object))
    }

    async fn head(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        Ok(self.describe(key))
    }

    async fn presign(&self, key: &str, options: PresignOptions) -> StoreResult<PresignedUrl> {
        if self.fail_presign {
            return Err(StoreError::Signing("no credentials".into()));
        }
        Ok(PresignedUrl {
            url: format!(
                "https://bucket.example.com/{}?X-Amz-Expires={}",
                key,
                options.expires_in.as_secs()
            ),
            expires_at: Utc::now(),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn scheme(&self) -> &'static str {
        "memory"
    }
}

/// What the fake explorer answers with.
#[derive(Clone)]
pub enum ExplorerReply {
    Html(&'static str),
    Json(&'static str),
    Malformed,
    Unavailable,
}

/// Fake explorer recording the config of every call.
pub struct StubExplorer {
    reply: ExplorerReply,
    pub seen: Mutex<Vec<(String, ExplorerConfig)>>,
}

impl StubExplorer {
    pub fn new(reply: ExplorerReply) -> Self {
        Self {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Explorer for StubExplorer {
    async fn handle(
        &self,
        request: Request<Body>,
        config: ExplorerConfig,
    ) -> Result<Response<Body>, ExplorerError> {
        self.seen
            .lock()
            .unwrap()
            .push((request.uri().to_string(), config));

        let (content_type, body) = match &self.reply {
            ExplorerReply::Html(html) => ("text/html", *html),
            ExplorerReply::Json(json) => ("application/json", *json),
            ExplorerReply::Malformed => {
                return Err(ExplorerError::Malformed("not a response".into()));
            }
            ExplorerReply::Unavailable => {
                return Err(ExplorerError::Unavailable("connection refused".into()));
            }
        };
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-explorer-version", "1.0")
            .body(Body::from(body))
            .unwrap())
    }

    async fn ping(&self) -> Result<(), ExplorerError> {
        match self.reply {
            ExplorerReply::Unavailable => Err(ExplorerError::Unavailable("down".into())),
            _ => Ok(()),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub explorer: Arc<StubExplorer>,
    pub injector: Arc<HtmlInjector>,
}

impl TestApp {
    pub fn new(store: impl ObjectStore + 'static, reply: ExplorerReply) -> Self {
        Self::with_mode(Arc::new(store), reply, LinkMode::Direct)
    }

    pub fn with_mode(store: Arc<dyn ObjectStore>, reply: ExplorerReply, mode: LinkMode) -> Self {
        let explorer = Arc::new(StubExplorer::new(reply));
        let injector = Arc::new(HtmlInjector::new(
            &ScriptOptions {
                base_url: "https://files.example.com".into(),
                api_path: "/api/direct-download".into(),
                mode,
                hide_email: false,
            },
            1024 * 1024,
        ));
        let state = AppState {
            store,
            explorer: explorer.clone(),
            injector: injector.clone(),
            explorer_defaults: ExplorerConfig::default(),
            force_read_write: true,
            presign_ttl: Duration::from_secs(600),
        };
        Self {
            router: app(state),
            explorer,
            injector,
        }
    }

    /// Send a GET request to the test application.
    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
