//! Explorer Delegate: the third-party file browser the gateway fronts.
//!
//! Every request the gateway does not intercept is handed to an [`Explorer`]
//! together with an [`ExplorerConfig`] built for that request alone.

use async_trait::async_trait;
use axum::{
    body::{Body, HttpBody},
    http::{HeaderMap, HeaderName, HeaderValue, Request, Response, header},
};
use futures::TryStreamExt;
use std::io;
use thiserror::Error;
use tracing::debug;

/// Header carrying the per-request read-only flag to the upstream explorer.
pub const READONLY_HEADER: &str = "x-explorer-readonly";

#[derive(Debug, Error)]
pub enum ExplorerError {
    /// The explorer answered with something that is not a usable response.
    #[error("malformed explorer output: {0}")]
    Malformed(String),
    /// The explorer could not be reached or failed mid-request.
    #[error("explorer unavailable: {0}")]
    Unavailable(String),
}

/// Options passed to the explorer for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// When set, the explorer refuses uploads, renames and deletes.
    pub read_only: bool,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self { read_only: true }
    }
}

impl ExplorerConfig {
    pub fn with_read_only(self, read_only: bool) -> Self {
        Self { read_only }
    }
}

#[async_trait]
pub trait Explorer: Send + Sync {
    async fn handle(
        &self,
        request: Request<Body>,
        config: ExplorerConfig,
    ) -> Result<Response<Body>, ExplorerError>;

    /// Cheap reachability check used by the readiness probe.
    async fn ping(&self) -> Result<(), ExplorerError>;
}

/// Hop-by-hop headers are connection-scoped and never forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Reverse proxy to an explorer running as its own HTTP service.
#[derive(Clone)]
pub struct ProxyExplorer {
    client: reqwest::Client,
    upstream: String,
}

impl ProxyExplorer {
    pub fn new(upstream: impl Into<String>) -> Result<Self, ExplorerError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ExplorerError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            upstream: upstream.into().trim_end_matches('/').to_string(),
        })
    }

    fn target_url(&self, request: &Request<Body>) -> String {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.upstream, path_and_query)
    }
}

/// Copy request headers that are safe to forward upstream.
///
/// `accept-encoding` is dropped so HTML comes back uncompressed and can be
/// patched.
fn forward_headers(incoming: &HeaderMap, config: ExplorerConfig) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 1);
    for (name, value) in incoming {
        if HOP_BY_HOP.contains(name)
            || name == header::HOST
            || name == header::ACCEPT_ENCODING
            || name.as_str() == READONLY_HEADER
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(
        HeaderName::from_static(READONLY_HEADER),
        HeaderValue::from_static(if config.read_only { "true" } else { "false" }),
    );
    headers
}

fn classify(err: reqwest::Error) -> ExplorerError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        ExplorerError::Unavailable(err.to_string())
    } else {
        ExplorerError::Malformed(err.to_string())
    }
}

#[async_trait]
impl Explorer for ProxyExplorer {
    async fn handle(
        &self,
        request: Request<Body>,
        config: ExplorerConfig,
    ) -> Result<Response<Body>, ExplorerError> {
        let url = self.target_url(&request);
        let method = request.method().clone();
        let headers = forward_headers(request.headers(), config);
        let body = request.into_body();

        debug!(%method, %url, read_only = config.read_only, "forwarding to explorer");
        let mut outgoing = self.client.request(method, &url).headers(headers);
        if body.size_hint().exact() != Some(0) {
            outgoing = outgoing.body(reqwest::Body::wrap_stream(
                body.into_data_stream().map_err(io::Error::other),
            ));
        }
        let upstream = outgoing.send().await.map_err(classify)?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(out) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if !HOP_BY_HOP.contains(name) {
                    out.append(name.clone(), value.clone());
                }
            }
        }
        let stream = upstream.bytes_stream().map_err(io::Error::other);
        response
            .body(Body::from_stream(stream))
            .map_err(|err| ExplorerError::Malformed(err.to_string()))
    }

    async fn ping(&self) -> Result<(), ExplorerError> {
        self.client
            .head(format!("{}/", self.upstream))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_read_only() {
        assert!(ExplorerConfig::default().read_only);
        assert!(!ExplorerConfig::default().with_read_only(false).read_only);
    }

    #[test]
    fn forwarded_headers_drop_hop_by_hop_and_set_flag() {
        let mut incoming = HeaderMap::new();
        incoming.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        incoming.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        incoming.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        incoming.insert(header::COOKIE, HeaderValue::from_static("session=1"));
        incoming.insert(READONLY_HEADER, HeaderValue::from_static("true"));

        let headers = forward_headers(&incoming, ExplorerConfig { read_only: false });

        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::ACCEPT_ENCODING).is_none());
        assert_eq!(headers.get(header::COOKIE).unwrap(), "session=1");
        assert_eq!(headers.get_all(READONLY_HEADER).iter().count(), 1);
        assert_eq!(headers.get(READONLY_HEADER).unwrap(), "false");
    }

    #[test]
    fn target_url_keeps_path_and_query() {
        let explorer = ProxyExplorer::new("http://127.0.0.1:8787/").unwrap();
        let request = Request::builder()
            .uri("/api/buckets/files?prefix=a%2Fb")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            explorer.target_url(&request),
            "http://127.0.0.1:8787/api/buckets/files?prefix=a%2Fb"
        );
    }
}
