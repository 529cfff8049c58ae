//! HTML Injector: patches explorer pages with the direct-link script.
//!
//! The page is treated as opaque text: the fragment is inserted once,
//! right before the first `</head>`. Pages without that marker, or that
//! already carry the fragment, are passed through untouched.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Response, header},
};
use bytes::{Bytes, BytesMut};
use clap::ValueEnum;
use futures::{StreamExt, future, stream};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const HEAD_CLOSE: &str = "</head>";
const FRAGMENT_MARKER: &str = "data-explorer-gateway=\"direct-link\"";
const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// How the injected button hands out links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Format `{base_url}/download/{key}` in the browser.
    #[default]
    Direct,
    /// Ask the link-issuance endpoint for a presigned URL.
    Presigned,
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("failed to read explorer page: {0}")]
    ReadBody(String),
}

/// Values baked into the injected script.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOptions {
    pub base_url: String,
    pub api_path: String,
    pub mode: LinkMode,
    pub hide_email: bool,
}

#[derive(Debug, Clone)]
pub struct HtmlInjector {
    fragment: String,
    max_html_bytes: usize,
}

impl HtmlInjector {
    pub fn new(options: &ScriptOptions, max_html_bytes: usize) -> Self {
        Self {
            fragment: render_fragment(options),
            max_html_bytes,
        }
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Insert the fragment before the first `</head>`.
    ///
    /// Returns `None` when the document has no `</head>` or is already
    /// patched.
    pub fn inject(&self, html: &str) -> Option<String> {
        if html.contains(FRAGMENT_MARKER) {
            return None;
        }
        let at = html.find(HEAD_CLOSE)?;
        let mut patched = String::with_capacity(html.len() + self.fragment.len());
        patched.push_str(&html[..at]);
        patched.push_str(&self.fragment);
        patched.push_str(&html[at..]);
        Some(patched)
    }

    /// Patch an explorer response if it is an uncompressed HTML page.
    ///
    /// Status and headers are kept, except `Content-Type` is normalised and
    /// the now-stale `Content-Length` is dropped. Pages larger than
    /// `max_html_bytes` or not encoded as UTF-8 are passed through
    /// unpatched. Only a failure to read the body is an error.
    pub async fn process(&self, response: Response<Body>) -> Result<Response<Body>, InjectError> {
        if !is_html(response.headers()) || is_content_encoded(response.headers()) {
            return Ok(response);
        }

        let (mut parts, body) = response.into_parts();
        let mut chunks = body.into_data_stream();
        let mut buffered = BytesMut::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|err| InjectError::ReadBody(err.to_string()))?;
            buffered.extend_from_slice(&chunk);
            if buffered.len() > self.max_html_bytes {
                debug!(
                    limit = self.max_html_bytes,
                    "explorer page too large to patch, passing through"
                );
                let read = Ok::<Bytes, axum::Error>(buffered.freeze());
                let body = Body::from_stream(stream::once(future::ready(read)).chain(chunks));
                return Ok(Response::from_parts(parts, body));
            }
        }

        let html = match String::from_utf8(Vec::from(buffered.freeze())) {
            Ok(html) => html,
            Err(err) => {
                debug!("explorer page is not UTF-8, passing through");
                return Ok(Response::from_parts(parts, Body::from(err.into_bytes())));
            }
        };

        let document = match self.inject(&html) {
            Some(patched) => patched,
            None => {
                debug!("page has no </head> or is already patched, passing through");
                html
            }
        };

        parts
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
        parts.headers.remove(header::CONTENT_LENGTH);
        Ok(Response::from_parts(parts, Body::from(document)))
    }
}

pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("text/html"))
}

fn is_content_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().eq_ignore_ascii_case("identity"))
}

/// Render the script block with `options` embedded as a JSON literal.
///
/// `<` is escaped so configured values cannot close the script element.
fn render_fragment(options: &ScriptOptions) -> String {
    let config = serde_json::to_string(options)
        .unwrap_or_else(|_| "{}".to_string())
        .replace('<', "\\u003c");
    SCRIPT_TEMPLATE.replace("__GATEWAY_CONFIG__", &config)
}

const SCRIPT_TEMPLATE: &str = r#"<script data-explorer-gateway="direct-link">
(() => {
  const CONFIG = __GATEWAY_CONFIG__;
  const ICON =
    '<svg xmlns="http://www.w3.org/2000/svg" fill="none" height="20" width="20" viewBox="0 0 24 24" stroke="currentColor"><path stroke-linecap="round" stroke-linejoin="round" stroke-width="2" d="M12 4v16m8-8H4"/></svg>';

  const showLink = (link) => prompt("Direct Download Link", link);

  const directLink = (key) => CONFIG.baseUrl + "/download/" + encodeURIComponent(key);

  const issueLink = async (key) => {
    try {
      const res = await fetch(CONFIG.apiPath + "?key=" + encodeURIComponent(key), {
        credentials: "same-origin",
      });
      if (!res.ok) throw new Error("status " + res.status);
      const data = await res.json();
      if (!data || typeof data.url !== "string") throw new Error("no url");
      showLink(data.url);
    } catch (_err) {
      alert("Failed to generate download link");
    }
  };

  const injectDirectLinkButton = (row) => {
    if (row.dataset.directLinkInjected) return;
    const shareBtn = row.querySelector('[data-testid="share"]');
    if (!shareBtn || !shareBtn.parentElement) return;

    const directBtn = shareBtn.cloneNode(true);
    directBtn.title = "Get Direct Download Link";
    directBtn.setAttribute("data-testid", "direct-link");
    const icon = directBtn.querySelector("svg");
    if (icon) icon.outerHTML = ICON;

    directBtn.addEventListener("click", (event) => {
      event.preventDefault();
      event.stopPropagation();
      const key = row.getAttribute("data-key");
      if (!key) return;
      if (CONFIG.mode === "presigned") {
        issueLink(key);
      } else {
        showLink(directLink(key));
      }
    });

    shareBtn.parentElement.appendChild(directBtn);
    row.dataset.directLinkInjected = "true";
  };

  const hideEmailControls = () => {
    document
      .querySelectorAll("aside a, aside button, nav a, nav button, .q-drawer .q-item")
      .forEach((el) => {
        if (el.style.display === "none") return;
        if (el.textContent.trim().toLowerCase() === "email") el.style.display = "none";
      });
  };

  const scan = () => {
    document.querySelectorAll('[data-testid="file-row"]').forEach((row) => {
      if (row.getAttribute("data-key")) injectDirectLinkButton(row);
    });
    if (CONFIG.hideEmail) hideEmailControls();
  };

  const start = () => {
    scan();
    new MutationObserver(scan).observe(document.body, { childList: true, subtree: true });
  };

  if (document.body) start();
  else document.addEventListener("DOMContentLoaded", start);
})();
</script>"#;
