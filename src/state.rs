//! Shared, immutable application state handed to every handler.

use std::{sync::Arc, time::Duration};

use crate::services::{
    explorer::{Explorer, ExplorerConfig},
    html_injector::HtmlInjector,
    object_store::ObjectStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub explorer: Arc<dyn Explorer>,
    pub injector: Arc<HtmlInjector>,

    /// Baseline explorer options; each request derives its own copy.
    pub explorer_defaults: ExplorerConfig,

    /// Force read-write mode on every delegated request.
    pub force_read_write: bool,

    /// Lifetime of issued presigned URLs.
    pub presign_ttl: Duration,
}

impl AppState {
    /// Build the explorer options for one request.
    ///
    /// Always a fresh value: overrides never touch shared state.
    pub fn explorer_config(&self) -> ExplorerConfig {
        if self.force_read_write {
            self.explorer_defaults.with_read_only(false)
        } else {
            self.explorer_defaults
        }
    }
}
