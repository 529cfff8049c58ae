use anyhow::{Context, Result};
use explorer_gateway::{
    app,
    config::{AppConfig, StoreKind},
    handlers::download_handlers::DIRECT_DOWNLOAD_PATH,
    services::{
        disk_store::DiskStore,
        explorer::{ExplorerConfig, ProxyExplorer},
        html_injector::{HtmlInjector, ScriptOptions},
        object_store::ObjectStore,
    },
    state::AppState,
};
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        public_url = %cfg.public_url,
        explorer_url = %cfg.explorer_url,
        store = ?cfg.store,
        link_mode = ?cfg.link_mode,
        "starting explorer-gateway"
    );

    // --- Initialize collaborators ---
    let store = build_store(&cfg).await?;
    let explorer = ProxyExplorer::new(cfg.explorer_url.clone())
        .context("building explorer client")?;
    let injector = HtmlInjector::new(
        &ScriptOptions {
            base_url: cfg.public_url.clone(),
            api_path: DIRECT_DOWNLOAD_PATH.to_string(),
            mode: cfg.link_mode,
            hide_email: cfg.hide_email,
        },
        cfg.max_html_bytes,
    );

    let state = AppState {
        store,
        explorer: Arc::new(explorer),
        injector: Arc::new(injector),
        explorer_defaults: ExplorerConfig::default(),
        force_read_write: cfg.force_read_write,
        presign_ttl: cfg.presign_ttl,
    };

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    match cfg.store {
        StoreKind::Disk => {
            let dir = Path::new(&cfg.storage_dir);
            if !dir.exists() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating storage directory {}", dir.display()))?;
                tracing::info!("Created storage directory at {}", dir.display());
            }

            let signing_key = match &cfg.signing_secret {
                Some(secret) => secret.clone().into_bytes(),
                None => {
                    tracing::warn!(
                        "EXPLORER_GATEWAY_SIGNING_SECRET not set; presigned links will not survive a restart"
                    );
                    let mut key = Uuid::new_v4().as_bytes().to_vec();
                    key.extend_from_slice(Uuid::new_v4().as_bytes());
                    key
                }
            };
            Ok(Arc::new(DiskStore::new(
                dir,
                cfg.public_url.clone(),
                signing_key,
            )))
        }
        #[cfg(feature = "s3")]
        StoreKind::S3 => {
            let bucket = cfg
                .bucket
                .clone()
                .context("a bucket name is required for the s3 store")?;
            let store = explorer_gateway::services::s3_store::S3Store::new(
                bucket,
                cfg.s3_endpoint.as_deref(),
            )
            .await;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "s3"))]
        StoreKind::S3 => anyhow::bail!("this build does not include the `s3` feature"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
