use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

use crate::services::html_injector::LinkMode;

/// Which object store backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Read objects from a local directory.
    Disk,
    /// Any S3-compatible bucket (requires the `s3` feature).
    S3,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Public origin of the gateway, used in download links.
    pub public_url: String,
    /// Base URL of the upstream explorer.
    pub explorer_url: String,
    pub store: StoreKind,
    pub storage_dir: String,
    pub bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub link_mode: LinkMode,
    pub presign_ttl: Duration,
    pub signing_secret: Option<String>,
    pub hide_email: bool,
    pub force_read_write: bool,
    pub max_html_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Direct-link gateway in front of a bucket file explorer")]
pub struct Args {
    /// Host to bind to (overrides EXPLORER_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides EXPLORER_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Public base URL of this gateway (overrides EXPLORER_GATEWAY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Upstream explorer base URL (overrides EXPLORER_GATEWAY_EXPLORER_URL)
    #[arg(long)]
    pub explorer_url: Option<String>,

    /// Object store backend (overrides EXPLORER_GATEWAY_STORE)
    #[arg(long, value_enum)]
    pub store: Option<StoreKind>,

    /// Directory served by the disk store (overrides EXPLORER_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Bucket name for the S3 store (overrides EXPLORER_GATEWAY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Custom S3 endpoint, e.g. an R2 account URL (overrides EXPLORER_GATEWAY_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// How the injected button issues links (overrides EXPLORER_GATEWAY_LINK_MODE)
    #[arg(long, value_enum)]
    pub link_mode: Option<LinkMode>,

    /// Presigned URL lifetime in seconds (overrides EXPLORER_GATEWAY_PRESIGN_TTL_SECS)
    #[arg(long)]
    pub presign_ttl_secs: Option<u64>,

    /// Hide the explorer's "email" sidebar entry
    #[arg(long)]
    pub hide_email: bool,

    /// Leave the explorer in its own read-only mode instead of forcing read-write
    #[arg(long)]
    pub explorer_read_only: bool,
}

const ENV_PREFIX: &str = "EXPLORER_GATEWAY_";

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::merge(args, |name| env::var(name).ok())
    }

    /// Merge CLI args over values from `lookup` (an environment reader).
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        // --- Environment fallback ---
        let env_host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&var, "PORT", 3000u16)?;
        let env_public = var("PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into());
        let env_explorer =
            var("EXPLORER_URL").unwrap_or_else(|| "http://127.0.0.1:8787".into());
        let env_store = enum_var(&var, "STORE", StoreKind::Disk)?;
        let env_storage = var("STORAGE_DIR").unwrap_or_else(|| "./data/bucket".into());
        let env_link_mode = enum_var(&var, "LINK_MODE", LinkMode::Direct)?;
        let env_ttl = parse_var(&var, "PRESIGN_TTL_SECS", 3600u64)?;
        let env_hide_email = parse_var(&var, "HIDE_EMAIL", false)?;
        let env_read_only = parse_var(&var, "EXPLORER_READ_ONLY", false)?;
        let max_html_bytes = parse_var(&var, "MAX_HTML_BYTES", 8 * 1024 * 1024usize)?;

        let presign_ttl_secs = args.presign_ttl_secs.unwrap_or(env_ttl);
        if presign_ttl_secs == 0 {
            anyhow::bail!("presign TTL must be at least one second");
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            public_url: args
                .public_url
                .unwrap_or(env_public)
                .trim_end_matches('/')
                .to_string(),
            explorer_url: args.explorer_url.unwrap_or(env_explorer),
            store: args.store.unwrap_or(env_store),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            bucket: args.bucket.or_else(|| var("BUCKET")),
            s3_endpoint: args.s3_endpoint.or_else(|| var("S3_ENDPOINT")),
            link_mode: args.link_mode.unwrap_or(env_link_mode),
            presign_ttl: Duration::from_secs(presign_ttl_secs),
            signing_secret: var("SIGNING_SECRET"),
            hide_email: args.hide_email || env_hide_email,
            force_read_write: !(args.explorer_read_only || env_read_only),
            max_html_bytes,
        };

        if cfg.store == StoreKind::S3 && cfg.bucket.is_none() {
            anyhow::bail!("{ENV_PREFIX}BUCKET (or --bucket) is required for the s3 store");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {ENV_PREFIX}{name} value `{value}`")),
        None => Ok(default),
    }
}

fn enum_var<T: ValueEnum>(var: impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T> {
    match var(name) {
        Some(value) => T::from_str(value.trim(), true)
            .map_err(|err| anyhow::anyhow!("parsing {ENV_PREFIX}{name} value `{value}`: {err}")),
        None => Ok(default),
    }
}
