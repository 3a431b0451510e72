use crate::services::ingest::DEFAULT_MAX_UPLOAD_BYTES;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

/// Header set by the fronting proxy with the real client address.
pub const DEFAULT_FORWARDED_HEADER: &str = "CF-Connecting-IP";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    /// Public base URL, scheme included, no trailing slash.
    pub domain: String,
    /// Header trusted for the client address; `None` trusts only the socket.
    pub forwarded_header: Option<String>,
    /// Store everything in one shared directory instead of per-client buckets.
    pub flat: bool,
    pub max_upload_bytes: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Album art thumbnail cache")]
pub struct Args {
    /// Host to bind to (overrides ART_CACHE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ART_CACHE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where thumbnails are stored (overrides ART_CACHE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Public base URL used in returned links (overrides ART_CACHE_DOMAIN)
    #[arg(long)]
    pub domain: Option<String>,

    /// Header carrying the real client address; empty disables it
    /// (overrides ART_CACHE_FORWARDED_HEADER)
    #[arg(long)]
    pub forwarded_header: Option<String>,

    /// Disable per-client buckets (overrides ART_CACHE_FLAT)
    #[arg(long)]
    pub flat: bool,

    /// Upload size ceiling in bytes (overrides ART_CACHE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_sources(Args::parse(), |key| env::var(key))
    }

    /// Merge CLI args over values from `lookup` (the process environment in
    /// production) over defaults.
    pub fn from_sources<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let var = |key: &str| -> Result<Option<String>> {
            match lookup(key) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };

        // --- Environment fallback ---
        let env_host = var("ART_CACHE_HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match var("ART_CACHE_PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ART_CACHE_PORT value `{}`", value))?,
            None => 8080,
        };
        let env_max = match var("ART_CACHE_MAX_UPLOAD_BYTES")? {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing ART_CACHE_MAX_UPLOAD_BYTES value `{}`", value))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let env_flat = var("ART_CACHE_FLAT")?
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        // --- Merge ---
        let storage_dir = args
            .storage_dir
            .or(var("ART_CACHE_STORAGE_DIR")?)
            .unwrap_or_default();
        let domain = args.domain.or(var("ART_CACHE_DOMAIN")?).unwrap_or_default();
        if storage_dir.trim().is_empty() || domain.trim().is_empty() {
            bail!("missing required configuration: storage dir (ART_CACHE_STORAGE_DIR) and domain (ART_CACHE_DOMAIN) must both be set");
        }

        let forwarded_header = args
            .forwarded_header
            .or(var("ART_CACHE_FORWARDED_HEADER")?)
            .unwrap_or_else(|| DEFAULT_FORWARDED_HEADER.into());
        let forwarded_header = Some(forwarded_header.trim().to_string()).filter(|h| !h.is_empty());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir,
            domain: normalize_domain(&domain),
            forwarded_header,
            flat: args.flat || env_flat,
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Strip trailing slashes and default to `http://` when no scheme is given.
fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
