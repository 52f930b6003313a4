//! Service configuration loaded from environment variables.
//!
//! Everything except the Mercado Pago credentials has a development default,
//! so the server starts locally with only a database running.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::SecurityHeaders;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/boxoffice";
const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_BLOB_PUBLIC_URL: &str = "http://localhost:3001/files";
const DEFAULT_MP_API_URL: &str = "https://api.mercadopago.com";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// OAuth application registered with Mercado Pago. Without it the OAuth
/// callback cannot exchange codes, but checkout still works for organizers
/// that are already connected.
#[derive(Debug, Clone, Default)]
pub struct MercadoPagoConfig {
    pub api_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub http_addr: SocketAddr,
    /// Public URL of the web front-end; payment back-urls point here.
    pub app_url: String,
    pub blob_storage_path: PathBuf,
    /// Prefix that, joined with a blob key, gives its public URL.
    pub blob_public_url: String,
    pub max_upload_bytes: usize,
    pub mercado_pago: MercadoPagoConfig,
    pub production: bool,
    pub cors_allowed_origins: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: 5,
            http_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            app_url: DEFAULT_APP_URL.to_string(),
            blob_storage_path: PathBuf::from("./blobs"),
            blob_public_url: DEFAULT_BLOB_PUBLIC_URL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            mercado_pago: MercadoPagoConfig {
                api_url: DEFAULT_MP_API_URL.to_string(),
                client_id: None,
                client_secret: None,
                redirect_uri: None,
                timeout: Duration::from_secs(5),
            },
            production: false,
            cors_allowed_origins: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, falling back to
    /// defaults for anything missing or unparsable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(raw) = non_empty("DATABASE_MAX_CONNECTIONS") {
            match raw.parse::<u32>() {
                Ok(n) if n > 0 => config.database_max_connections = n,
                _ => tracing::warn!(value = %raw, "Invalid DATABASE_MAX_CONNECTIONS, using default"),
            }
        }

        if let Some(raw) = non_empty("HTTP_ADDR") {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => config.http_addr = addr,
                Err(_) => tracing::warn!(value = %raw, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(url) = non_empty("APP_URL") {
            config.app_url = url.trim_end_matches('/').to_string();
        }

        if let Some(path) = non_empty("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Some(url) = non_empty("BLOB_PUBLIC_URL") {
            config.blob_public_url = url.trim_end_matches('/').to_string();
        }

        if let Some(raw) = non_empty("MAX_UPLOAD_BYTES") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_bytes = n,
                _ => tracing::warn!(value = %raw, "Invalid MAX_UPLOAD_BYTES, using default"),
            }
        }

        if let Some(url) = non_empty("MP_API_URL") {
            config.mercado_pago.api_url = url.trim_end_matches('/').to_string();
        }
        config.mercado_pago.client_id = non_empty("MP_CLIENT_ID");
        config.mercado_pago.client_secret = non_empty("MP_CLIENT_SECRET");
        config.mercado_pago.redirect_uri = non_empty("MP_REDIRECT_URI");

        if let Some(raw) = non_empty("MP_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.mercado_pago.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "Invalid MP_TIMEOUT_SECS, using default"),
            }
        }

        config.production = lookup("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        config.cors_allowed_origins = non_empty("CORS_ALLOWED_ORIGINS");

        config
    }

    pub fn payment_success_url(&self) -> String {
        format!("{}/payment-success", self.app_url)
    }

    pub fn payment_failure_url(&self) -> String {
        format!("{}/payment-failure", self.app_url)
    }
}
