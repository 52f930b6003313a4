use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::handlers::auth::USER_ID_HEADER;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// CORS for the web front-end. `configured` is the comma-separated
/// `CORS_ALLOWED_ORIGINS` value, if any.
pub fn create_cors_layer(configured: Option<&str>) -> CorsLayer {
    let origins = parse_origins(configured.unwrap_or(DEFAULT_ALLOWED_ORIGINS));

    // Credentials cannot be combined with a wildcard origin.
    let (allow_origin, allow_credentials) = if origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, allowing any origin");
        (AllowOrigin::any(), false)
    } else {
        tracing::info!("CORS: Configured with {} allowed origin(s)", origins.len());
        (AllowOrigin::list(origins), true)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE])
        .allow_credentials(allow_credentials)
        .max_age(std::time::Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect()
}
