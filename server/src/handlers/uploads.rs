use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::auth::AuthUser;
use super::extract::AppPath;
use crate::state::AppState;
use crate::utils::response::created;
use crate::utils::AppError;

const UPLOAD_FIELD: &str = "file";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Stores the multipart `file` field and returns its public URL. Authoring
/// requests then reference that URL.
pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Multipart error: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::ValidationError(format!("Failed to read upload: {e}")))?;

        let stored = state.storage.upload(data, &content_type).await?;
        tracing::info!(key = %stored.key, user_id = %user.id, "file uploaded");
        return Ok(created(stored, "File uploaded"));
    }

    Err(AppError::ValidationError(
        "Missing 'file' field in multipart form".to_string(),
    ))
}

pub async fn fetch_file(
    State(state): State<AppState>,
    AppPath(key): AppPath<String>,
) -> Result<Response, AppError> {
    let object = state.storage.fetch(&key).await?;
    Ok((
        [
            (header::CONTENT_TYPE, object.content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        object.data,
    )
        .into_response())
}
