use axum::extract::State;
use axum::response::Response;
use chrono::Utc;

use super::auth::AuthUser;
use super::extract::AppQuery;
use crate::services::sweeper::{sweep_orphans, SweepOptions};
use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::AppError;

pub async fn sweep_storage(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(options): AppQuery<SweepOptions>,
) -> Result<Response, AppError> {
    user.require_admin()?;
    tracing::info!(user_id = %user.id, min_age_secs = options.min_age_secs, "orphan sweep requested");

    let report = sweep_orphans(
        state.event_store.as_ref(),
        state.storage.as_ref(),
        &options,
        Utc::now(),
    )
    .await?;
    Ok(success(report, "Storage sweep finished"))
}
