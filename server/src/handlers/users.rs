use axum::extract::State;
use axum::response::Response;

use super::auth::AuthUser;
use super::extract::AppJson;
use crate::services::users::UpdateProfileRequest;
use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::AppError;

pub async fn get_me(State(state): State<AppState>, user: AuthUser) -> Result<Response, AppError> {
    let profile = state.users.get_profile(user.id).await?;
    Ok(success(profile, "Profile retrieved"))
}

pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<UpdateProfileRequest>,
) -> Result<Response, AppError> {
    let profile = state.users.update_profile(user.id, request).await?;
    Ok(success(profile, "Profile updated"))
}

pub async fn my_purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let purchases = state.users.purchases(user.id).await?;
    Ok(success(purchases, "Purchases retrieved"))
}
