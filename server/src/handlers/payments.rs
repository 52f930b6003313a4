use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;

use super::auth::AuthUser;
use super::extract::AppJson;
use crate::services::checkout::CheckoutRequest;
use crate::state::AppState;
use crate::utils::response::{empty_success, success};
use crate::utils::AppError;

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub code: String,
}

/// Buyers may check out anonymously; a signed-in buyer is only recorded in
/// the logs.
pub async fn create_checkout(
    State(state): State<AppState>,
    buyer: Option<AuthUser>,
    AppJson(request): AppJson<CheckoutRequest>,
) -> Result<Response, AppError> {
    let session = state
        .checkout
        .create_payment(request, buyer.map(|b| b.id))
        .await?;
    Ok(success(session, "Checkout created"))
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<OAuthCallbackRequest>,
) -> Result<Response, AppError> {
    let outcome = state.checkout.process_callback(user.id, &request.code).await?;
    Ok(success(outcome, "Payment account connected"))
}

pub async fn oauth_disconnect(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    state.checkout.disconnect(user.id).await?;
    Ok(empty_success("Payment account disconnected"))
}
