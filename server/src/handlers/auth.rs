//! Caller identity.
//!
//! Sessions are issued by an external identity provider. The gateway in
//! front of this service forwards the authenticated user's id in the
//! `X-User-Id` header; here it is only resolved to a known user.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::models::UserRole;
use crate::state::AppState;
use crate::utils::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Administrator access required".to_string()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::AuthError("Missing X-User-Id header".to_string()))?;

        let id = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::AuthError("Invalid X-User-Id header".to_string()))?;

        let user = state
            .user_store
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::AuthError("Unknown user".to_string()))?;

        Ok(Self {
            id: user.id,
            role: user.role,
        })
    }
}
