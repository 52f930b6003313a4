use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{ProfileUpdate, UserRepository};
use crate::models::{TicketPurchase, User, UserRole};
use crate::utils::AppError;

/// What a user sees of their own account. Tokens never leave the server.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub cpf_cnpj: Option<String>,
    pub phone: Option<String>,
    pub payment_account_connected: bool,
    pub payment_live_mode: bool,
    pub payment_token_expires_at: Option<DateTime<Utc>>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            payment_account_connected: user.payment_account_connected(),
            payment_live_mode: user.mp_live_mode,
            payment_token_expires_at: user.mp_token_expires_at,
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            cpf_cnpj: user.cpf_cnpj,
            phone: user.phone,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub cpf_cnpj: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        self.users
            .find_user(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Name is required".to_string()));
        }
        let email = request.email.trim().to_lowercase();
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AppError::ValidationError("A valid email is required".to_string()));
        }

        let update = ProfileUpdate {
            name: name.to_string(),
            email,
            cpf_cnpj: optional(request.cpf_cnpj),
            phone: optional(request.phone),
        };

        let user = self
            .users
            .update_profile(user_id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        tracing::info!(user_id = %user_id, "profile updated");
        Ok(user.into())
    }

    pub async fn purchases(&self, user_id: Uuid) -> Result<Vec<TicketPurchase>, AppError> {
        self.users.purchases_for_user(user_id).await
    }
}
