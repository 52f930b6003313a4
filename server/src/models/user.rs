use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    User,
    Producer,
}

/// A platform account. The `mp_*` columns hold the organizer's Mercado Pago
/// sub-account credentials and are only written by the OAuth callback and
/// by disconnect.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub cpf_cnpj: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub mp_access_token: Option<String>,
    #[serde(skip_serializing)]
    pub mp_refresh_token: Option<String>,
    pub mp_token_expires_at: Option<DateTime<Utc>>,
    pub mp_live_mode: bool,
    pub mp_user_id: Option<String>,
    pub mp_public_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn payment_account_connected(&self) -> bool {
        self.mp_access_token.is_some()
    }
}
