use async_trait::async_trait;
use uuid::Uuid;

use super::{conflict_on_unique, PgStore};
use crate::db::{PaymentCredentials, ProfileUpdate, UserRepository};
use crate::models::{TicketPurchase, User};
use crate::utils::AppError;

const USER_COLUMNS: &str = "id, name, email, role, cpf_cnpj, phone, mp_access_token, \
     mp_refresh_token, mp_token_expires_at, mp_live_mode, mp_user_id, mp_public_key, \
     created_at, updated_at";

#[async_trait]
impl UserRepository for PgStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    async fn payment_access_token(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let token: Option<Option<String>> =
            sqlx::query_scalar("SELECT mp_access_token FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(token.flatten())
    }

    async fn store_payment_credentials(
        &self,
        user_id: Uuid,
        credentials: &PaymentCredentials,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                mp_access_token = $2,
                mp_refresh_token = $3,
                mp_token_expires_at = $4,
                mp_live_mode = $5,
                mp_user_id = $6,
                mp_public_key = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&credentials.access_token)
        .bind(&credentials.refresh_token)
        .bind(credentials.expires_at)
        .bind(credentials.live_mode)
        .bind(&credentials.provider_user_id)
        .bind(&credentials.public_key)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_payment_credentials(&self, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                mp_access_token = NULL,
                mp_refresh_token = NULL,
                mp_token_expires_at = NULL,
                mp_live_mode = FALSE,
                mp_user_id = NULL,
                mp_public_key = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $2, email = $3, cpf_cnpj = $4, phone = $5, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.cpf_cnpj)
        .bind(&update.phone)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "Email is already in use"))?;
        Ok(user)
    }

    async fn purchases_for_user(&self, user_id: Uuid) -> Result<Vec<TicketPurchase>, AppError> {
        let purchases = sqlx::query_as::<_, TicketPurchase>(
            r#"
            SELECT id, user_id, event_id, ticket_id, payment_status, payment_method,
                   total_price, purchase_date
            FROM ticket_purchases
            WHERE user_id = $1
            ORDER BY purchase_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(purchases)
    }
}
