use async_trait::async_trait;

use super::PgStore;
use crate::db::CatalogRepository;
use crate::models::{Category, TicketSector};
use crate::utils::AppError;

#[async_trait]
impl CatalogRepository for PgStore {
    async fn categories(&self) -> Result<Vec<Category>, AppError> {
        let rows = sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    async fn ticket_sectors(&self) -> Result<Vec<TicketSector>, AppError> {
        let rows =
            sqlx::query_as::<_, TicketSector>("SELECT id, name FROM ticket_sectors ORDER BY name")
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }
}
