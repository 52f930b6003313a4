use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
}

/// Rows are written by the settlement flow; this service only reads them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketPurchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub ticket_id: Uuid,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub total_price: i32,
    pub purchase_date: DateTime<Utc>,
}
