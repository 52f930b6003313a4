use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_gender", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketGender {
    Male,
    Female,
    Unisex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Available,
    Sold,
    Cancelled,
}

/// A sellable ticket line. `price` is in cents; `quantity` is the number
/// still available.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub buyer_id: Option<Uuid>,
    pub sector_id: Uuid,
    pub price: i32,
    pub quantity: i32,
    pub is_nominal: bool,
    pub gender: TicketGender,
    pub status: TicketStatus,
    pub obs: Option<String>,
    pub qr_code: Option<String>,
    pub file: String,
    pub created_at: DateTime<Utc>,
}
