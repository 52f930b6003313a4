//! Relational store access.
//!
//! Services talk to the database through the repository traits below. Each
//! write method is one transaction: it either applies completely or leaves
//! nothing behind.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Batch, Category, Event, EventDay, EventMode, EventStatus, ProducerEvent, Ticket, TicketGender,
    TicketPurchase, TicketSector, TicketStatus, User,
};
use crate::utils::AppError;

pub mod postgres;

pub use postgres::PgStore;

/// Columns of the `events` row that callers write directly.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFields {
    pub category_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub image: String,
    pub status: EventStatus,
    pub mode: EventMode,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub uf: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub map: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketFields {
    pub sector_id: Uuid,
    pub price: i32,
    pub quantity: i32,
    pub gender: TicketGender,
    pub is_nominal: bool,
    pub file: String,
    pub obs: Option<String>,
}

/// A ticket to persist. `existing_id` is set when the row already exists
/// and must be updated in place instead of inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketWrite {
    pub existing_id: Option<Uuid>,
    pub fields: TicketFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tickets: Vec<TicketWrite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub batches: Vec<BatchRecord>,
}

/// `producer_name: None` keeps the stored name, or uses the organizer's
/// name when the row is first created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerProfile {
    pub producer_name: Option<String>,
    pub show_producer: bool,
    pub producer_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateLayout {
    Producer {
        profile: ProducerProfile,
        days: Vec<DayRecord>,
    },
    User {
        ticket: TicketWrite,
    },
}

impl AggregateLayout {
    pub fn tickets(&self) -> Vec<&TicketWrite> {
        match self {
            AggregateLayout::Producer { days, .. } => days
                .iter()
                .flat_map(|day| day.batches.iter())
                .flat_map(|batch| batch.tickets.iter())
                .collect(),
            AggregateLayout::User { ticket } => vec![ticket],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEventRecord {
    pub organizer_id: Uuid,
    pub slug: String,
    pub fields: EventFields,
    pub layout: AggregateLayout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventUpdateRecord {
    pub id: Uuid,
    pub organizer_id: Uuid,
    /// When set, the update only applies if the row is still at this version.
    pub expected_version: Option<i32>,
    /// New slug, only when the title changed.
    pub slug: Option<String>,
    pub fields: EventFields,
    pub layout: AggregateLayout,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: Batch,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    #[serde(flatten)]
    pub day: EventDay,
    pub batches: Vec<BatchView>,
}

/// An event with everything it owns, as reconstructed for editing.
/// `tickets` holds the tickets that belong to no batch (user events).
#[derive(Debug, Clone, Serialize)]
pub struct EventAggregate {
    pub event: Event,
    pub producer: Option<ProducerEvent>,
    pub days: Vec<DayView>,
    pub tickets: Vec<Ticket>,
}

impl EventAggregate {
    /// Nests batches under their day and tickets under their batch, keeping
    /// the order of the input slices.
    pub fn assemble(
        event: Event,
        producer: Option<ProducerEvent>,
        days: Vec<EventDay>,
        batches: Vec<Batch>,
        tickets: Vec<Ticket>,
    ) -> Self {
        let mut tickets_by_batch: HashMap<Uuid, Vec<Ticket>> = HashMap::new();
        let mut unbatched = Vec::new();
        for ticket in tickets {
            match ticket.batch_id {
                Some(batch_id) => tickets_by_batch.entry(batch_id).or_default().push(ticket),
                None => unbatched.push(ticket),
            }
        }

        let mut batches_by_day: HashMap<Uuid, Vec<BatchView>> = HashMap::new();
        for batch in batches {
            let tickets = tickets_by_batch.remove(&batch.id).unwrap_or_default();
            if let Some(day_id) = batch.event_day_id {
                batches_by_day
                    .entry(day_id)
                    .or_default()
                    .push(BatchView { batch, tickets });
            }
        }

        let days = days
            .into_iter()
            .map(|day| DayView {
                batches: batches_by_day.remove(&day.id).unwrap_or_default(),
                day,
            })
            .collect();

        Self {
            event,
            producer,
            days,
            tickets: unbatched,
        }
    }

    pub fn all_tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.days
            .iter()
            .flat_map(|day| day.batches.iter())
            .flat_map(|batch| batch.tickets.iter())
            .chain(self.tickets.iter())
    }
}

/// Ticket as shown to buyers: no artifact file, sector by name.
#[derive(Debug, Clone, Serialize)]
pub struct PublicTicket {
    pub id: Uuid,
    pub sector_id: Uuid,
    pub sector: String,
    pub price: i32,
    pub quantity: i32,
    pub gender: TicketGender,
    pub status: TicketStatus,
    pub is_nominal: bool,
    pub obs: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicBatch {
    pub id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tickets: Vec<PublicTicket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicDay {
    pub date: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub batches: Vec<PublicBatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicEvent {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub image: String,
    pub status: EventStatus,
    pub mode: EventMode,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub uf: Option<String>,
    pub map: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub category: String,
    pub producer_name: Option<String>,
    pub days: Vec<PublicDay>,
    pub tickets: Vec<PublicTicket>,
}

impl PublicEvent {
    pub fn from_aggregate(
        aggregate: EventAggregate,
        category: String,
        sectors: &HashMap<Uuid, String>,
    ) -> Self {
        let public_ticket = |ticket: Ticket| PublicTicket {
            id: ticket.id,
            sector_id: ticket.sector_id,
            sector: sectors.get(&ticket.sector_id).cloned().unwrap_or_default(),
            price: ticket.price,
            quantity: ticket.quantity,
            gender: ticket.gender,
            status: ticket.status,
            is_nominal: ticket.is_nominal,
            obs: ticket.obs,
        };

        let EventAggregate {
            event,
            producer,
            days,
            tickets,
        } = aggregate;

        let days = days
            .into_iter()
            .map(|view| PublicDay {
                date: view.day.date,
                start_time: view.day.start_time,
                end_time: view.day.end_time,
                batches: view
                    .batches
                    .into_iter()
                    .map(|b| PublicBatch {
                        id: b.batch.id,
                        name: b.batch.name,
                        start_time: b.batch.start_time,
                        end_time: b.batch.end_time,
                        tickets: b.tickets.into_iter().map(public_ticket).collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            id: event.id,
            slug: event.slug,
            title: event.title,
            description: event.description,
            image: event.image,
            status: event.status,
            mode: event.mode,
            city: event.city,
            province: event.province,
            address: event.address,
            uf: event.uf,
            map: event.map,
            date: event.date,
            category,
            producer_name: producer
                .filter(|p| p.show_producer)
                .map(|p| p.producer_name),
            days,
            tickets: tickets.into_iter().map(public_ticket).collect(),
        }
    }
}

/// Live ticket state used to price and validate a checkout.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CheckoutTicket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub sector_name: String,
    pub price: i32,
    pub quantity: i32,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub live_mode: bool,
    pub provider_user_id: Option<String>,
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub cpf_cnpj: Option<String>,
    pub phone: Option<String>,
}

/// Error for an update that would remove a ticket buyers hold purchases of.
pub fn purchased_ticket_removed(ticket_id: Uuid) -> AppError {
    AppError::Conflict(format!(
        "Ticket {ticket_id} has purchases and cannot be removed from the event"
    ))
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Whether any event other than `exclude` already uses `slug`.
    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, AppError>;

    async fn create_event(&self, record: &NewEventRecord) -> Result<Uuid, AppError>;

    async fn find_owned_event(&self, id: Uuid, organizer_id: Uuid)
        -> Result<Option<Event>, AppError>;

    async fn event_tickets(&self, event_id: Uuid) -> Result<Vec<Ticket>, AppError>;

    /// Returns `false` without writing anything when the event is gone, is
    /// no longer owned by the organizer, or has moved past
    /// `expected_version`. Dropping a ticket that has purchases fails with
    /// `Conflict` and rolls the whole update back.
    async fn update_event(&self, record: &EventUpdateRecord) -> Result<bool, AppError>;

    /// Deletes the event (descendants cascade) and returns every blob URL it
    /// referenced, or `None` if there was no such owned event.
    async fn delete_event(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<Vec<String>>, AppError>;

    async fn load_aggregate(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<EventAggregate>, AppError>;

    async fn list_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError>;

    /// Public view of a non-inactive event.
    async fn find_public_by_slug(&self, slug: &str) -> Result<Option<PublicEvent>, AppError>;

    async fn event_organizer(&self, event_id: Uuid) -> Result<Option<Uuid>, AppError>;

    async fn checkout_tickets(
        &self,
        event_id: Uuid,
        ticket_ids: &[Uuid],
    ) -> Result<Vec<CheckoutTicket>, AppError>;

    /// Every image, map and ticket file URL currently referenced.
    async fn referenced_blob_urls(&self) -> Result<Vec<String>, AppError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn payment_access_token(&self, user_id: Uuid) -> Result<Option<String>, AppError>;

    /// Overwrites every payment column at once. `false` if the user is gone.
    async fn store_payment_credentials(
        &self,
        user_id: Uuid,
        credentials: &PaymentCredentials,
    ) -> Result<bool, AppError>;

    async fn clear_payment_credentials(&self, user_id: Uuid) -> Result<bool, AppError>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, AppError>;

    async fn purchases_for_user(&self, user_id: Uuid) -> Result<Vec<TicketPurchase>, AppError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn categories(&self) -> Result<Vec<Category>, AppError>;

    async fn ticket_sectors(&self) -> Result<Vec<TicketSector>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreatorRole;

    fn event() -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            title: "Festival".into(),
            description: None,
            image: "https://cdn.example.com/files/img.png".into(),
            status: EventStatus::Active,
            mode: EventMode::Online,
            city: None,
            province: None,
            address: None,
            uf: None,
            date: None,
            map: None,
            slug: "festival".into(),
            creator_role: CreatorRole::Producer,
            organizer_id: Uuid::new_v4(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn ticket(event_id: Uuid, batch_id: Option<Uuid>, sector_id: Uuid) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            event_id,
            batch_id,
            buyer_id: None,
            sector_id,
            price: 5000,
            quantity: 10,
            is_nominal: false,
            gender: TicketGender::Unisex,
            status: TicketStatus::Available,
            obs: None,
            qr_code: None,
            file: "https://cdn.example.com/files/t.pdf".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_assemble_nests_by_day_and_batch() {
        let event = event();
        let now = Utc::now();
        let day = |_: usize| EventDay {
            id: Uuid::new_v4(),
            event_id: event.id,
            date: now,
            start_time: now,
            end_time: now,
        };
        let (d1, d2) = (day(1), day(2));
        let batch = |day_id: Uuid, name: &str| Batch {
            id: Uuid::new_v4(),
            event_id: event.id,
            event_day_id: Some(day_id),
            name: name.into(),
            start_time: now,
            end_time: now,
        };
        let (b1, b2, b3) = (batch(d1.id, "early"), batch(d1.id, "regular"), batch(d2.id, "door"));
        let sector = Uuid::new_v4();
        let tickets = vec![
            ticket(event.id, Some(b1.id), sector),
            ticket(event.id, Some(b3.id), sector),
            ticket(event.id, Some(b1.id), sector),
            ticket(event.id, None, sector),
        ];

        let aggregate = EventAggregate::assemble(
            event,
            None,
            vec![d1.clone(), d2.clone()],
            vec![b1.clone(), b2.clone(), b3.clone()],
            tickets,
        );

        assert_eq!(aggregate.days.len(), 2);
        assert_eq!(aggregate.days[0].day.id, d1.id);
        let names: Vec<&str> = aggregate.days[0]
            .batches
            .iter()
            .map(|b| b.batch.name.as_str())
            .collect();
        assert_eq!(names, vec!["early", "regular"]);
        assert_eq!(aggregate.days[0].batches[0].tickets.len(), 2);
        assert!(aggregate.days[0].batches[1].tickets.is_empty());
        assert_eq!(aggregate.days[1].batches[0].tickets.len(), 1);
        assert_eq!(aggregate.tickets.len(), 1);
        assert_eq!(aggregate.all_tickets().count(), 4);
    }

    #[test]
    fn test_public_view_hides_files_and_resolves_sectors() {
        let event = event();
        let sector = Uuid::new_v4();
        let t = ticket(event.id, None, sector);
        let aggregate = EventAggregate::assemble(event, None, vec![], vec![], vec![t]);
        let sectors = HashMap::from([(sector, "VIP".to_string())]);

        let public = PublicEvent::from_aggregate(aggregate, "Music".into(), &sectors);
        assert_eq!(public.category, "Music");
        assert_eq!(public.tickets[0].sector, "VIP");

        let json = serde_json::to_value(&public).unwrap();
        assert!(json["tickets"][0].get("file").is_none());
    }
}
