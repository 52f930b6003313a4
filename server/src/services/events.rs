//! Event authoring: create, update, delete and read back the event
//! aggregate, keeping blob storage in step with the relational rows.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use uuid::Uuid;

use super::blobs::{discard_blobs, refs_of_input, refs_of_stored, BlobChanges};
use super::slug::allocate_slug;
use crate::db::{
    AggregateLayout, BatchRecord, DayRecord, EventAggregate, EventFields, EventRepository,
    EventUpdateRecord, NewEventRecord, ProducerProfile, PublicEvent, TicketFields, TicketWrite,
};
use crate::models::{CreatorRole, Event, EventMode, EventStatus, Ticket, TicketGender};
use crate::storage::ObjectStorage;
use crate::utils::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub uf: String,
}

/// Where the event happens. Address fields only exist for in-person events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Venue {
    Online,
    InPerson(Address),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketInput {
    /// Set when editing a ticket that already exists.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub sector_id: Uuid,
    pub price: i32,
    pub quantity: i32,
    #[serde(default = "default_gender")]
    pub gender: TicketGender,
    pub file: String,
    #[serde(default)]
    pub obs: Option<String>,
    #[serde(default)]
    pub is_nominal: bool,
}

fn default_gender() -> TicketGender {
    TicketGender::Unisex
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchInput {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub tickets: Vec<TicketInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DayInput {
    pub date: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub batches: Vec<BatchInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducerProfileInput {
    #[serde(default)]
    pub producer_name: Option<String>,
    #[serde(default)]
    pub show_producer: bool,
    #[serde(default)]
    pub producer_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProducerEventInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: Uuid,
    pub image: String,
    #[serde(default)]
    pub map: Option<String>,
    pub venue: Venue,
    #[serde(default)]
    pub producer: ProducerProfileInput,
    pub days: Vec<DayInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEventInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: Uuid,
    pub image: String,
    #[serde(default)]
    pub map: Option<String>,
    pub venue: Venue,
    pub date: DateTime<Utc>,
    pub ticket: TicketInput,
}

/// An edit of an existing event. The event id comes from the route.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateInput<T> {
    #[serde(flatten)]
    pub event: T,
    #[serde(default)]
    pub status: Option<EventStatus>,
    /// Rejects the edit with a conflict when the stored event has moved on.
    #[serde(default)]
    pub expected_version: Option<i32>,
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::ValidationError(message.into())
}

fn validate_url(value: &str, field: &str) -> Result<(), AppError> {
    let parsed = Url::parse(value).map_err(|_| invalid(format!("{field} must be a valid URL")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid(format!("{field} must be an http(s) URL"))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>, what: &str) -> Result<(), AppError> {
    if end < start {
        return Err(invalid(format!("{what} ends before it starts")));
    }
    Ok(())
}

fn validate_ticket(ticket: &TicketInput) -> Result<(), AppError> {
    validate_url(&ticket.file, "ticket file")?;
    if ticket.price < 0 {
        return Err(invalid("Ticket price cannot be negative"));
    }
    if ticket.quantity < 0 {
        return Err(invalid("Ticket quantity cannot be negative"));
    }
    Ok(())
}

/// Checks the fields shared by both event shapes and lowers them into the
/// row values. `date` is only set for user events.
#[allow(clippy::too_many_arguments)]
fn event_fields(
    title: &str,
    description: Option<String>,
    category_id: Uuid,
    image: &str,
    map: Option<String>,
    venue: &Venue,
    date: Option<DateTime<Utc>>,
    status: EventStatus,
) -> Result<EventFields, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(invalid("Title is required"));
    }
    validate_url(image, "image")?;
    let map = non_empty(map);
    if let Some(map) = &map {
        validate_url(map, "map")?;
    }

    let (mode, city, province, address, uf) = match venue {
        Venue::Online => (EventMode::Online, None, None, None, None),
        Venue::InPerson(place) => {
            for (name, value) in [
                ("city", &place.city),
                ("province", &place.province),
                ("address", &place.address),
                ("uf", &place.uf),
            ] {
                if value.trim().is_empty() {
                    return Err(invalid(format!("{name} is required for in-person events")));
                }
            }
            (
                EventMode::InPerson,
                Some(place.city.trim().to_string()),
                Some(place.province.trim().to_string()),
                Some(place.address.trim().to_string()),
                Some(place.uf.trim().to_string()),
            )
        }
    };

    Ok(EventFields {
        category_id,
        title: title.to_string(),
        description: non_empty(description),
        image: image.to_string(),
        status,
        mode,
        city,
        province,
        address,
        uf,
        date,
        map,
    })
}

/// Lowers a ticket into a write. Only ids that belong to the event being
/// edited are kept; anything else becomes a new ticket.
fn ticket_write(ticket: &TicketInput, existing: &HashSet<Uuid>) -> TicketWrite {
    TicketWrite {
        existing_id: ticket.id.filter(|id| existing.contains(id)),
        fields: TicketFields {
            sector_id: ticket.sector_id,
            price: ticket.price,
            quantity: ticket.quantity,
            gender: ticket.gender,
            is_nominal: ticket.is_nominal,
            file: ticket.file.clone(),
            obs: non_empty(ticket.obs.clone()),
        },
    }
}

fn producer_layout(
    input: &ProducerEventInput,
    existing: &HashSet<Uuid>,
) -> Result<AggregateLayout, AppError> {
    if input.days.is_empty() {
        return Err(invalid("A producer event needs at least one day"));
    }

    let mut seen = HashSet::new();
    let mut days = Vec::with_capacity(input.days.len());
    for day in &input.days {
        validate_window(day.start_time, day.end_time, "Event day")?;
        let mut batches = Vec::with_capacity(day.batches.len());
        for batch in &day.batches {
            if batch.name.trim().is_empty() {
                return Err(invalid("Batch name is required"));
            }
            validate_window(batch.start_time, batch.end_time, "Batch")?;
            let mut tickets = Vec::with_capacity(batch.tickets.len());
            for ticket in &batch.tickets {
                validate_ticket(ticket)?;
                if let Some(id) = ticket.id {
                    if !seen.insert(id) {
                        return Err(invalid(format!("Ticket {id} appears more than once")));
                    }
                }
                tickets.push(ticket_write(ticket, existing));
            }
            batches.push(BatchRecord {
                name: batch.name.trim().to_string(),
                start_time: batch.start_time,
                end_time: batch.end_time,
                tickets,
            });
        }
        days.push(DayRecord {
            date: day.date,
            start_time: day.start_time,
            end_time: day.end_time,
            batches,
        });
    }

    Ok(AggregateLayout::Producer {
        profile: ProducerProfile {
            producer_name: non_empty(input.producer.producer_name.clone())
                .map(|name| name.trim().to_string()),
            show_producer: input.producer.show_producer,
            producer_description: non_empty(input.producer.producer_description.clone()),
        },
        days,
    })
}

fn producer_fields(input: &ProducerEventInput, status: EventStatus) -> Result<EventFields, AppError> {
    event_fields(
        &input.title,
        input.description.clone(),
        input.category_id,
        &input.image,
        input.map.clone(),
        &input.venue,
        None,
        status,
    )
}

fn user_fields(input: &UserEventInput, status: EventStatus) -> Result<EventFields, AppError> {
    event_fields(
        &input.title,
        input.description.clone(),
        input.category_id,
        &input.image,
        input.map.clone(),
        &input.venue,
        Some(input.date),
        status,
    )
}

#[derive(Clone)]
pub struct EventService {
    events: Arc<dyn EventRepository>,
    storage: Arc<dyn ObjectStorage>,
}

impl EventService {
    pub fn new(events: Arc<dyn EventRepository>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { events, storage }
    }

    pub async fn create_producer_event(
        &self,
        organizer_id: Uuid,
        input: ProducerEventInput,
    ) -> Result<Uuid, AppError> {
        let fields = producer_fields(&input, EventStatus::Active)?;
        let layout = producer_layout(&input, &HashSet::new())?;
        self.create(organizer_id, fields, layout).await
    }

    pub async fn create_user_event(
        &self,
        organizer_id: Uuid,
        input: UserEventInput,
    ) -> Result<Uuid, AppError> {
        let fields = user_fields(&input, EventStatus::Active)?;
        validate_ticket(&input.ticket)?;
        let layout = AggregateLayout::User {
            ticket: ticket_write(&input.ticket, &HashSet::new()),
        };
        self.create(organizer_id, fields, layout).await
    }

    async fn create(
        &self,
        organizer_id: Uuid,
        fields: EventFields,
        layout: AggregateLayout,
    ) -> Result<Uuid, AppError> {
        let uploaded: Vec<String> = refs_of_input(&fields, &layout).into_iter().collect();

        let slug = match allocate_slug(self.events.as_ref(), &fields.title, None).await {
            Ok(slug) => slug,
            Err(e) => {
                discard_blobs(self.storage.as_ref(), &uploaded, "create aborted").await;
                return Err(e);
            }
        };

        let record = NewEventRecord {
            organizer_id,
            slug,
            fields,
            layout,
        };

        match self.events.create_event(&record).await {
            Ok(event_id) => {
                tracing::info!(event_id = %event_id, slug = %record.slug, "event created");
                Ok(event_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "event create failed, discarding uploads");
                discard_blobs(self.storage.as_ref(), &uploaded, "create rolled back").await;
                Err(e)
            }
        }
    }

    /// Loads an owned event of the given shape. Other organizers' events and
    /// events of the other shape are reported as missing.
    async fn owned(
        &self,
        organizer_id: Uuid,
        event_id: Uuid,
        shape: CreatorRole,
    ) -> Result<Event, AppError> {
        self.events
            .find_owned_event(event_id, organizer_id)
            .await?
            .filter(|event| event.creator_role == shape)
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
    }

    pub async fn update_producer_event(
        &self,
        organizer_id: Uuid,
        event_id: Uuid,
        input: UpdateInput<ProducerEventInput>,
    ) -> Result<Uuid, AppError> {
        // Structural checks first so a bad request never reaches the store.
        producer_fields(&input.event, EventStatus::Active)?;
        producer_layout(&input.event, &HashSet::new())?;

        let existing = self.owned(organizer_id, event_id, CreatorRole::Producer).await?;
        let tickets = self.events.event_tickets(event_id).await?;
        let known: HashSet<Uuid> = tickets.iter().map(|t| t.id).collect();

        let fields = producer_fields(&input.event, input.status.unwrap_or(existing.status))?;
        let layout = producer_layout(&input.event, &known)?;
        self.update(existing, &tickets, input.expected_version, fields, layout)
            .await
    }

    pub async fn update_user_event(
        &self,
        organizer_id: Uuid,
        event_id: Uuid,
        input: UpdateInput<UserEventInput>,
    ) -> Result<Uuid, AppError> {
        user_fields(&input.event, EventStatus::Active)?;
        validate_ticket(&input.event.ticket)?;

        let existing = self.owned(organizer_id, event_id, CreatorRole::User).await?;
        let tickets = self.events.event_tickets(event_id).await?;

        // A user event owns exactly one ticket; it is always edited in place.
        let mut ticket = ticket_write(&input.event.ticket, &HashSet::new());
        ticket.existing_id = tickets.first().map(|t| t.id);

        let fields = user_fields(&input.event, input.status.unwrap_or(existing.status))?;
        self.update(
            existing,
            &tickets,
            input.expected_version,
            fields,
            AggregateLayout::User { ticket },
        )
        .await
    }

    async fn update(
        &self,
        existing: Event,
        tickets: &[Ticket],
        expected_version: Option<i32>,
        fields: EventFields,
        layout: AggregateLayout,
    ) -> Result<Uuid, AppError> {
        let changes = BlobChanges::between(
            &refs_of_stored(&existing, tickets),
            &refs_of_input(&fields, &layout),
        );

        if let Some(expected) = expected_version {
            if expected != existing.version {
                discard_blobs(self.storage.as_ref(), &changes.fresh, "stale update").await;
                return Err(stale_version(existing.id));
            }
        }

        let slug = if fields.title != existing.title {
            match allocate_slug(self.events.as_ref(), &fields.title, Some(existing.id)).await {
                Ok(slug) => Some(slug),
                Err(e) => {
                    discard_blobs(self.storage.as_ref(), &changes.fresh, "update aborted").await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let record = EventUpdateRecord {
            id: existing.id,
            organizer_id: existing.organizer_id,
            expected_version,
            slug,
            fields,
            layout,
        };

        match self.events.update_event(&record).await {
            Ok(true) => {
                tracing::info!(
                    event_id = %existing.id,
                    orphaned = changes.orphaned.len(),
                    fresh = changes.fresh.len(),
                    "event updated"
                );
                discard_blobs(self.storage.as_ref(), &changes.orphaned, "replaced by update").await;
                Ok(existing.id)
            }
            Ok(false) => {
                discard_blobs(self.storage.as_ref(), &changes.fresh, "update not applied").await;
                Err(match expected_version {
                    Some(_) => stale_version(existing.id),
                    None => AppError::NotFound("Event not found".to_string()),
                })
            }
            Err(e) => {
                tracing::error!(event_id = %existing.id, error = %e, "event update failed");
                discard_blobs(self.storage.as_ref(), &changes.fresh, "update rolled back").await;
                Err(e)
            }
        }
    }

    pub async fn delete_event(
        &self,
        organizer_id: Uuid,
        event_id: Uuid,
        shape: CreatorRole,
    ) -> Result<(), AppError> {
        self.owned(organizer_id, event_id, shape).await?;

        let urls = self
            .events
            .delete_event(event_id, organizer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        tracing::info!(event_id = %event_id, blobs = urls.len(), "event deleted");
        discard_blobs(self.storage.as_ref(), &urls, "event deleted").await;
        Ok(())
    }

    pub async fn get_for_editing(
        &self,
        organizer_id: Uuid,
        event_id: Uuid,
        shape: CreatorRole,
    ) -> Result<EventAggregate, AppError> {
        self.events
            .load_aggregate(event_id, organizer_id)
            .await?
            .filter(|aggregate| aggregate.event.creator_role == shape)
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
    }

    pub async fn list_for_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError> {
        self.events.list_by_organizer(organizer_id).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<PublicEvent, AppError> {
        self.events
            .find_public_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
    }
}

fn stale_version(event_id: Uuid) -> AppError {
    AppError::Conflict(format!(
        "Event {event_id} was modified by someone else; reload and try again"
    ))
}
