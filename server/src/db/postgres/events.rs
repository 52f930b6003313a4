use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use super::{conflict_on_unique, PgStore};
use crate::db::{
    AggregateLayout, CheckoutTicket, EventAggregate, EventFields, EventRepository,
    EventUpdateRecord, NewEventRecord, ProducerProfile, PublicEvent, TicketWrite,
    purchased_ticket_removed,
};
use crate::models::{Batch, CreatorRole, Event, EventDay, EventStatus, ProducerEvent, Ticket};
use crate::utils::AppError;

const EVENT_COLUMNS: &str = "id, category_id, title, description, image, status, mode, city, \
     province, address, uf, date, map, slug, creator_role, organizer_id, version, created_at, \
     updated_at";

const TICKET_COLUMNS: &str = "id, event_id, batch_id, buyer_id, sector_id, price, quantity, \
     is_nominal, gender, status, obs, qr_code, file, created_at";

const SLUG_TAKEN: &str = "An event with this slug already exists";

async fn upsert_producer(
    conn: &mut PgConnection,
    event_id: Uuid,
    profile: &ProducerProfile,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO producer_events (event_id, producer_name, show_producer, producer_description)
        VALUES (
            $1,
            COALESCE($2, (SELECT u.name FROM users u JOIN events e ON e.organizer_id = u.id
                          WHERE e.id = $1)),
            $3,
            $4
        )
        ON CONFLICT (event_id) DO UPDATE SET
            producer_name = COALESCE($2, producer_events.producer_name),
            show_producer = EXCLUDED.show_producer,
            producer_description = EXCLUDED.producer_description,
            updated_at = NOW()
        "#,
    )
    .bind(event_id)
    .bind(&profile.producer_name)
    .bind(profile.show_producer)
    .bind(&profile.producer_description)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Inserts a new ticket, or moves an existing one into place with its new
/// values.
async fn write_ticket(
    conn: &mut PgConnection,
    event_id: Uuid,
    batch_id: Option<Uuid>,
    position: usize,
    ticket: &TicketWrite,
) -> Result<(), AppError> {
    let fields = &ticket.fields;
    match ticket.existing_id {
        Some(id) => {
            let result = sqlx::query(
                r#"
                UPDATE tickets SET
                    batch_id = $3, position = $4, sector_id = $5, price = $6, quantity = $7,
                    gender = $8, is_nominal = $9, file = $10, obs = $11
                WHERE id = $1 AND event_id = $2
                "#,
            )
            .bind(id)
            .bind(event_id)
            .bind(batch_id)
            .bind(position as i32)
            .bind(fields.sector_id)
            .bind(fields.price)
            .bind(fields.quantity)
            .bind(fields.gender)
            .bind(fields.is_nominal)
            .bind(&fields.file)
            .bind(&fields.obs)
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::Conflict(format!("Ticket {id} no longer exists")));
            }
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO tickets
                    (event_id, batch_id, position, sector_id, price, quantity, gender,
                     is_nominal, file, obs)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(event_id)
            .bind(batch_id)
            .bind(position as i32)
            .bind(fields.sector_id)
            .bind(fields.price)
            .bind(fields.quantity)
            .bind(fields.gender)
            .bind(fields.is_nominal)
            .bind(&fields.file)
            .bind(&fields.obs)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Writes the days, batches and tickets (or the single ticket) under an
/// event row that already exists.
async fn write_layout(
    conn: &mut PgConnection,
    event_id: Uuid,
    layout: &AggregateLayout,
) -> Result<(), AppError> {
    match layout {
        AggregateLayout::Producer { profile, days } => {
            upsert_producer(conn, event_id, profile).await?;

            for (day_position, day) in days.iter().enumerate() {
                let day_id: Uuid = sqlx::query_scalar(
                    r#"
                    INSERT INTO event_days (event_id, position, date, start_time, end_time)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id
                    "#,
                )
                .bind(event_id)
                .bind(day_position as i32)
                .bind(day.date)
                .bind(day.start_time)
                .bind(day.end_time)
                .fetch_one(&mut *conn)
                .await?;

                for (batch_position, batch) in day.batches.iter().enumerate() {
                    let batch_id: Uuid = sqlx::query_scalar(
                        r#"
                        INSERT INTO batches
                            (event_id, event_day_id, position, name, start_time, end_time)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        RETURNING id
                        "#,
                    )
                    .bind(event_id)
                    .bind(day_id)
                    .bind(batch_position as i32)
                    .bind(&batch.name)
                    .bind(batch.start_time)
                    .bind(batch.end_time)
                    .fetch_one(&mut *conn)
                    .await?;

                    for (position, ticket) in batch.tickets.iter().enumerate() {
                        write_ticket(conn, event_id, Some(batch_id), position, ticket).await?;
                    }
                }
            }
        }
        AggregateLayout::User { ticket } => {
            write_ticket(conn, event_id, None, 0, ticket).await?;
        }
    }
    Ok(())
}

fn creator_role(layout: &AggregateLayout) -> CreatorRole {
    match layout {
        AggregateLayout::Producer { .. } => CreatorRole::Producer,
        AggregateLayout::User { .. } => CreatorRole::User,
    }
}

impl PgStore {
    async fn load_parts(&self, event: Event) -> Result<EventAggregate, AppError> {
        let producer = sqlx::query_as::<_, ProducerEvent>(
            "SELECT event_id, producer_name, show_producer, producer_description \
             FROM producer_events WHERE event_id = $1",
        )
        .bind(event.id)
        .fetch_optional(self.pool())
        .await?;

        let days = sqlx::query_as::<_, EventDay>(
            "SELECT id, event_id, date, start_time, end_time FROM event_days \
             WHERE event_id = $1 ORDER BY position",
        )
        .bind(event.id)
        .fetch_all(self.pool())
        .await?;

        let batches = sqlx::query_as::<_, Batch>(
            "SELECT id, event_id, event_day_id, name, start_time, end_time FROM batches \
             WHERE event_id = $1 ORDER BY position",
        )
        .bind(event.id)
        .fetch_all(self.pool())
        .await?;

        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_id = $1 ORDER BY position, created_at"
        ))
        .bind(event.id)
        .fetch_all(self.pool())
        .await?;

        Ok(EventAggregate::assemble(event, producer, days, batches, tickets))
    }
}

#[async_trait]
impl EventRepository for PgStore {
    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM events WHERE slug = $1 \
             AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn create_event(&self, record: &NewEventRecord) -> Result<Uuid, AppError> {
        let fields: &EventFields = &record.fields;
        let mut tx = self.pool().begin().await?;

        let event_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO events
                (category_id, title, description, image, status, mode, city, province,
                 address, uf, date, map, slug, creator_role, organizer_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(fields.category_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.image)
        .bind(fields.status)
        .bind(fields.mode)
        .bind(&fields.city)
        .bind(&fields.province)
        .bind(&fields.address)
        .bind(&fields.uf)
        .bind(fields.date)
        .bind(&fields.map)
        .bind(&record.slug)
        .bind(creator_role(&record.layout))
        .bind(record.organizer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, SLUG_TAKEN))?;

        write_layout(&mut tx, event_id, &record.layout).await?;
        tx.commit().await?;

        Ok(event_id)
    }

    async fn find_owned_event(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 AND organizer_id = $2"
        ))
        .bind(id)
        .bind(organizer_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(event)
    }

    async fn event_tickets(&self, event_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_id = $1 ORDER BY position, created_at"
        ))
        .bind(event_id)
        .fetch_all(self.pool())
        .await?;
        Ok(tickets)
    }

    async fn update_event(&self, record: &EventUpdateRecord) -> Result<bool, AppError> {
        let fields = &record.fields;
        let mut tx = self.pool().begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE events SET
                category_id = $3, title = $4, description = $5, image = $6, status = $7,
                mode = $8, city = $9, province = $10, address = $11, uf = $12, date = $13,
                map = $14, slug = COALESCE($15, slug), version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND organizer_id = $2 AND ($16::int IS NULL OR version = $16)
            "#,
        )
        .bind(record.id)
        .bind(record.organizer_id)
        .bind(fields.category_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.image)
        .bind(fields.status)
        .bind(fields.mode)
        .bind(&fields.city)
        .bind(&fields.province)
        .bind(&fields.address)
        .bind(&fields.uf)
        .bind(fields.date)
        .bind(&fields.map)
        .bind(&record.slug)
        .bind(record.expected_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, SLUG_TAKEN))?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        let retained: Vec<Uuid> = record
            .layout
            .tickets()
            .into_iter()
            .filter_map(|ticket| ticket.existing_id)
            .collect();

        let purchased: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT t.id FROM tickets t
            WHERE t.event_id = $1 AND NOT (t.id = ANY($2))
              AND EXISTS (SELECT 1 FROM ticket_purchases p WHERE p.ticket_id = t.id)
            LIMIT 1
            "#,
        )
        .bind(record.id)
        .bind(&retained)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ticket_id) = purchased {
            return Err(purchased_ticket_removed(ticket_id));
        }

        sqlx::query("DELETE FROM tickets WHERE event_id = $1 AND NOT (id = ANY($2))")
            .bind(record.id)
            .bind(&retained)
            .execute(&mut *tx)
            .await?;

        // Detach what is left so the batch rebuild below does not touch it.
        sqlx::query("UPDATE tickets SET batch_id = NULL WHERE event_id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM batches WHERE event_id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM event_days WHERE event_id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        write_layout(&mut tx, record.id, &record.layout).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn delete_event(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<Vec<String>>, AppError> {
        let mut tx = self.pool().begin().await?;

        let row: Option<(String, Option<String>)> = sqlx::query_as(
            "SELECT image, map FROM events WHERE id = $1 AND organizer_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(organizer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((image, map)) = row else {
            return Ok(None);
        };

        let ticket_files: Vec<String> =
            sqlx::query_scalar("SELECT file FROM tickets WHERE event_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut urls = vec![image];
        urls.extend(map);
        urls.extend(ticket_files);
        Ok(Some(urls))
    }

    async fn load_aggregate(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<EventAggregate>, AppError> {
        match self.find_owned_event(id, organizer_id).await? {
            Some(event) => Ok(Some(self.load_parts(event).await?)),
            None => Ok(None),
        }
    }

    async fn list_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(organizer_id)
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }

    async fn find_public_by_slug(&self, slug: &str) -> Result<Option<PublicEvent>, AppError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE slug = $1 AND status <> $2"
        ))
        .bind(slug)
        .bind(EventStatus::Inactive)
        .fetch_optional(self.pool())
        .await?;

        let Some(event) = event else {
            return Ok(None);
        };

        let category: String = sqlx::query_scalar("SELECT name FROM categories WHERE id = $1")
            .bind(event.category_id)
            .fetch_one(self.pool())
            .await?;

        let sectors: HashMap<Uuid, String> = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT DISTINCT s.id, s.name FROM ticket_sectors s \
             JOIN tickets t ON t.sector_id = s.id WHERE t.event_id = $1",
        )
        .bind(event.id)
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .collect();

        let aggregate = self.load_parts(event).await?;
        Ok(Some(PublicEvent::from_aggregate(aggregate, category, &sectors)))
    }

    async fn event_organizer(&self, event_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let organizer = sqlx::query_scalar("SELECT organizer_id FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(organizer)
    }

    async fn checkout_tickets(
        &self,
        event_id: Uuid,
        ticket_ids: &[Uuid],
    ) -> Result<Vec<CheckoutTicket>, AppError> {
        let tickets = sqlx::query_as::<_, CheckoutTicket>(
            r#"
            SELECT t.id, t.event_id, s.name AS sector_name, t.price, t.quantity, t.status
            FROM tickets t
            JOIN ticket_sectors s ON s.id = t.sector_id
            WHERE t.event_id = $1 AND t.id = ANY($2)
            "#,
        )
        .bind(event_id)
        .bind(ticket_ids)
        .fetch_all(self.pool())
        .await?;
        Ok(tickets)
    }

    async fn referenced_blob_urls(&self) -> Result<Vec<String>, AppError> {
        let urls = sqlx::query_scalar(
            r#"
            SELECT image FROM events
            UNION ALL SELECT map FROM events WHERE map IS NOT NULL
            UNION ALL SELECT file FROM tickets
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(urls)
    }
}
