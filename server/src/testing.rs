//! In-memory stand-ins for the store, object storage and payment provider.
//!
//! `MemoryStore` applies every write to a copy of its tables and swaps the
//! copy in only if the whole write succeeded, so a failed write leaves no
//! trace. Foreign keys to users, categories and sectors are enforced.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{
    AggregateLayout, CatalogRepository, CheckoutTicket, EventAggregate, EventRepository,
    EventUpdateRecord, NewEventRecord, PaymentCredentials, ProfileUpdate, PublicEvent,
    TicketWrite, UserRepository, purchased_ticket_removed,
};
use crate::models::{
    Batch, Category, CreatorRole, Event, EventDay, EventMode, EventStatus, ProducerEvent, Ticket,
    TicketGender, TicketPurchase, TicketSector, TicketStatus, User, UserRole,
};
use crate::payments::{HostedCheckout, OrderRequest, PaymentError, PaymentProvider, TokenGrant};
use crate::storage::{
    key_from_url, FetchedObject, ObjectStorage, StorageError, StoredBlob, StoredObject,
};
use crate::utils::AppError;

pub const CDN: &str = "https://cdn.example.com/files";

fn fk_violation(constraint: &str) -> AppError {
    AppError::DatabaseError(sqlx::Error::Protocol(format!(
        "insert or update violates foreign key constraint \"{constraint}\""
    )))
}

#[derive(Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    categories: Vec<Category>,
    sectors: Vec<TicketSector>,
    events: Vec<Event>,
    producers: HashMap<Uuid, ProducerEvent>,
    days: Vec<(i32, EventDay)>,
    batches: Vec<(i32, Batch)>,
    tickets: Vec<(i32, Ticket)>,
    purchases: Vec<TicketPurchase>,
}

impl Tables {
    fn event_mut(&mut self, id: Uuid) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.id == id)
    }

    fn sector_exists(&self, id: Uuid) -> bool {
        self.sectors.iter().any(|s| s.id == id)
    }

    fn sorted_tickets(&self, event_id: Uuid) -> Vec<Ticket> {
        let mut rows: Vec<&(i32, Ticket)> = self
            .tickets
            .iter()
            .filter(|(_, t)| t.event_id == event_id)
            .collect();
        rows.sort_by_key(|(position, t)| (*position, t.created_at));
        rows.into_iter().map(|(_, t)| t.clone()).collect()
    }

    fn aggregate(&self, event: &Event) -> EventAggregate {
        let mut days: Vec<&(i32, EventDay)> =
            self.days.iter().filter(|(_, d)| d.event_id == event.id).collect();
        days.sort_by_key(|(position, _)| *position);
        let mut batches: Vec<&(i32, Batch)> = self
            .batches
            .iter()
            .filter(|(_, b)| b.event_id == event.id)
            .collect();
        batches.sort_by_key(|(position, _)| *position);

        EventAggregate::assemble(
            event.clone(),
            self.producers.get(&event.id).cloned(),
            days.into_iter().map(|(_, d)| d.clone()).collect(),
            batches.into_iter().map(|(_, b)| b.clone()).collect(),
            self.sorted_tickets(event.id),
        )
    }

    fn write_ticket(
        &mut self,
        event_id: Uuid,
        batch_id: Option<Uuid>,
        position: usize,
        ticket: &TicketWrite,
    ) -> Result<(), AppError> {
        let fields = &ticket.fields;
        if !self.sector_exists(fields.sector_id) {
            return Err(fk_violation("tickets_sector_id_fkey"));
        }
        match ticket.existing_id {
            Some(id) => {
                let (row_position, row) = self
                    .tickets
                    .iter_mut()
                    .find(|(_, t)| t.id == id && t.event_id == event_id)
                    .ok_or_else(|| AppError::Conflict(format!("Ticket {id} no longer exists")))?;
                *row_position = position as i32;
                row.batch_id = batch_id;
                row.sector_id = fields.sector_id;
                row.price = fields.price;
                row.quantity = fields.quantity;
                row.gender = fields.gender;
                row.is_nominal = fields.is_nominal;
                row.file = fields.file.clone();
                row.obs = fields.obs.clone();
            }
            None => self.tickets.push((
                position as i32,
                Ticket {
                    id: Uuid::new_v4(),
                    event_id,
                    batch_id,
                    buyer_id: None,
                    sector_id: fields.sector_id,
                    price: fields.price,
                    quantity: fields.quantity,
                    is_nominal: fields.is_nominal,
                    gender: fields.gender,
                    status: TicketStatus::Available,
                    obs: fields.obs.clone(),
                    qr_code: None,
                    file: fields.file.clone(),
                    created_at: Utc::now(),
                },
            )),
        }
        Ok(())
    }

    fn write_layout(
        &mut self,
        event_id: Uuid,
        organizer_id: Uuid,
        layout: &AggregateLayout,
    ) -> Result<(), AppError> {
        match layout {
            AggregateLayout::Producer { profile, days } => {
                let stored_name = self.producers.get(&event_id).map(|p| p.producer_name.clone());
                let organizer_name = self.users.get(&organizer_id).map(|u| u.name.clone());
                self.producers.insert(
                    event_id,
                    ProducerEvent {
                        event_id,
                        producer_name: profile
                            .producer_name
                            .clone()
                            .or(stored_name)
                            .or(organizer_name)
                            .unwrap_or_default(),
                        show_producer: profile.show_producer,
                        producer_description: profile.producer_description.clone(),
                    },
                );

                for (day_position, day) in days.iter().enumerate() {
                    let day_id = Uuid::new_v4();
                    self.days.push((
                        day_position as i32,
                        EventDay {
                            id: day_id,
                            event_id,
                            date: day.date,
                            start_time: day.start_time,
                            end_time: day.end_time,
                        },
                    ));
                    for (batch_position, batch) in day.batches.iter().enumerate() {
                        let batch_id = Uuid::new_v4();
                        self.batches.push((
                            batch_position as i32,
                            Batch {
                                id: batch_id,
                                event_id,
                                event_day_id: Some(day_id),
                                name: batch.name.clone(),
                                start_time: batch.start_time,
                                end_time: batch.end_time,
                            },
                        ));
                        for (position, ticket) in batch.tickets.iter().enumerate() {
                            self.write_ticket(event_id, Some(batch_id), position, ticket)?;
                        }
                    }
                }
            }
            AggregateLayout::User { ticket } => self.write_ticket(event_id, None, 0, ticket)?,
        }
        Ok(())
    }

    fn remove_event(&mut self, id: Uuid) {
        self.events.retain(|e| e.id != id);
        self.producers.remove(&id);
        self.days.retain(|(_, d)| d.event_id != id);
        self.batches.retain(|(_, b)| b.event_id != id);
        self.tickets.retain(|(_, t)| t.event_id != id);
        self.purchases.retain(|p| p.event_id != id);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().unwrap()
    }

    /// Runs `write` against a copy of the tables and keeps the copy only on
    /// success.
    fn transaction<T>(
        &self,
        write: impl FnOnce(&mut Tables) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut tables = self.read();
        let mut draft = tables.clone();
        let value = write(&mut draft)?;
        *tables = draft;
        Ok(value)
    }

    /// Number of repository calls made so far. Fixture helpers don't count.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn add_user(&self, name: &str, email: &str) -> Uuid {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role: UserRole::User,
            cpf_cnpj: None,
            phone: None,
            mp_access_token: None,
            mp_refresh_token: None,
            mp_token_expires_at: None,
            mp_live_mode: false,
            mp_user_id: None,
            mp_public_key: None,
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        self.tables.lock().unwrap().users.insert(id, user);
        id
    }

    pub fn set_role(&self, user_id: Uuid, role: UserRole) {
        if let Some(user) = self.tables.lock().unwrap().users.get_mut(&user_id) {
            user.role = role;
        }
    }

    pub fn add_category(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().unwrap().categories.push(Category {
            id,
            name: name.into(),
        });
        id
    }

    pub fn add_sector(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().unwrap().sectors.push(TicketSector {
            id,
            name: name.into(),
        });
        id
    }

    fn bare_event(id: Uuid, organizer_id: Uuid, category_id: Uuid, slug: &str) -> Event {
        let now = Utc::now();
        Event {
            id,
            category_id,
            title: slug.into(),
            description: None,
            image: format!("{CDN}/image-{id}.png"),
            status: EventStatus::Active,
            mode: EventMode::Online,
            city: None,
            province: None,
            address: None,
            uf: None,
            date: Some(now),
            map: None,
            slug: slug.into(),
            creator_role: CreatorRole::User,
            organizer_id,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Occupies a slug with a placeholder event.
    pub fn reserve_slug(&self, slug: &str, id: Option<Uuid>) {
        let event = Self::bare_event(
            id.unwrap_or_else(Uuid::new_v4),
            Uuid::new_v4(),
            Uuid::new_v4(),
            slug,
        );
        self.tables.lock().unwrap().events.push(event);
    }

    /// A user-shaped event with an image and no tickets.
    pub fn add_simple_event(&self, organizer_id: Uuid, slug: &str) -> Uuid {
        let category = self.add_category("General");
        let id = Uuid::new_v4();
        let event = Self::bare_event(id, organizer_id, category, slug);
        self.tables.lock().unwrap().events.push(event);
        id
    }

    /// Adds an unbatched ticket in a new sector named `sector`.
    pub fn add_ticket(&self, event_id: Uuid, sector: &str, price: i32, quantity: i32) -> Uuid {
        let sector_id = self.add_sector(sector);
        let id = Uuid::new_v4();
        let mut tables = self.tables.lock().unwrap();
        let position = tables.tickets.len() as i32;
        tables.tickets.push((
            position,
            Ticket {
                id,
                event_id,
                batch_id: None,
                buyer_id: None,
                sector_id,
                price,
                quantity,
                is_nominal: false,
                gender: TicketGender::Unisex,
                status: TicketStatus::Available,
                obs: None,
                qr_code: None,
                file: format!("{CDN}/ticket-{id}.pdf"),
                created_at: Utc::now(),
            },
        ));
        id
    }

    pub fn add_purchase(&self, user_id: Uuid, event_id: Uuid, ticket_id: Uuid, total: i32) {
        self.tables.lock().unwrap().purchases.push(TicketPurchase {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            ticket_id,
            payment_status: crate::models::PaymentStatus::Pending,
            payment_method: None,
            total_price: total,
            purchase_date: Utc::now(),
        });
    }

    pub fn set_access_token(&self, user_id: Uuid, token: Option<&str>) {
        if let Some(user) = self.tables.lock().unwrap().users.get_mut(&user_id) {
            user.mp_access_token = token.map(str::to_string);
        }
    }

    pub fn set_ticket_status(&self, ticket_id: Uuid, status: TicketStatus) {
        let mut tables = self.tables.lock().unwrap();
        if let Some((_, ticket)) = tables.tickets.iter_mut().find(|(_, t)| t.id == ticket_id) {
            ticket.status = status;
        }
    }

    pub fn event(&self, id: Uuid) -> Event {
        let tables = self.tables.lock().unwrap();
        tables
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .expect("event exists")
    }

    pub fn event_count(&self) -> usize {
        self.tables.lock().unwrap().events.len()
    }

    pub fn tickets_of(&self, event_id: Uuid) -> Vec<Ticket> {
        self.tables.lock().unwrap().sorted_tickets(event_id)
    }

    pub fn batch_count(&self, event_id: Uuid) -> usize {
        let tables = self.tables.lock().unwrap();
        tables
            .batches
            .iter()
            .filter(|(_, b)| b.event_id == event_id)
            .count()
    }

    pub fn referenced_keys(&self) -> Vec<String> {
        let tables = self.tables.lock().unwrap();
        let mut urls: Vec<String> = tables.events.iter().map(|e| e.image.clone()).collect();
        urls.extend(tables.events.iter().filter_map(|e| e.map.clone()));
        urls.extend(tables.tickets.iter().map(|(_, t)| t.file.clone()));
        urls.iter()
            .filter_map(|url| key_from_url(url).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let tables = self.read();
        Ok(tables
            .events
            .iter()
            .any(|e| e.slug == slug && Some(e.id) != exclude))
    }

    async fn create_event(&self, record: &NewEventRecord) -> Result<Uuid, AppError> {
        self.transaction(|t| {
            if !t.users.contains_key(&record.organizer_id) {
                return Err(fk_violation("events_organizer_id_fkey"));
            }
            if !t.categories.iter().any(|c| c.id == record.fields.category_id) {
                return Err(fk_violation("events_category_id_fkey"));
            }
            if t.events.iter().any(|e| e.slug == record.slug) {
                return Err(AppError::Conflict(
                    "An event with this slug already exists".to_string(),
                ));
            }

            let now = Utc::now();
            let fields = record.fields.clone();
            let id = Uuid::new_v4();
            t.events.push(Event {
                id,
                category_id: fields.category_id,
                title: fields.title,
                description: fields.description,
                image: fields.image,
                status: fields.status,
                mode: fields.mode,
                city: fields.city,
                province: fields.province,
                address: fields.address,
                uf: fields.uf,
                date: fields.date,
                map: fields.map,
                slug: record.slug.clone(),
                creator_role: match record.layout {
                    AggregateLayout::Producer { .. } => CreatorRole::Producer,
                    AggregateLayout::User { .. } => CreatorRole::User,
                },
                organizer_id: record.organizer_id,
                version: 1,
                created_at: now,
                updated_at: now,
            });
            t.write_layout(id, record.organizer_id, &record.layout)?;
            Ok(id)
        })
    }

    async fn find_owned_event(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<Event>, AppError> {
        let tables = self.read();
        Ok(tables
            .events
            .iter()
            .find(|e| e.id == id && e.organizer_id == organizer_id)
            .cloned())
    }

    async fn event_tickets(&self, event_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        Ok(self.read().sorted_tickets(event_id))
    }

    async fn update_event(&self, record: &EventUpdateRecord) -> Result<bool, AppError> {
        self.transaction(|t| {
            if let Some(slug) = &record.slug {
                if t.events.iter().any(|e| &e.slug == slug && e.id != record.id) {
                    return Err(AppError::Conflict(
                        "An event with this slug already exists".to_string(),
                    ));
                }
            }
            if !t.categories.iter().any(|c| c.id == record.fields.category_id) {
                return Err(fk_violation("events_category_id_fkey"));
            }

            let Some(event) = t.event_mut(record.id).filter(|e| {
                e.organizer_id == record.organizer_id
                    && record.expected_version.map_or(true, |v| v == e.version)
            }) else {
                return Ok(false);
            };

            let fields = record.fields.clone();
            event.category_id = fields.category_id;
            event.title = fields.title;
            event.description = fields.description;
            event.image = fields.image;
            event.status = fields.status;
            event.mode = fields.mode;
            event.city = fields.city;
            event.province = fields.province;
            event.address = fields.address;
            event.uf = fields.uf;
            event.date = fields.date;
            event.map = fields.map;
            if let Some(slug) = &record.slug {
                event.slug = slug.clone();
            }
            event.version += 1;
            event.updated_at = Utc::now();

            let retained: HashSet<Uuid> = record
                .layout
                .tickets()
                .into_iter()
                .filter_map(|ticket| ticket.existing_id)
                .collect();
            let id = record.id;
            if let Some(purchase) = t.purchases.iter().find(|p| {
                p.event_id == id && !retained.contains(&p.ticket_id)
            }) {
                return Err(purchased_ticket_removed(purchase.ticket_id));
            }
            t.tickets
                .retain(|(_, ticket)| ticket.event_id != id || retained.contains(&ticket.id));
            for (_, ticket) in t.tickets.iter_mut().filter(|(_, ticket)| ticket.event_id == id) {
                ticket.batch_id = None;
            }
            t.batches.retain(|(_, b)| b.event_id != id);
            t.days.retain(|(_, d)| d.event_id != id);

            t.write_layout(id, record.organizer_id, &record.layout)?;
            Ok(true)
        })
    }

    async fn delete_event(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<Vec<String>>, AppError> {
        self.transaction(|t| {
            let Some(event) = t
                .events
                .iter()
                .find(|e| e.id == id && e.organizer_id == organizer_id)
                .cloned()
            else {
                return Ok(None);
            };
            let mut urls = vec![event.image];
            urls.extend(event.map);
            urls.extend(t.sorted_tickets(id).into_iter().map(|ticket| ticket.file));
            t.remove_event(id);
            Ok(Some(urls))
        })
    }

    async fn load_aggregate(
        &self,
        id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Option<EventAggregate>, AppError> {
        let tables = self.read();
        Ok(tables
            .events
            .iter()
            .find(|e| e.id == id && e.organizer_id == organizer_id)
            .map(|event| tables.aggregate(event)))
    }

    async fn list_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError> {
        let tables = self.read();
        let mut events: Vec<Event> = tables
            .events
            .iter()
            .filter(|e| e.organizer_id == organizer_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn find_public_by_slug(&self, slug: &str) -> Result<Option<PublicEvent>, AppError> {
        let tables = self.read();
        let Some(event) = tables
            .events
            .iter()
            .find(|e| e.slug == slug && e.status != EventStatus::Inactive)
        else {
            return Ok(None);
        };
        let category = tables
            .categories
            .iter()
            .find(|c| c.id == event.category_id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let sectors: HashMap<Uuid, String> = tables
            .sectors
            .iter()
            .map(|s| (s.id, s.name.clone()))
            .collect();
        Ok(Some(PublicEvent::from_aggregate(
            tables.aggregate(event),
            category,
            &sectors,
        )))
    }

    async fn event_organizer(&self, event_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let tables = self.read();
        Ok(tables
            .events
            .iter()
            .find(|e| e.id == event_id)
            .map(|e| e.organizer_id))
    }

    async fn checkout_tickets(
        &self,
        event_id: Uuid,
        ticket_ids: &[Uuid],
    ) -> Result<Vec<CheckoutTicket>, AppError> {
        let tables = self.read();
        Ok(tables
            .tickets
            .iter()
            .map(|(_, t)| t)
            .filter(|t| t.event_id == event_id && ticket_ids.contains(&t.id))
            .filter_map(|t| {
                let sector = tables.sectors.iter().find(|s| s.id == t.sector_id)?;
                Some(CheckoutTicket {
                    id: t.id,
                    event_id: t.event_id,
                    sector_name: sector.name.clone(),
                    price: t.price,
                    quantity: t.quantity,
                    status: t.status,
                })
            })
            .collect())
    }

    async fn referenced_blob_urls(&self) -> Result<Vec<String>, AppError> {
        let tables = self.read();
        let mut urls: Vec<String> = tables.events.iter().map(|e| e.image.clone()).collect();
        urls.extend(tables.events.iter().filter_map(|e| e.map.clone()));
        urls.extend(tables.tickets.iter().map(|(_, t)| t.file.clone()));
        Ok(urls)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn payment_access_token(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(self
            .read()
            .users
            .get(&user_id)
            .and_then(|u| u.mp_access_token.clone()))
    }

    async fn store_payment_credentials(
        &self,
        user_id: Uuid,
        credentials: &PaymentCredentials,
    ) -> Result<bool, AppError> {
        let mut tables = self.read();
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.mp_access_token = Some(credentials.access_token.clone());
        user.mp_refresh_token = credentials.refresh_token.clone();
        user.mp_token_expires_at = Some(credentials.expires_at);
        user.mp_live_mode = credentials.live_mode;
        user.mp_user_id = credentials.provider_user_id.clone();
        user.mp_public_key = credentials.public_key.clone();
        Ok(true)
    }

    async fn clear_payment_credentials(&self, user_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.read();
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.mp_access_token = None;
        user.mp_refresh_token = None;
        user.mp_token_expires_at = None;
        user.mp_live_mode = false;
        user.mp_user_id = None;
        user.mp_public_key = None;
        Ok(true)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let mut tables = self.read();
        if tables
            .users
            .values()
            .any(|u| u.email == update.email && u.id != user_id)
        {
            return Err(AppError::Conflict("Email is already in use".to_string()));
        }
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.name = update.name.clone();
        user.email = update.email.clone();
        user.cpf_cnpj = update.cpf_cnpj.clone();
        user.phone = update.phone.clone();
        Ok(Some(user.clone()))
    }

    async fn purchases_for_user(&self, user_id: Uuid) -> Result<Vec<TicketPurchase>, AppError> {
        let mut purchases: Vec<TicketPurchase> = self
            .read()
            .purchases
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| b.purchase_date.cmp(&a.purchase_date));
        Ok(purchases)
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn categories(&self) -> Result<Vec<Category>, AppError> {
        let mut rows = self.read().categories.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn ticket_sectors(&self) -> Result<Vec<TicketSector>, AppError> {
        let mut rows = self.read().sectors.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

/// Object storage that keeps blobs in memory and records every delete
/// attempt. Deleting an unknown key succeeds.
#[derive(Default)]
pub struct RecordingStorage {
    blobs: Mutex<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    attempted_deletes: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    uploads: AtomicUsize,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(keys: &[&str]) -> Self {
        let storage = Self::new();
        for key in keys {
            storage.fail_on(key);
        }
        storage
    }

    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn put(&self, key: &str, modified: DateTime<Utc>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::from_static(b"blob"), modified));
    }

    /// Every key a delete was attempted for, sorted.
    pub fn deleted_keys(&self) -> Vec<String> {
        let mut keys = self.attempted_deletes.lock().unwrap().clone();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn upload(&self, data: Bytes, _content_type: &str) -> Result<StoredObject, StorageError> {
        if data.is_empty() {
            return Err(StorageError::Empty);
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        let key = format!("upload-{n}.bin");
        let checksum = blake3::hash(&data).to_hex().to_string();
        self.blobs
            .lock()
            .unwrap()
            .insert(key.clone(), (data, Utc::now()));
        Ok(StoredObject {
            url: format!("{CDN}/{key}"),
            key,
            checksum,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.attempted_deletes.lock().unwrap().push(key.to_string());
        if self.failing.lock().unwrap().contains(key) {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
            });
        }
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<FetchedObject, StorageError> {
        let blobs = self.blobs.lock().unwrap();
        let (data, _) = blobs
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(FetchedObject {
            data: data.clone(),
            content_type: "application/octet-stream",
        })
    }

    async fn list(&self) -> Result<Vec<StoredBlob>, StorageError> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .map(|(key, (_, modified))| StoredBlob {
                key: key.clone(),
                modified: *modified,
            })
            .collect())
    }
}

/// Payment provider that records orders and hands out one scripted grant.
#[derive(Default)]
pub struct FakePaymentProvider {
    orders: Mutex<Vec<(OrderRequest, String)>>,
    codes: Mutex<Vec<String>>,
    grant: Mutex<Option<Result<TokenGrant, PaymentError>>>,
    revoked: AtomicBool,
}

impl FakePaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, grant: Result<TokenGrant, PaymentError>) {
        *self.grant.lock().unwrap() = Some(grant);
    }

    /// Makes every later order fail as if the organizer's token was revoked.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn orders(&self) -> Vec<(OrderRequest, String)> {
        self.orders.lock().unwrap().clone()
    }

    pub fn codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn create_order(
        &self,
        order: &OrderRequest,
        access_token: &str,
    ) -> Result<HostedCheckout, PaymentError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(PaymentError::CredentialsRevoked);
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push((order.clone(), access_token.to_string()));
        let order_id = format!("pref-{}", orders.len());
        Ok(HostedCheckout {
            url: format!("https://checkout.example.com/{order_id}"),
            order_id,
        })
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant, PaymentError> {
        self.codes.lock().unwrap().push(code.to_string());
        self.grant
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(PaymentError::Rejected("No access token returned".into())))
    }
}
