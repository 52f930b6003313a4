//! Checkout and organizer payment-account linking.
//!
//! Orders are created with the organizer's own provider token, so funds
//! settle straight into their account.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{CheckoutTicket, EventRepository, PaymentCredentials, UserRepository};
use crate::models::{TicketGender, TicketStatus};
use crate::payments::{LineItem, OrderRequest, PaymentError, PaymentProvider};
use crate::utils::AppError;

const DEFAULT_ITEM_TITLE: &str = "Ticket";

/// One cart line as submitted by the buyer. Prices are in cents and are
/// only trusted for logging; the live ticket price is what gets charged.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub sector_id: Uuid,
    pub price: i32,
    pub quantity: i32,
    #[serde(default)]
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub sector_name: Option<String>,
    #[serde(default)]
    pub gender: Option<TicketGender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub buyer_name: String,
    pub buyer_email: String,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackOutcome {
    pub status: &'static str,
}

#[derive(Clone)]
pub struct CheckoutService {
    events: Arc<dyn EventRepository>,
    users: Arc<dyn UserRepository>,
    provider: Arc<dyn PaymentProvider>,
    success_url: String,
    failure_url: String,
}

impl CheckoutService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
        provider: Arc<dyn PaymentProvider>,
        success_url: String,
        failure_url: String,
    ) -> Self {
        Self {
            events,
            users,
            provider,
            success_url,
            failure_url,
        }
    }

    pub async fn create_payment(
        &self,
        request: CheckoutRequest,
        buyer_id: Option<Uuid>,
    ) -> Result<CheckoutSession, AppError> {
        let event_id = validate_cart(&request)?;

        let organizer_id = self
            .events
            .event_organizer(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        let access_token = self
            .users
            .payment_access_token(organizer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("Organizer has not connected a payment account".to_string())
            })?;

        let ticket_ids: Vec<Uuid> = request.items.iter().map(|item| item.ticket_id).collect();
        let live: HashMap<Uuid, CheckoutTicket> = self
            .events
            .checkout_tickets(event_id, &ticket_ids)
            .await?
            .into_iter()
            .map(|ticket| (ticket.id, ticket))
            .collect();

        // A ticket may span several cart lines; availability covers their sum.
        let mut requested: HashMap<Uuid, i64> = HashMap::new();
        for item in &request.items {
            *requested.entry(item.ticket_id).or_default() += i64::from(item.quantity);
        }

        let items = request
            .items
            .iter()
            .map(|item| {
                let total = requested.get(&item.ticket_id).copied().unwrap_or_default();
                line_item(item, live.get(&item.ticket_id), total)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let order = OrderRequest {
            items,
            payer_name: request.buyer_name.trim().to_string(),
            payer_email: request.buyer_email.trim().to_string(),
            success_url: self.success_url.clone(),
            failure_url: self.failure_url.clone(),
            external_reference: Some(event_id.to_string()),
        };

        let checkout = self.provider.create_order(&order, &access_token).await?;
        tracing::info!(
            event_id = %event_id,
            order_id = %checkout.order_id,
            buyer_id = ?buyer_id,
            items = order.items.len(),
            "checkout created"
        );

        Ok(CheckoutSession { url: checkout.url })
    }

    pub async fn process_callback(
        &self,
        organizer_id: Uuid,
        code: &str,
    ) -> Result<CallbackOutcome, AppError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::ValidationError(
                "Authorization code is required".to_string(),
            ));
        }

        let grant = self.provider.exchange_authorization_code(code).await?;

        let credentials = PaymentCredentials {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: token_expiry(grant.expires_in)?,
            live_mode: grant.live_mode,
            provider_user_id: grant.provider_user_id,
            public_key: grant.public_key,
        };

        if !self
            .users
            .store_payment_credentials(organizer_id, &credentials)
            .await?
        {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(
            user_id = %organizer_id,
            live_mode = credentials.live_mode,
            "payment account connected"
        );
        Ok(CallbackOutcome { status: "ok" })
    }

    pub async fn disconnect(&self, organizer_id: Uuid) -> Result<(), AppError> {
        if !self.users.clear_payment_credentials(organizer_id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        tracing::info!(user_id = %organizer_id, "payment account disconnected");
        Ok(())
    }
}

fn token_expiry(expires_in: i64) -> Result<DateTime<Utc>, PaymentError> {
    Duration::try_seconds(expires_in)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| {
            PaymentError::UnexpectedResponse(format!("token lifetime out of range: {expires_in}"))
        })
}

/// Checks the cart shape and returns the single event it is for.
fn validate_cart(request: &CheckoutRequest) -> Result<Uuid, AppError> {
    if request.buyer_name.trim().is_empty() {
        return Err(AppError::ValidationError("Buyer name is required".to_string()));
    }
    let email = request.buyer_email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::ValidationError(
            "A valid buyer email is required".to_string(),
        ));
    }

    let first = request
        .items
        .first()
        .ok_or_else(|| AppError::ValidationError("Cart is empty".to_string()))?;

    for item in &request.items {
        if item.event_id != first.event_id {
            return Err(AppError::ValidationError(
                "All cart items must belong to the same event".to_string(),
            ));
        }
        if item.quantity <= 0 {
            return Err(AppError::ValidationError(
                "Item quantity must be positive".to_string(),
            ));
        }
    }

    Ok(first.event_id)
}

fn line_item(
    item: &CartItem,
    live: Option<&CheckoutTicket>,
    requested: i64,
) -> Result<LineItem, AppError> {
    let ticket = live.ok_or_else(|| {
        AppError::ValidationError(format!("Ticket {} is not on sale for this event", item.ticket_id))
    })?;

    if ticket.status != TicketStatus::Available {
        return Err(AppError::ValidationError(format!(
            "Ticket {} is no longer available",
            ticket.id
        )));
    }
    if requested > i64::from(ticket.quantity) {
        return Err(AppError::ValidationError(format!(
            "Only {} of ticket {} left",
            ticket.quantity, ticket.id
        )));
    }
    if item.price != ticket.price {
        tracing::warn!(
            ticket_id = %ticket.id,
            submitted = item.price,
            live = ticket.price,
            "cart price differs from ticket price"
        );
    }

    let title = Some(ticket.sector_name.as_str())
        .filter(|name| !name.trim().is_empty())
        .or(item.sector_name.as_deref().filter(|name| !name.trim().is_empty()))
        .unwrap_or(DEFAULT_ITEM_TITLE)
        .to_string();

    Ok(LineItem {
        id: ticket.id.to_string(),
        title,
        description: ticket.event_id.to_string(),
        quantity: item.quantity,
        unit_price: Decimal::new(i64::from(ticket.price), 2),
    })
}
