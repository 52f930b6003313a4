//! Payment provider gateway.
//!
//! Orders are created with the *organizer's* access token so buyer funds
//! settle straight into the organizer's sub-account; the platform never
//! holds them.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

pub mod mercado_pago;

pub use mercado_pago::MercadoPagoClient;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The provider answered but refused the request (bad code, bad token).
    #[error("{0}")]
    Rejected(String),

    /// The organizer's stored access token is no longer accepted.
    #[error("Organizer payment account credentials were rejected")]
    CredentialsRevoked,

    #[error("Payment provider is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected payment provider response: {0}")]
    UnexpectedResponse(String),
}

/// One line of a hosted checkout. `unit_price` is in major currency units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub items: Vec<LineItem>,
    pub payer_name: String,
    pub payer_email: String,
    pub success_url: String,
    pub failure_url: String,
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedCheckout {
    pub order_id: String,
    pub url: String,
}

/// Credentials granted by the provider's OAuth token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token`, in seconds.
    pub expires_in: i64,
    pub live_mode: bool,
    pub provider_user_id: Option<String>,
    pub public_key: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(
        &self,
        order: &OrderRequest,
        access_token: &str,
    ) -> Result<HostedCheckout, PaymentError>;

    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant, PaymentError>;
}
