use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{HostedCheckout, LineItem, OrderRequest, PaymentError, PaymentProvider, TokenGrant};
use crate::config::MercadoPagoConfig;

const PREFERENCES_PATH: &str = "/checkout/preferences";
const OAUTH_TOKEN_PATH: &str = "/oauth/token";
const CURRENCY: &str = "BRL";

/// Mercado Pago REST client: checkout preferences and the OAuth
/// authorization-code grant.
#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    http: Client,
    config: MercadoPagoConfig,
}

#[derive(Serialize)]
struct PreferenceItem<'a> {
    #[serde(flatten)]
    item: &'a LineItem,
    currency_id: &'static str,
}

#[derive(Serialize)]
struct Payer<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct BackUrls<'a> {
    success: &'a str,
    failure: &'a str,
}

#[derive(Serialize)]
struct PreferenceRequest<'a> {
    items: Vec<PreferenceItem<'a>>,
    payer: Payer<'a>,
    back_urls: BackUrls<'a>,
    auto_return: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_reference: Option<&'a str>,
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    grant_type: &'static str,
    redirect_uri: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    live_mode: bool,
    user_id: Option<Value>,
    public_key: Option<String>,
    message: Option<String>,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Result<Self, PaymentError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentProvider for MercadoPagoClient {
    async fn create_order(
        &self,
        order: &OrderRequest,
        access_token: &str,
    ) -> Result<HostedCheckout, PaymentError> {
        let body = PreferenceRequest {
            items: order
                .items
                .iter()
                .map(|item| PreferenceItem {
                    item,
                    currency_id: CURRENCY,
                })
                .collect(),
            payer: Payer {
                name: &order.payer_name,
                email: &order.payer_email,
            },
            back_urls: BackUrls {
                success: &order.success_url,
                failure: &order.failure_url,
            },
            auto_return: "approved",
            external_reference: order.external_reference.as_deref(),
        };

        let response = self
            .http
            .post(self.url(PREFERENCES_PATH))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "Mercado Pago rejected preference");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentError::CredentialsRevoked,
                _ => PaymentError::UnexpectedResponse(format!("status {status}")),
            });
        }

        let preference: PreferenceResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::UnexpectedResponse(e.to_string()))?;

        info!(preference_id = %preference.id, items = order.items.len(), "Created checkout preference");

        Ok(HostedCheckout {
            order_id: preference.id,
            url: preference.init_point,
        })
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant, PaymentError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(PaymentError::NotConfigured("MP_CLIENT_ID"))?;
        let client_secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or(PaymentError::NotConfigured("MP_CLIENT_SECRET"))?;
        let redirect_uri = self
            .config
            .redirect_uri
            .as_deref()
            .ok_or(PaymentError::NotConfigured("MP_REDIRECT_URI"))?;

        let response = self
            .http
            .post(self.url(OAUTH_TOKEN_PATH))
            .json(&TokenRequest {
                client_id,
                client_secret,
                code,
                grant_type: "authorization_code",
                redirect_uri,
            })
            .send()
            .await?;

        let status = response.status();
        debug!(status = %status, "Mercado Pago token endpoint responded");

        if status.is_server_error() {
            return Err(PaymentError::UnexpectedResponse(format!("status {status}")));
        }

        // Rejections come back as 4xx with an error body; either way the
        // only thing that matters is whether an access token is present.
        let body = response.text().await?;
        let token: TokenResponse = match serde_json::from_str(&body) {
            Ok(token) => token,
            Err(e) if status.is_client_error() => {
                warn!(status = %status, error = %e, "Mercado Pago token rejection was not JSON");
                return Err(PaymentError::Rejected("No access token returned".to_string()));
            }
            Err(e) => return Err(PaymentError::UnexpectedResponse(e.to_string())),
        };

        let Some(access_token) = token.access_token.filter(|t| !t.is_empty()) else {
            warn!(
                status = %status,
                reason = token.message.as_deref().unwrap_or("none"),
                "Mercado Pago returned no access token"
            );
            return Err(PaymentError::Rejected("No access token returned".to_string()));
        };

        Ok(TokenGrant {
            access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            live_mode: token.live_mode,
            provider_user_id: token.user_id.and_then(|id| match id {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            public_key: token.public_key,
        })
    }
}
