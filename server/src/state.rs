use std::sync::Arc;

use crate::config::Config;
use crate::db::{CatalogRepository, EventRepository, UserRepository};
use crate::payments::PaymentProvider;
use crate::services::{CheckoutService, EventService, UserService};
use crate::storage::ObjectStorage;

/// Shared handler state. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub events: EventService,
    pub checkout: CheckoutService,
    pub users: UserService,
    pub event_store: Arc<dyn EventRepository>,
    pub user_store: Arc<dyn UserRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    pub fn new(
        config: Config,
        event_store: Arc<dyn EventRepository>,
        user_store: Arc<dyn UserRepository>,
        catalog: Arc<dyn CatalogRepository>,
        storage: Arc<dyn ObjectStorage>,
        payments: Arc<dyn PaymentProvider>,
    ) -> Self {
        let events = EventService::new(event_store.clone(), storage.clone());
        let checkout = CheckoutService::new(
            event_store.clone(),
            user_store.clone(),
            payments,
            config.payment_success_url(),
            config.payment_failure_url(),
        );
        let users = UserService::new(user_store.clone());

        Self {
            config: Arc::new(config),
            events,
            checkout,
            users,
            event_store,
            user_store,
            catalog,
            storage,
        }
    }
}
