use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, SecurityHeaders};
use crate::handlers::{admin, catalog, events, health_check, payments, uploads, users};
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the payload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_routes(state: AppState) -> Router {
    let security = SecurityHeaders::new(state.config.production);
    let cors = create_cors_layer(state.config.cors_allowed_origins.as_deref());
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/events", get(events::list_events))
        .route("/events/producer", post(events::create_producer_event))
        .route(
            "/events/producer/:id",
            get(events::get_producer_event)
                .put(events::update_producer_event)
                .delete(events::delete_producer_event),
        )
        .route("/events/user", post(events::create_user_event))
        .route(
            "/events/user/:id",
            get(events::get_user_event)
                .put(events::update_user_event)
                .delete(events::delete_user_event),
        )
        .route("/public/events/:slug", get(events::get_public_event))
        .route("/payments/checkout", post(payments::create_checkout))
        .route("/payments/oauth/callback", post(payments::oauth_callback))
        .route("/payments/oauth/disconnect", post(payments::oauth_disconnect))
        .route("/categories", get(catalog::list_categories))
        .route("/ticket-sectors", get(catalog::list_ticket_sectors))
        .route("/users/me", get(users::get_me).put(users::update_me))
        .route("/users/me/purchases", get(users::my_purchases))
        .route(
            "/uploads",
            post(uploads::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/:key", get(uploads::fetch_file))
        .route("/admin/storage/sweep", post(admin::sweep_storage))
        .with_state(state);

    security
        .apply(router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
