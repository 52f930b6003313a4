use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod events;
pub mod extract;
pub mod payments;
pub mod uploads;
pub mod users;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "boxoffice-api",
    };

    success(payload, "Health check successful")
}
