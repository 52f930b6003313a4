use axum::extract::State;
use axum::response::Response;

use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::AppError;

pub async fn list_categories(State(state): State<AppState>) -> Result<Response, AppError> {
    let categories = state.catalog.categories().await?;
    Ok(success(categories, "Categories retrieved"))
}

pub async fn list_ticket_sectors(State(state): State<AppState>) -> Result<Response, AppError> {
    let sectors = state.catalog.ticket_sectors().await?;
    Ok(success(sectors, "Ticket sectors retrieved"))
}
