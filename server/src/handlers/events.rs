use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::extract::{AppJson, AppPath};
use crate::models::CreatorRole;
use crate::services::events::{ProducerEventInput, UpdateInput, UserEventInput};
use crate::state::AppState;
use crate::utils::response::{created, empty_success, success};
use crate::utils::AppError;

#[derive(Serialize)]
struct EventIdPayload {
    event_id: Uuid,
}

pub async fn create_producer_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(input): AppJson<ProducerEventInput>,
) -> Result<Response, AppError> {
    let event_id = state.events.create_producer_event(user.id, input).await?;
    Ok(created(EventIdPayload { event_id }, "Event created"))
}

pub async fn update_producer_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(input): AppJson<UpdateInput<ProducerEventInput>>,
) -> Result<Response, AppError> {
    let event_id = state.events.update_producer_event(user.id, id, input).await?;
    Ok(success(EventIdPayload { event_id }, "Event updated"))
}

pub async fn delete_producer_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, AppError> {
    state
        .events
        .delete_event(user.id, id, CreatorRole::Producer)
        .await?;
    Ok(empty_success("Event deleted"))
}

pub async fn get_producer_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, AppError> {
    let aggregate = state
        .events
        .get_for_editing(user.id, id, CreatorRole::Producer)
        .await?;
    Ok(success(aggregate, "Event retrieved"))
}

pub async fn create_user_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(input): AppJson<UserEventInput>,
) -> Result<Response, AppError> {
    let event_id = state.events.create_user_event(user.id, input).await?;
    Ok(created(EventIdPayload { event_id }, "Event created"))
}

pub async fn update_user_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(input): AppJson<UpdateInput<UserEventInput>>,
) -> Result<Response, AppError> {
    let event_id = state.events.update_user_event(user.id, id, input).await?;
    Ok(success(EventIdPayload { event_id }, "Event updated"))
}

pub async fn delete_user_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, AppError> {
    state
        .events
        .delete_event(user.id, id, CreatorRole::User)
        .await?;
    Ok(empty_success("Event deleted"))
}

pub async fn get_user_event(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, AppError> {
    let aggregate = state
        .events
        .get_for_editing(user.id, id, CreatorRole::User)
        .await?;
    Ok(success(aggregate, "Event retrieved"))
}

pub async fn list_events(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let events = state.events.list_for_organizer(user.id).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn get_public_event(
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> Result<Response, AppError> {
    let event = state.events.get_by_slug(&slug).await?;
    Ok(success(event, "Event retrieved"))
}
