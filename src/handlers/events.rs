use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::handlers::{AppState, HostIdentity};
use crate::services::ticketing::EventDraft;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

pub async fn create_event(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Json(draft): Json<EventDraft>,
) -> AppResult<Response> {
    let event = state.ticketing.create_event(host_id, draft).await?;
    Ok(created(event, "Event created").into_response())
}

pub async fn list_events(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let events = state.ticketing.list_events(host_id).await?;
    Ok(success(events, "Events retrieved").into_response())
}
