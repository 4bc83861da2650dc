use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::{AppState, HostIdentity};
use crate::services::ticketing::PurchaseRequest;
use crate::utils::error::AppResult;
use crate::utils::response::{partial_success, success};

pub async fn purchase(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<PurchaseRequest>,
) -> AppResult<Response> {
    let outcome = state.ticketing.purchase(event_id, request).await?;
    let warnings = outcome.warnings.clone();
    Ok(partial_success(outcome, "Purchase completed", warnings).into_response())
}

#[derive(Deserialize)]
pub struct CheckInRequest {
    pub identifier: String,
}

pub async fn check_in(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<CheckInRequest>,
) -> AppResult<Response> {
    let outcome = state
        .ticketing
        .check_in(host_id, event_id, &request.identifier)
        .await?;
    Ok(success(outcome, "Ticket checked in").into_response())
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Response> {
    let tickets = state.ticketing.search(host_id, event_id, &query.q).await?;
    Ok(success(tickets, "Tickets retrieved").into_response())
}
