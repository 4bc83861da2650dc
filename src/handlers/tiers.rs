use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::handlers::{AppState, HostIdentity};
use crate::services::ticketing::TierDraft;
use crate::utils::error::AppResult;
use crate::utils::response::{created, empty_success, success};

pub async fn create_tier(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(draft): Json<TierDraft>,
) -> AppResult<Response> {
    let tier = state.ticketing.create_tier(host_id, event_id, draft).await?;
    Ok(created(tier, "Tier created").into_response())
}

pub async fn update_tier(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Path((event_id, tier_id)): Path<(Uuid, String)>,
    Json(draft): Json<TierDraft>,
) -> AppResult<Response> {
    let tier = state
        .ticketing
        .update_tier(host_id, event_id, &tier_id, draft)
        .await?;
    Ok(success(tier, "Tier updated").into_response())
}

pub async fn delete_tier(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Path((event_id, tier_id)): Path<(Uuid, String)>,
) -> AppResult<Response> {
    state
        .ticketing
        .delete_tier(host_id, event_id, &tier_id)
        .await?;
    Ok(empty_success("Tier deleted").into_response())
}

pub async fn list_tiers(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Response> {
    let tiers = state.ticketing.list_tiers(event_id).await?;
    Ok(success(tiers, "Tiers retrieved").into_response())
}
