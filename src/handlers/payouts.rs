//! Admin back-office: payout review and platform revenue reporting.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::{AdminIdentity, AppState};
use crate::utils::error::AppResult;
use crate::utils::response::{partial_success, success};

pub async fn list_payouts(
    AdminIdentity(_admin_id): AdminIdentity,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let payouts = state.wallet.list_payouts(None).await?;
    Ok(success(payouts, "Payouts retrieved").into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub amount: Decimal,
    /// Raw proof-of-payment document; stored and referenced on the payout.
    pub proof_document: Option<String>,
}

pub async fn approve_payout(
    AdminIdentity(admin_id): AdminIdentity,
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
    Json(request): Json<ApproveRequest>,
) -> AppResult<Response> {
    let outcome = state
        .wallet
        .approve_payout(
            admin_id,
            payout_id,
            request.amount,
            request.proof_document.map(String::into_bytes),
        )
        .await?;
    let warnings = outcome.warnings.clone();
    Ok(partial_success(outcome, "Payout approved", warnings).into_response())
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

pub async fn reject_payout(
    AdminIdentity(admin_id): AdminIdentity,
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> AppResult<Response> {
    let outcome = state
        .wallet
        .reject_payout(admin_id, payout_id, request.reason)
        .await?;
    let warnings = outcome.warnings.clone();
    Ok(partial_success(outcome, "Payout rejected", warnings).into_response())
}

#[derive(Deserialize)]
pub struct RevenueWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

pub async fn revenue_summary(
    AdminIdentity(_admin_id): AdminIdentity,
    State(state): State<AppState>,
    Query(window): Query<RevenueWindow>,
) -> AppResult<Response> {
    let summary = state.wallet.revenue_summary(window.from, window.to).await?;
    Ok(success(summary, "Revenue summary computed").into_response())
}
