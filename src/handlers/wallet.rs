use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::handlers::{AppState, HostIdentity};
use crate::services::wallet::BankDetailsDraft;
use crate::utils::error::AppResult;
use crate::utils::response::{partial_success, success};

pub async fn get_wallet(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let wallet = state.wallet.wallet(host_id).await?;
    Ok(success(wallet, "Wallet retrieved").into_response())
}

pub async fn set_bank_details(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Json(draft): Json<BankDetailsDraft>,
) -> AppResult<Response> {
    let host = state.wallet.set_bank_details(host_id, draft).await?;
    Ok(success(host, "Bank details saved").into_response())
}

#[derive(Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
}

pub async fn request_withdrawal(
    HostIdentity(host_id): HostIdentity,
    State(state): State<AppState>,
    Json(request): Json<WithdrawalRequest>,
) -> AppResult<Response> {
    let outcome = state
        .wallet
        .request_withdrawal(host_id, request.amount)
        .await?;
    let warnings = outcome.warnings.clone();
    Ok(partial_success(outcome, "Withdrawal requested", warnings).into_response())
}
