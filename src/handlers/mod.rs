pub mod events;
pub mod payouts;
pub mod tickets;
pub mod tiers;
pub mod wallet;

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::services::{TicketingService, WalletService};
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Clone)]
pub struct AppState {
    pub ticketing: Arc<TicketingService>,
    pub wallet: Arc<WalletService>,
}

/// Host identity resolved upstream by the identity service; the handlers
/// trust the forwarded header and do not re-validate credentials.
pub struct HostIdentity(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for HostIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_header(parts, "x-host-id").map(HostIdentity)
    }
}

/// Back-office identity, forwarded the same way as [`HostIdentity`].
pub struct AdminIdentity(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_header(parts, "x-admin-id").map(AdminIdentity)
    }
}

fn identity_header(parts: &Parts, header: &str) -> Result<Uuid, AppError> {
    parts
        .headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| AppError::Auth(format!("Missing or invalid {header} credential")))
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "gatepass-api",
    };

    success(payload, "Health check successful").into_response()
}
