use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Only completed charges reach the ledger; failed or pending charges
    /// are rejected before a transaction row is written.
    Completed,
}

/// One checkout. `total = subtotal + fees`, and `fees` must match what the
/// fee schedule computes for `subtotal`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Unique reference supplied by the payment gateway for the charge.
    pub payment_reference: String,
    pub subtotal: Decimal,
    pub fees: Decimal,
    pub total: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}
