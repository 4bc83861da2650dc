use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Completed,
    Rejected,
}

/// A host withdrawal request routed through admin review.
///
/// `net_amount = amount - fee` always. Only `completed` payouts count against
/// the host's ledger balance; a `pending` payout leaves the balance untouched
/// until an admin approves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub host_id: Uuid,
    pub event_id: Option<Uuid>,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub bank_name: String,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub status: PayoutStatus,
    pub reviewed_by: Option<Uuid>,
    pub approved_amount: Option<Decimal>,
    /// Durable URL of the proof-of-payment attachment recorded at approval.
    pub proof_of_payment: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
