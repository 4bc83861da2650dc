use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Destination for bank disbursements. A payout request is refused until the
/// host has all four fields on file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub bank_code: String,
    /// 10-digit NUBAN account number.
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub bank_details: Option<BankDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
