use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tier_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Individual,
    Group,
}

/// Seats covered by one group ticket. Serialized as the sentinel string
/// `"unlimited"` or a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupSize {
    Unlimited,
    #[serde(untagged)]
    Limited(u32),
}

/// A priced ticket category with finite stock, scoped to one event.
///
/// `tier_id` is caller-supplied and unique within the event. Quantity fields
/// only change through the inventory reserve/release operations; `remaining`
/// stays within `0..=total`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketTier {
    pub event_id: Uuid,
    pub tier_id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: TierKind,
    /// Per-ticket price for individual tiers, price of the whole group
    /// for group tiers.
    pub price: Decimal,
    pub currency: String,
    pub group_size: Option<GroupSize>,
    pub purchase_limit: Option<u32>,
    pub perks: Vec<String>,
    pub total_quantity: i32,
    pub remaining_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Valid,
    Used,
}

/// One sold unit. `price` is snapshotted at purchase time and never follows
/// later tier edits. `Used` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub tier_id: String,
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    /// Public ticket identifier printed on the QR code.
    pub code: String,
    pub price: Decimal,
    pub status: TicketStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Durable URL of the uploaded QR image, set after issuance.
    pub qr_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
