//! Storage seam for the inventory, ledger and payout state.
//!
//! Two implementations: [`MemoryStore`] backs tests and local runs,
//! [`PgStore`] backs production. The operations with concurrency invariants
//! (`reserve`, `check_in`, `approve_payout`, `record_sale`) are atomic inside
//! the store: the check and the mutation happen in one indivisible unit, a
//! single write-lock scope in memory or a single conditional statement /
//! row-locked transaction in Postgres.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{BankDetails, Event, Host, Payout, Ticket, TicketTier, Transaction, User};
use crate::utils::error::AppResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Proof of a successful stock reservation. Held by the purchase flow until
/// the sale commits; handed back via [`Store::release`] if anything
/// downstream fails.
#[derive(Debug, Clone)]
pub struct ReservationToken {
    pub id: Uuid,
    pub event_id: Uuid,
    pub tier_id: String,
    pub quantity: u32,
}

/// Everything a committed checkout writes in one atomic unit: the reserved
/// stock it consumes, the transaction row, and the issued tickets.
#[derive(Debug)]
pub struct SaleRecord {
    pub reservations: Vec<ReservationToken>,
    pub transaction: Transaction,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug)]
pub struct NewEvent {
    pub host_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct NewPayout {
    pub host_id: Uuid,
    pub event_id: Option<Uuid>,
    pub amount: Decimal,
    pub fee: Decimal,
    pub bank: BankDetails,
}

/// Gross revenue of one event, for the host wallet view.
#[derive(Debug, Clone, Serialize)]
pub struct EventRevenue {
    pub event_id: Uuid,
    pub title: String,
    pub tickets_sold: i64,
    pub gross: Decimal,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Hosts and buyers
    async fn create_host(&self, name: String, email: String) -> AppResult<Host>;
    async fn get_host(&self, id: Uuid) -> AppResult<Host>;
    async fn set_bank_details(&self, host_id: Uuid, bank: BankDetails) -> AppResult<Host>;
    /// Resolves a buyer by email, creating the user on first sight.
    async fn upsert_buyer(&self, name: String, email: String) -> AppResult<User>;

    // Events
    async fn create_event(&self, event: NewEvent) -> AppResult<Event>;
    async fn get_event(&self, id: Uuid) -> AppResult<Event>;
    async fn list_events(&self, host_id: Uuid) -> AppResult<Vec<Event>>;

    // Tiers
    async fn insert_tier(&self, tier: TicketTier) -> AppResult<TicketTier>;
    /// Replaces the tier wholesale by identifier. `NotFound` if absent.
    async fn replace_tier(&self, tier: TicketTier) -> AppResult<TicketTier>;
    async fn delete_tier(&self, event_id: Uuid, tier_id: &str) -> AppResult<()>;
    async fn get_tier(&self, event_id: Uuid, tier_id: &str) -> AppResult<TicketTier>;
    async fn list_tiers(&self, event_id: Uuid) -> AppResult<Vec<TicketTier>>;

    // Inventory
    /// Atomically checks `remaining >= quantity` and decrements. Errors:
    /// `NotFound` for an unknown tier, `InsufficientStock` otherwise.
    async fn reserve(
        &self,
        event_id: Uuid,
        tier_id: &str,
        quantity: u32,
    ) -> AppResult<ReservationToken>;
    /// Returns reserved units to stock. Rejects a token that was already
    /// released or consumed by a committed sale.
    async fn release(&self, token: &ReservationToken) -> AppResult<()>;
    /// Deletes reservations older than `older_than` and returns their stock.
    /// A reservation only lives for the span of one purchase request; older
    /// entries are orphans from a process that died between reserve and
    /// commit. Returns the number reclaimed.
    async fn reclaim_stale_reservations(&self, older_than: Duration) -> AppResult<u64>;

    /// Persists the transaction and tickets and consumes the reservations,
    /// all in one atomic unit. Rejects duplicate payment references.
    async fn record_sale(&self, sale: SaleRecord) -> AppResult<(Transaction, Vec<Ticket>)>;

    // Ticket lifecycle
    /// Looks a ticket up by public code or record id within an event.
    async fn find_ticket(&self, event_id: Uuid, identifier: &str) -> AppResult<Ticket>;
    /// Atomic `valid -> used` transition; stamps the redemption time.
    /// `AlreadyUsed` on a second attempt, `NotFound` for unknown identifiers.
    async fn check_in(&self, event_id: Uuid, identifier: &str) -> AppResult<Ticket>;
    async fn set_ticket_qr(&self, ticket_id: Uuid, url: String) -> AppResult<()>;
    async fn search_tickets(
        &self,
        event_id: Uuid,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<Ticket>>;

    // Revenue ledger
    /// Derived balance: gross ticket revenue across the host's events minus
    /// completed payout amounts. Recomputed from source records on every
    /// call; nothing caches this.
    async fn balance_of(&self, host_id: Uuid) -> AppResult<Decimal>;
    async fn event_revenue(&self, host_id: Uuid) -> AppResult<Vec<EventRevenue>>;
    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Transaction>>;

    // Payouts
    async fn create_payout(&self, payout: NewPayout) -> AppResult<Payout>;
    async fn get_payout(&self, id: Uuid) -> AppResult<Payout>;
    /// All payouts, or one host's when `host_id` is given.
    async fn list_payouts(&self, host_id: Option<Uuid>) -> AppResult<Vec<Payout>>;
    /// `pending -> completed`. Re-verifies the host balance against
    /// `approved_amount` inside the same atomic scope as the transition;
    /// `InsufficientBalance` or `AlreadyProcessed` leave the payout untouched.
    async fn approve_payout(
        &self,
        id: Uuid,
        approved_amount: Decimal,
        proof_of_payment: Option<String>,
        reviewer: Uuid,
    ) -> AppResult<Payout>;
    /// `pending -> rejected`; the balance is unaffected.
    async fn reject_payout(&self, id: Uuid, reason: String, reviewer: Uuid) -> AppResult<Payout>;
}
