//! In-memory [`Store`] used by tests and local runs without a database.
//!
//! One `RwLock` guards the whole state. Every operation with a
//! check-then-mutate invariant takes the write lock once and performs both
//! halves inside that scope, which gives the same atomicity the Postgres
//! store gets from conditional updates and row locks.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    BankDetails, Event, Host, Payout, PayoutStatus, Ticket, TicketStatus, TicketTier, Transaction,
    User,
};
use crate::store::{EventRevenue, NewEvent, NewPayout, ReservationToken, SaleRecord, Store};
use crate::utils::error::{AppError, AppResult, ConflictError};

struct Reservation {
    event_id: Uuid,
    tier_id: String,
    quantity: u32,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    hosts: HashMap<Uuid, Host>,
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    tiers: HashMap<(Uuid, String), TicketTier>,
    tickets: HashMap<Uuid, Ticket>,
    ticket_codes: HashMap<String, Uuid>,
    transactions: HashMap<Uuid, Transaction>,
    payment_references: HashSet<String>,
    payouts: HashMap<Uuid, Payout>,
    reservations: HashMap<Uuid, Reservation>,
}

impl MemoryState {
    fn balance_of(&self, host_id: Uuid) -> Decimal {
        let gross: Decimal = self
            .tickets
            .values()
            .filter(|ticket| {
                self.events
                    .get(&ticket.event_id)
                    .is_some_and(|event| event.host_id == host_id)
            })
            .map(|ticket| ticket.price)
            .sum();
        let withdrawn: Decimal = self
            .payouts
            .values()
            .filter(|payout| payout.host_id == host_id && payout.status == PayoutStatus::Completed)
            .map(|payout| payout.approved_amount.unwrap_or(payout.amount))
            .sum();
        gross - withdrawn
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_host(&self, name: String, email: String) -> AppResult<Host> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let host = Host {
            id: Uuid::new_v4(),
            name,
            email,
            bank_details: None,
            created_at: now,
            updated_at: now,
        };
        state.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn get_host(&self, id: Uuid) -> AppResult<Host> {
        let state = self.state.read().await;
        state
            .hosts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Host {id} was not found")))
    }

    async fn set_bank_details(&self, host_id: Uuid, bank: BankDetails) -> AppResult<Host> {
        let mut state = self.state.write().await;
        let host = state
            .hosts
            .get_mut(&host_id)
            .ok_or_else(|| AppError::not_found(format!("Host {host_id} was not found")))?;
        host.bank_details = Some(bank);
        host.updated_at = Utc::now();
        Ok(host.clone())
    }

    async fn upsert_buyer(&self, name: String, email: String) -> AppResult<User> {
        let mut state = self.state.write().await;
        if let Some(user) = state
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(&email))
        {
            return Ok(user.clone());
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name,
            email,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_event(&self, event: NewEvent) -> AppResult<Event> {
        let mut state = self.state.write().await;
        if !state.hosts.contains_key(&event.host_id) {
            return Err(AppError::not_found(format!(
                "Host {} was not found",
                event.host_id
            )));
        }
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            host_id: event.host_id,
            title: event.title,
            description: event.description,
            venue: event.venue,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: Uuid) -> AppResult<Event> {
        let state = self.state.read().await;
        state
            .events
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Event {id} was not found")))
    }

    async fn list_events(&self, host_id: Uuid) -> AppResult<Vec<Event>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .values()
            .filter(|event| event.host_id == host_id)
            .cloned()
            .collect())
    }

    async fn insert_tier(&self, tier: TicketTier) -> AppResult<TicketTier> {
        let mut state = self.state.write().await;
        if !state.events.contains_key(&tier.event_id) {
            return Err(AppError::not_found(format!(
                "Event {} was not found",
                tier.event_id
            )));
        }
        let key = (tier.event_id, tier.tier_id.clone());
        if state.tiers.contains_key(&key) {
            return Err(AppError::validation(
                "tierId",
                format!("Tier '{}' already exists for this event", tier.tier_id),
            ));
        }
        state.tiers.insert(key, tier.clone());
        Ok(tier)
    }

    async fn replace_tier(&self, tier: TicketTier) -> AppResult<TicketTier> {
        let mut state = self.state.write().await;
        let key = (tier.event_id, tier.tier_id.clone());
        let existing = state
            .tiers
            .get_mut(&key)
            .ok_or_else(|| AppError::not_found(format!("Tier '{}' was not found", tier.tier_id)))?;
        let mut tier = tier;
        tier.created_at = existing.created_at;
        tier.updated_at = Utc::now();
        *existing = tier.clone();
        Ok(tier)
    }

    async fn delete_tier(&self, event_id: Uuid, tier_id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .tiers
            .remove(&(event_id, tier_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(format!("Tier '{tier_id}' was not found")))
    }

    async fn get_tier(&self, event_id: Uuid, tier_id: &str) -> AppResult<TicketTier> {
        let state = self.state.read().await;
        state
            .tiers
            .get(&(event_id, tier_id.to_string()))
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Tier '{tier_id}' was not found")))
    }

    async fn list_tiers(&self, event_id: Uuid) -> AppResult<Vec<TicketTier>> {
        let state = self.state.read().await;
        Ok(state
            .tiers
            .values()
            .filter(|tier| tier.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn reserve(
        &self,
        event_id: Uuid,
        tier_id: &str,
        quantity: u32,
    ) -> AppResult<ReservationToken> {
        // Quantities beyond the stock counter's range would wrap negative
        // through the cast and slip past the availability check.
        let units = i32::try_from(quantity)
            .map_err(|_| AppError::validation("quantity", "Quantity is out of range"))?;
        // Check and decrement under one write lock; concurrent reservations
        // serialize here and can never drive `remaining` below zero.
        let mut state = self.state.write().await;
        let tier = state
            .tiers
            .get_mut(&(event_id, tier_id.to_string()))
            .ok_or_else(|| AppError::not_found(format!("Tier '{tier_id}' was not found")))?;
        if tier.remaining_quantity < units {
            return Err(ConflictError::InsufficientStock {
                tier: tier.name.clone(),
            }
            .into());
        }
        tier.remaining_quantity -= units;
        tier.updated_at = Utc::now();
        let token = ReservationToken {
            id: Uuid::new_v4(),
            event_id,
            tier_id: tier_id.to_string(),
            quantity,
        };
        state.reservations.insert(
            token.id,
            Reservation {
                event_id,
                tier_id: tier_id.to_string(),
                quantity,
                created_at: Utc::now(),
            },
        );
        Ok(token)
    }

    async fn release(&self, token: &ReservationToken) -> AppResult<()> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .remove(&token.id)
            .ok_or(ConflictError::ReservationReleased)?;
        restore_stock(&mut state, &reservation);
        Ok(())
    }

    async fn reclaim_stale_reservations(&self, older_than: Duration) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let cutoff = Utc::now() - older_than;
        let stale: Vec<Uuid> = state
            .reservations
            .iter()
            .filter(|(_, reservation)| reservation.created_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            if let Some(reservation) = state.reservations.remove(id) {
                restore_stock(&mut state, &reservation);
            }
        }
        Ok(stale.len() as u64)
    }

    async fn record_sale(&self, sale: SaleRecord) -> AppResult<(Transaction, Vec<Ticket>)> {
        let mut state = self.state.write().await;

        // All checks first so a failure leaves nothing half-written.
        if state
            .payment_references
            .contains(&sale.transaction.payment_reference)
        {
            return Err(ConflictError::DuplicatePaymentReference {
                reference: sale.transaction.payment_reference.clone(),
            }
            .into());
        }
        for token in &sale.reservations {
            if !state.reservations.contains_key(&token.id) {
                return Err(ConflictError::ReservationReleased.into());
            }
        }
        for ticket in &sale.tickets {
            if state.ticket_codes.contains_key(&ticket.code) {
                return Err(AppError::Internal(format!(
                    "Ticket code '{}' is already issued",
                    ticket.code
                )));
            }
        }

        for token in &sale.reservations {
            state.reservations.remove(&token.id);
        }
        state
            .payment_references
            .insert(sale.transaction.payment_reference.clone());
        state
            .transactions
            .insert(sale.transaction.id, sale.transaction.clone());
        for ticket in &sale.tickets {
            state.ticket_codes.insert(ticket.code.clone(), ticket.id);
            state.tickets.insert(ticket.id, ticket.clone());
        }
        Ok((sale.transaction, sale.tickets))
    }

    async fn find_ticket(&self, event_id: Uuid, identifier: &str) -> AppResult<Ticket> {
        let state = self.state.read().await;
        lookup_ticket(&state, event_id, identifier)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Ticket '{identifier}' was not found")))
    }

    async fn check_in(&self, event_id: Uuid, identifier: &str) -> AppResult<Ticket> {
        let mut state = self.state.write().await;
        let ticket_id = lookup_ticket(&state, event_id, identifier)
            .map(|ticket| ticket.id)
            .ok_or_else(|| AppError::not_found(format!("Ticket '{identifier}' was not found")))?;
        let Some(ticket) = state.tickets.get_mut(&ticket_id) else {
            return Err(AppError::not_found(format!(
                "Ticket '{identifier}' was not found"
            )));
        };
        if ticket.status == TicketStatus::Used {
            return Err(ConflictError::AlreadyUsed {
                ticket: ticket.code.clone(),
            }
            .into());
        }
        ticket.status = TicketStatus::Used;
        ticket.checked_in_at = Some(Utc::now());
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn set_ticket_qr(&self, ticket_id: Uuid, url: String) -> AppResult<()> {
        let mut state = self.state.write().await;
        let ticket = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| AppError::not_found(format!("Ticket {ticket_id} was not found")))?;
        ticket.qr_code = Some(url);
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn search_tickets(
        &self,
        event_id: Uuid,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<Ticket>> {
        let state = self.state.read().await;
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        for ticket in state.tickets.values() {
            if ticket.event_id != event_id {
                continue;
            }
            let buyer_email = state
                .users
                .get(&ticket.user_id)
                .map(|user| user.email.to_lowercase())
                .unwrap_or_default();
            if ticket.code.to_lowercase().contains(&needle)
                || ticket.id.to_string().contains(&needle)
                || buyer_email.contains(&needle)
            {
                matches.push(ticket.clone());
                if matches.len() >= limit {
                    break;
                }
            }
        }
        Ok(matches)
    }

    async fn balance_of(&self, host_id: Uuid) -> AppResult<Decimal> {
        let state = self.state.read().await;
        Ok(state.balance_of(host_id))
    }

    async fn event_revenue(&self, host_id: Uuid) -> AppResult<Vec<EventRevenue>> {
        let state = self.state.read().await;
        let mut revenue: Vec<EventRevenue> = state
            .events
            .values()
            .filter(|event| event.host_id == host_id)
            .map(|event| EventRevenue {
                event_id: event.id,
                title: event.title.clone(),
                tickets_sold: 0,
                gross: Decimal::ZERO,
            })
            .collect();
        for ticket in state.tickets.values() {
            if let Some(entry) = revenue
                .iter_mut()
                .find(|entry| entry.event_id == ticket.event_id)
            {
                entry.tickets_sold += 1;
                entry.gross += ticket.price;
            }
        }
        Ok(revenue)
    }

    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .filter(|txn| txn.created_at >= from && txn.created_at < to)
            .cloned()
            .collect())
    }

    async fn create_payout(&self, payout: NewPayout) -> AppResult<Payout> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let payout = Payout {
            id: Uuid::new_v4(),
            host_id: payout.host_id,
            event_id: payout.event_id,
            amount: payout.amount,
            fee: payout.fee,
            net_amount: payout.amount - payout.fee,
            bank_name: payout.bank.bank_name,
            bank_code: payout.bank.bank_code,
            account_number: payout.bank.account_number,
            account_name: payout.bank.account_name,
            status: PayoutStatus::Pending,
            reviewed_by: None,
            approved_amount: None,
            proof_of_payment: None,
            rejection_reason: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };
        state.payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn get_payout(&self, id: Uuid) -> AppResult<Payout> {
        let state = self.state.read().await;
        state
            .payouts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Payout {id} was not found")))
    }

    async fn list_payouts(&self, host_id: Option<Uuid>) -> AppResult<Vec<Payout>> {
        let state = self.state.read().await;
        let mut payouts: Vec<Payout> = state
            .payouts
            .values()
            .filter(|payout| host_id.map_or(true, |host| payout.host_id == host))
            .cloned()
            .collect();
        payouts.sort_by_key(|payout| payout.created_at);
        Ok(payouts)
    }

    async fn approve_payout(
        &self,
        id: Uuid,
        approved_amount: Decimal,
        proof_of_payment: Option<String>,
        reviewer: Uuid,
    ) -> AppResult<Payout> {
        // Balance re-verification and the `completed` transition share one
        // write-lock scope, closing the check/commit gap.
        let mut state = self.state.write().await;
        let payout = state
            .payouts
            .get(&id)
            .ok_or_else(|| AppError::not_found(format!("Payout {id} was not found")))?;
        if payout.status != PayoutStatus::Pending {
            return Err(ConflictError::AlreadyProcessed { payout: id }.into());
        }
        let host_id = payout.host_id;
        let balance = state.balance_of(host_id);
        if approved_amount > balance {
            return Err(ConflictError::InsufficientBalance { balance }.into());
        }
        let Some(payout) = state.payouts.get_mut(&id) else {
            return Err(AppError::not_found(format!("Payout {id} was not found")));
        };
        payout.status = PayoutStatus::Completed;
        payout.approved_amount = Some(approved_amount);
        payout.net_amount = approved_amount - payout.fee;
        payout.proof_of_payment = proof_of_payment;
        payout.reviewed_by = Some(reviewer);
        payout.reviewed_at = Some(Utc::now());
        payout.updated_at = Utc::now();
        Ok(payout.clone())
    }

    async fn reject_payout(&self, id: Uuid, reason: String, reviewer: Uuid) -> AppResult<Payout> {
        let mut state = self.state.write().await;
        let payout = state
            .payouts
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Payout {id} was not found")))?;
        if payout.status != PayoutStatus::Pending {
            return Err(ConflictError::AlreadyProcessed { payout: id }.into());
        }
        payout.status = PayoutStatus::Rejected;
        payout.rejection_reason = Some(reason);
        payout.reviewed_by = Some(reviewer);
        payout.reviewed_at = Some(Utc::now());
        payout.updated_at = Utc::now();
        Ok(payout.clone())
    }
}

fn restore_stock(state: &mut MemoryState, reservation: &Reservation) {
    match state
        .tiers
        .get_mut(&(reservation.event_id, reservation.tier_id.clone()))
    {
        Some(tier) => {
            tier.remaining_quantity =
                (tier.remaining_quantity + reservation.quantity as i32).min(tier.total_quantity);
            tier.updated_at = Utc::now();
        }
        None => {
            warn!(
                event_id = %reservation.event_id,
                tier_id = %reservation.tier_id,
                "Released reservation against a deleted tier"
            );
        }
    }
}

fn lookup_ticket<'a>(
    state: &'a MemoryState,
    event_id: Uuid,
    identifier: &str,
) -> Option<&'a Ticket> {
    let by_code = state
        .ticket_codes
        .get(identifier)
        .and_then(|id| state.tickets.get(id));
    let ticket = by_code.or_else(|| {
        identifier
            .parse::<Uuid>()
            .ok()
            .and_then(|id| state.tickets.get(&id))
    })?;
    (ticket.event_id == event_id).then_some(ticket)
}
