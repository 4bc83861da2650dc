//! Ticket inventory and lifecycle: tier management, the purchase flow, and
//! check-in.
//!
//! The purchase flow is the one place several subsystems meet: stock is
//! reserved per line item, tickets are issued with price snapshots, the
//! caller-supplied fee figure is reconciled against the fee schedule, and the
//! whole sale commits as one atomic unit. Any failure after reservation
//! releases the reserved stock before the error is returned.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::external::{Notifier, ObjectStorage};
use crate::fees::compute_fees;
use crate::models::{
    Event, GroupSize, Ticket, TicketStatus, TicketTier, TierKind, Transaction, TransactionStatus,
};
use crate::services::SUPPORTED_CURRENCIES;
use crate::store::{ReservationToken, SaleRecord, Store};
use crate::utils::error::{AppError, AppResult, FieldError};

/// Search results are capped at one page.
const SEARCH_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub starts_at: chrono::DateTime<Utc>,
    pub ends_at: Option<chrono::DateTime<Utc>>,
}

/// Incoming tier definition, validated in one pass before it touches storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierDraft {
    pub tier_id: String,
    pub name: String,
    pub description: Option<String>,
    pub ticket_type: TierKind,
    pub per_ticket_price: Option<Decimal>,
    pub group_price: Option<Decimal>,
    pub currency: Option<String>,
    pub group_size: Option<GroupSize>,
    pub purchase_limit: Option<u32>,
    pub perks: Option<Vec<String>>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItem {
    pub tier_id: String,
    pub quantity: u32,
    pub buyer_name: String,
    pub buyer_email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Unique reference for the already-captured charge, supplied by the
    /// payment gateway.
    pub payment_reference: String,
    /// Fee figure the gateway charged; must reconcile with the fee schedule.
    pub fees: Decimal,
    pub items: Vec<PurchaseItem>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseOutcome {
    pub transaction: Transaction,
    pub tickets: Vec<Ticket>,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckInOutcome {
    pub ticket: Ticket,
}

pub struct TicketingService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    storage: Arc<dyn ObjectStorage>,
}

impl TicketingService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            store,
            notifier,
            storage,
        }
    }

    pub async fn create_event(&self, host_id: Uuid, draft: EventDraft) -> AppResult<Event> {
        let mut errors = Vec::new();
        if draft.title.trim().is_empty() {
            errors.push(FieldError::new("title", "Event title is required"));
        }
        if draft.venue.trim().is_empty() {
            errors.push(FieldError::new("venue", "Venue is required"));
        }
        if let Some(ends_at) = draft.ends_at {
            if ends_at <= draft.starts_at {
                errors.push(FieldError::new("endsAt", "Event must end after it starts"));
            }
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        self.store
            .create_event(crate::store::NewEvent {
                host_id,
                title: draft.title,
                description: draft.description,
                venue: draft.venue,
                starts_at: draft.starts_at,
                ends_at: draft.ends_at,
            })
            .await
    }

    pub async fn list_events(&self, host_id: Uuid) -> AppResult<Vec<Event>> {
        self.store.list_events(host_id).await
    }

    pub async fn create_tier(
        &self,
        host_id: Uuid,
        event_id: Uuid,
        draft: TierDraft,
    ) -> AppResult<TicketTier> {
        let event = self.authorized_event(host_id, event_id).await?;
        let tier = validate_tier(event.id, draft)?;
        self.store.insert_tier(tier).await
    }

    /// Replaces the tier wholesale; quantity resets remaining stock along
    /// with the total.
    pub async fn update_tier(
        &self,
        host_id: Uuid,
        event_id: Uuid,
        tier_id: &str,
        mut draft: TierDraft,
    ) -> AppResult<TicketTier> {
        let event = self.authorized_event(host_id, event_id).await?;
        draft.tier_id = tier_id.to_string();
        let tier = validate_tier(event.id, draft)?;
        self.store.replace_tier(tier).await
    }

    pub async fn delete_tier(&self, host_id: Uuid, event_id: Uuid, tier_id: &str) -> AppResult<()> {
        self.authorized_event(host_id, event_id).await?;
        self.store.delete_tier(event_id, tier_id).await
    }

    pub async fn list_tiers(&self, event_id: Uuid) -> AppResult<Vec<TicketTier>> {
        self.store.get_event(event_id).await?;
        self.store.list_tiers(event_id).await
    }

    pub async fn purchase(
        &self,
        event_id: Uuid,
        request: PurchaseRequest,
    ) -> AppResult<PurchaseOutcome> {
        let event = self.store.get_event(event_id).await?;
        validate_purchase(&request)?;

        // Tier lookups up front: purchase limits and price snapshots.
        let mut errors = Vec::new();
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let tier = self.store.get_tier(event_id, &item.tier_id).await?;
            if let Some(limit) = tier.purchase_limit {
                if item.quantity > limit {
                    errors.push(FieldError::new(
                        "items.quantity",
                        format!("Tier '{}' allows at most {limit} per purchase", tier.name),
                    ));
                }
            }
            lines.push((item, tier));
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let subtotal: Decimal = lines
            .iter()
            .map(|(item, tier)| tier.price * Decimal::from(item.quantity))
            .sum();

        // Reserve stock line by line; if anything downstream fails, every
        // reservation taken so far is handed back.
        let mut tokens: Vec<ReservationToken> = Vec::with_capacity(lines.len());
        for (item, _) in &lines {
            match self
                .store
                .reserve(event_id, &item.tier_id, item.quantity)
                .await
            {
                Ok(token) => tokens.push(token),
                Err(err) => {
                    self.release_all(&tokens).await;
                    return Err(err);
                }
            }
        }

        let expected = compute_fees(subtotal).total();
        if request.fees != expected {
            self.release_all(&tokens).await;
            return Err(AppError::validation(
                "fees",
                format!("Fee figure does not match the fee schedule (expected {expected})"),
            ));
        }

        let mut buyers = Vec::with_capacity(lines.len());
        for (item, _) in &lines {
            match self
                .store
                .upsert_buyer(item.buyer_name.clone(), item.buyer_email.clone())
                .await
            {
                Ok(user) => buyers.push(user),
                Err(err) => {
                    self.release_all(&tokens).await;
                    return Err(err);
                }
            }
        }

        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            event_id,
            payment_reference: request.payment_reference.clone(),
            subtotal,
            fees: request.fees,
            total: subtotal + request.fees,
            status: TransactionStatus::Completed,
            created_at: now,
        };
        let mut tickets = Vec::new();
        for ((item, tier), buyer) in lines.iter().zip(&buyers) {
            for _ in 0..item.quantity {
                let id = Uuid::new_v4();
                tickets.push(Ticket {
                    id,
                    event_id,
                    tier_id: tier.tier_id.clone(),
                    user_id: buyer.id,
                    transaction_id: transaction.id,
                    code: format!("GP-{}", id.simple()),
                    price: tier.price,
                    status: TicketStatus::Valid,
                    checked_in_at: None,
                    qr_code: None,
                    created_at: now,
                    updated_at: now,
                });
            }
        }

        let sale = SaleRecord {
            reservations: tokens.clone(),
            transaction,
            tickets,
        };
        let (transaction, mut tickets) = match self.store.record_sale(sale).await {
            Ok(committed) => committed,
            Err(err) => {
                self.release_all(&tokens).await;
                return Err(err);
            }
        };

        // Post-commit side effects: QR upload and buyer notification. These
        // never unwind the sale; failures come back as warnings.
        let mut warnings = Vec::new();
        for ticket in &mut tickets {
            match self.upload_qr(&event, ticket).await {
                Ok(url) => ticket.qr_code = Some(url),
                Err(err) => {
                    warn!(code = %ticket.code, error = %err, "QR upload failed");
                    warnings.push(format!("QR code for ticket {} was not stored", ticket.code));
                }
            }
        }
        for (buyer, item) in buyers.iter().zip(&request.items) {
            let data = json!({
                "event": event.title,
                "quantity": item.quantity,
                "reference": transaction.payment_reference,
            });
            if let Err(err) = self
                .notifier
                .send(&buyer.email, "ticket_purchased", data)
                .await
            {
                warn!(recipient = %buyer.email, error = %err, "Purchase notification failed");
                warnings.push(format!("Confirmation email to {} was not sent", buyer.email));
            }
        }

        Ok(PurchaseOutcome {
            transaction,
            tickets,
            warnings,
        })
    }

    pub async fn check_in(
        &self,
        host_id: Uuid,
        event_id: Uuid,
        identifier: &str,
    ) -> AppResult<CheckInOutcome> {
        self.authorized_event(host_id, event_id).await?;
        let ticket = self.store.check_in(event_id, identifier).await?;
        Ok(CheckInOutcome { ticket })
    }

    pub async fn search(
        &self,
        host_id: Uuid,
        event_id: Uuid,
        query: &str,
    ) -> AppResult<Vec<Ticket>> {
        self.authorized_event(host_id, event_id).await?;
        self.store
            .search_tickets(event_id, query, SEARCH_PAGE_SIZE)
            .await
    }

    async fn authorized_event(&self, host_id: Uuid, event_id: Uuid) -> AppResult<Event> {
        let event = self.store.get_event(event_id).await?;
        if event.host_id != host_id {
            return Err(AppError::Forbidden(
                "You do not manage this event".to_string(),
            ));
        }
        Ok(event)
    }

    async fn release_all(&self, tokens: &[ReservationToken]) {
        for token in tokens {
            if let Err(err) = self.store.release(token).await {
                warn!(reservation = %token.id, error = %err, "Failed to release reservation");
            }
        }
    }

    async fn upload_qr(&self, event: &Event, ticket: &Ticket) -> AppResult<String> {
        // Enough context for offline verification at the gate.
        let payload = json!({
            "event_id": event.id,
            "ticket": ticket.code,
            "buyer_id": ticket.user_id,
            "venue": event.venue,
            "starts_at": event.starts_at,
        });
        let url = self
            .storage
            .put(
                &format!("qr/{}/{}.json", event.id, ticket.code),
                payload.to_string().into_bytes(),
            )
            .await?;
        self.store.set_ticket_qr(ticket.id, url.clone()).await?;
        Ok(url)
    }
}

fn validate_purchase(request: &PurchaseRequest) -> AppResult<()> {
    let mut errors = Vec::new();
    if request.payment_reference.trim().is_empty() {
        errors.push(FieldError::new(
            "paymentReference",
            "Payment reference is required",
        ));
    }
    if request.items.is_empty() {
        errors.push(FieldError::new("items", "At least one ticket is required"));
    }
    if request.fees < Decimal::ZERO {
        errors.push(FieldError::new("fees", "Fees cannot be negative"));
    }
    for (index, item) in request.items.iter().enumerate() {
        if item.quantity < 1 {
            errors.push(FieldError::new(
                format!("items[{index}].quantity"),
                "Quantity must be at least 1",
            ));
        } else if i32::try_from(item.quantity).is_err() {
            errors.push(FieldError::new(
                format!("items[{index}].quantity"),
                "Quantity is out of range",
            ));
        }
        if item.buyer_name.trim().is_empty() {
            errors.push(FieldError::new(
                format!("items[{index}].buyerName"),
                "Buyer name is required",
            ));
        }
        if !item.buyer_email.contains('@') {
            errors.push(FieldError::new(
                format!("items[{index}].buyerEmail"),
                "A valid buyer email is required",
            ));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Checks every tier rule in one pass and reports all problems together.
fn validate_tier(event_id: Uuid, draft: TierDraft) -> AppResult<TicketTier> {
    let mut errors = Vec::new();

    if draft.tier_id.trim().is_empty() {
        errors.push(FieldError::new("tierId", "Tier identifier is required"));
    }
    if draft.name.trim().is_empty() {
        errors.push(FieldError::new("name", "Tier name is required"));
    }
    if draft.quantity < 0 {
        errors.push(FieldError::new("quantity", "Quantity cannot be negative"));
    }
    if draft.purchase_limit == Some(0) {
        errors.push(FieldError::new(
            "purchaseLimit",
            "Purchase limit must be at least 1",
        ));
    }

    match draft.currency.as_deref() {
        None => errors.push(FieldError::new("currency", "Currency is required")),
        Some(currency) if !SUPPORTED_CURRENCIES.contains(&currency) => {
            errors.push(FieldError::new(
                "currency",
                format!("Currency '{currency}' is not supported"),
            ));
        }
        Some(_) => {}
    }

    let price = match draft.ticket_type {
        TierKind::Individual => {
            if draft.group_size.is_some() {
                errors.push(FieldError::new(
                    "groupSize",
                    "Individual tiers do not take a group size",
                ));
            }
            match draft.per_ticket_price {
                None => {
                    errors.push(FieldError::new(
                        "perTicketPrice",
                        "Individual tiers require a per-ticket price",
                    ));
                    Decimal::ZERO
                }
                Some(price) if price < Decimal::ZERO => {
                    errors.push(FieldError::new(
                        "perTicketPrice",
                        "Price cannot be negative",
                    ));
                    Decimal::ZERO
                }
                Some(price) => price,
            }
        }
        TierKind::Group => {
            match draft.group_size {
                None => errors.push(FieldError::new(
                    "groupSize",
                    "Group tiers require a group size or 'unlimited'",
                )),
                Some(GroupSize::Limited(0)) => errors.push(FieldError::new(
                    "groupSize",
                    "Group size must be a positive integer or 'unlimited'",
                )),
                Some(_) => {}
            }
            match draft.group_price {
                None => {
                    errors.push(FieldError::new(
                        "groupPrice",
                        "Group tiers require a group price",
                    ));
                    Decimal::ZERO
                }
                Some(price) if price < Decimal::ZERO => {
                    errors.push(FieldError::new("groupPrice", "Price cannot be negative"));
                    Decimal::ZERO
                }
                Some(price) => price,
            }
        }
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let now = Utc::now();
    Ok(TicketTier {
        event_id,
        tier_id: draft.tier_id,
        name: draft.name,
        description: draft.description,
        kind: draft.ticket_type,
        price,
        currency: draft.currency.unwrap_or_default(),
        group_size: draft.group_size,
        purchase_limit: draft.purchase_limit,
        perks: draft.perks.unwrap_or_default(),
        total_quantity: draft.quantity,
        remaining_quantity: draft.quantity,
        created_at: now,
        updated_at: now,
    })
}
