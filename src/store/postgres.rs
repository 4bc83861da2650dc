//! Postgres-backed [`Store`].
//!
//! Atomicity strategy: stock reservation is a single conditional `UPDATE`
//! guarded by `remaining_quantity >= quantity`, sale commit is one
//! transaction, and payout approval locks the payout row with
//! `SELECT ... FOR UPDATE` and recomputes the balance inside that
//! transaction before the `completed` transition.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction as PgTransaction};
use uuid::Uuid;

use crate::models::{
    BankDetails, Event, GroupSize, Host, Payout, PayoutStatus, Ticket, TicketTier, Transaction,
    User,
};
use crate::store::{EventRevenue, NewEvent, NewPayout, ReservationToken, SaleRecord, Store};
use crate::utils::error::{AppError, AppResult, ConflictError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn balance_in<'c>(
        tx: &mut PgTransaction<'c, Postgres>,
        host_id: Uuid,
    ) -> Result<Decimal, sqlx::Error> {
        sqlx::query_scalar::<_, Decimal>(BALANCE_SQL)
            .bind(host_id)
            .fetch_one(&mut **tx)
            .await
    }
}

const BALANCE_SQL: &str = r"
    SELECT COALESCE((
               SELECT SUM(t.price)
               FROM tickets t
               JOIN events e ON e.id = t.event_id
               WHERE e.host_id = $1
           ), 0)
         - COALESCE((
               SELECT SUM(COALESCE(p.approved_amount, p.amount))
               FROM payouts p
               WHERE p.host_id = $1 AND p.status = 'completed'
           ), 0)
";

fn host_from_row(row: &PgRow) -> Result<Host, sqlx::Error> {
    let bank_name: Option<String> = row.try_get("bank_name")?;
    let bank_details = match bank_name {
        Some(bank_name) => Some(BankDetails {
            bank_name,
            bank_code: row.try_get("bank_code")?,
            account_number: row.try_get("account_number")?,
            account_name: row.try_get("account_name")?,
        }),
        None => None,
    };
    Ok(Host {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        bank_details,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn tier_from_row(row: &PgRow) -> Result<TicketTier, sqlx::Error> {
    let unlimited: bool = row.try_get("group_unlimited")?;
    let group_size = if unlimited {
        Some(GroupSize::Unlimited)
    } else {
        row.try_get::<Option<i32>, _>("group_size")?
            .map(|size| GroupSize::Limited(size as u32))
    };
    Ok(TicketTier {
        event_id: row.try_get("event_id")?,
        tier_id: row.try_get("tier_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        kind: row.try_get("kind")?,
        price: row.try_get("price")?,
        currency: row.try_get("currency")?,
        group_size,
        purchase_limit: row
            .try_get::<Option<i32>, _>("purchase_limit")?
            .map(|limit| limit as u32),
        perks: row.try_get("perks")?,
        total_quantity: row.try_get("total_quantity")?,
        remaining_quantity: row.try_get("remaining_quantity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payout_from_row(row: &PgRow) -> Result<Payout, sqlx::Error> {
    Ok(Payout {
        id: row.try_get("id")?,
        host_id: row.try_get("host_id")?,
        event_id: row.try_get("event_id")?,
        amount: row.try_get("amount")?,
        fee: row.try_get("fee")?,
        net_amount: row.try_get("net_amount")?,
        bank_name: row.try_get("bank_name")?,
        bank_code: row.try_get("bank_code")?,
        account_number: row.try_get("account_number")?,
        account_name: row.try_get("account_name")?,
        status: row.try_get("status")?,
        reviewed_by: row.try_get("reviewed_by")?,
        approved_amount: row.try_get("approved_amount")?,
        proof_of_payment: row.try_get("proof_of_payment")?,
        rejection_reason: row.try_get("rejection_reason")?,
        reviewed_at: row.try_get("reviewed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn group_size_columns(tier: &TicketTier) -> (bool, Option<i32>) {
    match tier.group_size {
        Some(GroupSize::Unlimited) => (true, None),
        Some(GroupSize::Limited(size)) => (false, Some(size as i32)),
        None => (false, None),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl Store for PgStore {
    async fn create_host(&self, name: String, email: String) -> AppResult<Host> {
        let row = sqlx::query(
            "INSERT INTO hosts (id, name, email, created_at, updated_at)
             VALUES ($1, $2, $3, now(), now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email.to_lowercase())
        .fetch_one(&self.pool)
        .await?;
        Ok(host_from_row(&row)?)
    }

    async fn get_host(&self, id: Uuid) -> AppResult<Host> {
        let row = sqlx::query("SELECT * FROM hosts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Host {id} was not found")))?;
        Ok(host_from_row(&row)?)
    }

    async fn set_bank_details(&self, host_id: Uuid, bank: BankDetails) -> AppResult<Host> {
        let row = sqlx::query(
            "UPDATE hosts
             SET bank_name = $2, bank_code = $3, account_number = $4, account_name = $5,
                 updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(host_id)
        .bind(bank.bank_name)
        .bind(bank.bank_code)
        .bind(bank.account_number)
        .bind(bank.account_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Host {host_id} was not found")))?;
        Ok(host_from_row(&row)?)
    }

    async fn upsert_buyer(&self, name: String, email: String) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, name, email, created_at, updated_at)
             VALUES ($1, $2, $3, now(), now())
             ON CONFLICT (email) DO UPDATE SET updated_at = now()
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email.to_lowercase())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_event(&self, event: NewEvent) -> AppResult<Event> {
        let created = sqlx::query_as::<_, Event>(
            "INSERT INTO events (id, host_id, title, description, venue, starts_at, ends_at,
                                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(event.host_id)
        .bind(event.title)
        .bind(event.description)
        .bind(event.venue)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if err
                .as_database_error()
                .is_some_and(|db| db.is_foreign_key_violation())
            {
                AppError::not_found("Host was not found")
            } else {
                err.into()
            }
        })?;
        Ok(created)
    }

    async fn get_event(&self, id: Uuid) -> AppResult<Event> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Event {id} was not found")))
    }

    async fn list_events(&self, host_id: Uuid) -> AppResult<Vec<Event>> {
        Ok(sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE host_id = $1 ORDER BY created_at",
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_tier(&self, tier: TicketTier) -> AppResult<TicketTier> {
        self.get_event(tier.event_id).await?;
        let (unlimited, size) = group_size_columns(&tier);
        let row = sqlx::query(
            "INSERT INTO ticket_tiers (event_id, tier_id, name, description, kind, price,
                                       currency, group_unlimited, group_size, purchase_limit,
                                       perks, total_quantity, remaining_quantity,
                                       created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now(), now())
             RETURNING *",
        )
        .bind(tier.event_id)
        .bind(&tier.tier_id)
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier.kind)
        .bind(tier.price)
        .bind(&tier.currency)
        .bind(unlimited)
        .bind(size)
        .bind(tier.purchase_limit.map(|limit| limit as i32))
        .bind(&tier.perks)
        .bind(tier.total_quantity)
        .bind(tier.remaining_quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::validation(
                    "tierId",
                    format!("Tier '{}' already exists for this event", tier.tier_id),
                )
            } else {
                err.into()
            }
        })?;
        Ok(tier_from_row(&row)?)
    }

    async fn replace_tier(&self, tier: TicketTier) -> AppResult<TicketTier> {
        let (unlimited, size) = group_size_columns(&tier);
        let row = sqlx::query(
            "UPDATE ticket_tiers
             SET name = $3, description = $4, kind = $5, price = $6, currency = $7,
                 group_unlimited = $8, group_size = $9, purchase_limit = $10, perks = $11,
                 total_quantity = $12, remaining_quantity = $13, updated_at = now()
             WHERE event_id = $1 AND tier_id = $2
             RETURNING *",
        )
        .bind(tier.event_id)
        .bind(&tier.tier_id)
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier.kind)
        .bind(tier.price)
        .bind(&tier.currency)
        .bind(unlimited)
        .bind(size)
        .bind(tier.purchase_limit.map(|limit| limit as i32))
        .bind(&tier.perks)
        .bind(tier.total_quantity)
        .bind(tier.remaining_quantity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Tier '{}' was not found", tier.tier_id)))?;
        Ok(tier_from_row(&row)?)
    }

    async fn delete_tier(&self, event_id: Uuid, tier_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM ticket_tiers WHERE event_id = $1 AND tier_id = $2")
            .bind(event_id)
            .bind(tier_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Tier '{tier_id}' was not found")));
        }
        Ok(())
    }

    async fn get_tier(&self, event_id: Uuid, tier_id: &str) -> AppResult<TicketTier> {
        let row = sqlx::query("SELECT * FROM ticket_tiers WHERE event_id = $1 AND tier_id = $2")
            .bind(event_id)
            .bind(tier_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Tier '{tier_id}' was not found")))?;
        Ok(tier_from_row(&row)?)
    }

    async fn list_tiers(&self, event_id: Uuid) -> AppResult<Vec<TicketTier>> {
        let rows = sqlx::query("SELECT * FROM ticket_tiers WHERE event_id = $1 ORDER BY created_at")
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| tier_from_row(row).map_err(AppError::from))
            .collect()
    }

    async fn reserve(
        &self,
        event_id: Uuid,
        tier_id: &str,
        quantity: u32,
    ) -> AppResult<ReservationToken> {
        // Quantities that don't fit the column type would wrap negative in
        // the arithmetic below.
        let units = i32::try_from(quantity)
            .map_err(|_| AppError::validation("quantity", "Quantity is out of range"))?;
        let mut tx = self.pool.begin().await?;
        // The availability check and the decrement are one conditional
        // statement; racing purchasers serialize on the tier row.
        let updated = sqlx::query(
            "UPDATE ticket_tiers
             SET remaining_quantity = remaining_quantity - $3, updated_at = now()
             WHERE event_id = $1 AND tier_id = $2 AND remaining_quantity >= $3",
        )
        .bind(event_id)
        .bind(tier_id)
        .bind(units)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            let name: Option<String> = sqlx::query_scalar(
                "SELECT name FROM ticket_tiers WHERE event_id = $1 AND tier_id = $2",
            )
            .bind(event_id)
            .bind(tier_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;
            return match name {
                Some(tier) => Err(ConflictError::InsufficientStock { tier }.into()),
                None => Err(AppError::not_found(format!("Tier '{tier_id}' was not found"))),
            };
        }
        let token = ReservationToken {
            id: Uuid::new_v4(),
            event_id,
            tier_id: tier_id.to_string(),
            quantity,
        };
        sqlx::query(
            "INSERT INTO stock_reservations (id, event_id, tier_id, quantity, created_at)
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(token.id)
        .bind(event_id)
        .bind(tier_id)
        .bind(units)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(token)
    }

    async fn release(&self, token: &ReservationToken) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "DELETE FROM stock_reservations WHERE id = $1
             RETURNING event_id, tier_id, quantity",
        )
        .bind(token.id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(ConflictError::ReservationReleased.into());
        };
        let event_id: Uuid = row.try_get("event_id")?;
        let tier_id: String = row.try_get("tier_id")?;
        let quantity: i32 = row.try_get("quantity")?;
        sqlx::query(
            "UPDATE ticket_tiers
             SET remaining_quantity = LEAST(total_quantity, remaining_quantity + $3),
                 updated_at = now()
             WHERE event_id = $1 AND tier_id = $2",
        )
        .bind(event_id)
        .bind(tier_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reclaim_stale_reservations(&self, older_than: Duration) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "DELETE FROM stock_reservations WHERE created_at < $1
             RETURNING event_id, tier_id, quantity",
        )
        .bind(Utc::now() - older_than)
        .fetch_all(&mut *tx)
        .await?;
        for row in &rows {
            let event_id: Uuid = row.try_get("event_id")?;
            let tier_id: String = row.try_get("tier_id")?;
            let quantity: i32 = row.try_get("quantity")?;
            sqlx::query(
                "UPDATE ticket_tiers
                 SET remaining_quantity = LEAST(total_quantity, remaining_quantity + $3),
                     updated_at = now()
                 WHERE event_id = $1 AND tier_id = $2",
            )
            .bind(event_id)
            .bind(tier_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    async fn record_sale(&self, sale: SaleRecord) -> AppResult<(Transaction, Vec<Ticket>)> {
        let mut tx = self.pool.begin().await?;
        for token in &sale.reservations {
            let consumed = sqlx::query("DELETE FROM stock_reservations WHERE id = $1")
                .bind(token.id)
                .execute(&mut *tx)
                .await?;
            if consumed.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(ConflictError::ReservationReleased.into());
            }
        }
        let txn = &sale.transaction;
        sqlx::query(
            "INSERT INTO transactions (id, event_id, payment_reference, subtotal, fees, total,
                                       status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(txn.id)
        .bind(txn.event_id)
        .bind(&txn.payment_reference)
        .bind(txn.subtotal)
        .bind(txn.fees)
        .bind(txn.total)
        .bind(txn.status)
        .bind(txn.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::from(ConflictError::DuplicatePaymentReference {
                    reference: txn.payment_reference.clone(),
                })
            } else {
                err.into()
            }
        })?;
        for ticket in &sale.tickets {
            sqlx::query(
                "INSERT INTO tickets (id, event_id, tier_id, user_id, transaction_id, code,
                                      price, status, checked_in_at, qr_code, created_at,
                                      updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(ticket.id)
            .bind(ticket.event_id)
            .bind(&ticket.tier_id)
            .bind(ticket.user_id)
            .bind(ticket.transaction_id)
            .bind(&ticket.code)
            .bind(ticket.price)
            .bind(ticket.status)
            .bind(ticket.checked_in_at)
            .bind(&ticket.qr_code)
            .bind(ticket.created_at)
            .bind(ticket.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok((sale.transaction, sale.tickets))
    }

    async fn find_ticket(&self, event_id: Uuid, identifier: &str) -> AppResult<Ticket> {
        sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE event_id = $1 AND (code = $2 OR id::text = $2)",
        )
        .bind(event_id)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ticket '{identifier}' was not found")))
    }

    async fn check_in(&self, event_id: Uuid, identifier: &str) -> AppResult<Ticket> {
        // Conditional update: only a `valid` ticket transitions, so a second
        // check-in falls through to the conflict path with its original
        // redemption timestamp intact.
        let checked = sqlx::query_as::<_, Ticket>(
            "UPDATE tickets
             SET status = 'used', checked_in_at = now(), updated_at = now()
             WHERE event_id = $1 AND (code = $2 OR id::text = $2) AND status = 'valid'
             RETURNING *",
        )
        .bind(event_id)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        match checked {
            Some(ticket) => Ok(ticket),
            None => {
                let existing = self.find_ticket(event_id, identifier).await?;
                Err(ConflictError::AlreadyUsed {
                    ticket: existing.code,
                }
                .into())
            }
        }
    }

    async fn set_ticket_qr(&self, ticket_id: Uuid, url: String) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE tickets SET qr_code = $2, updated_at = now() WHERE id = $1",
        )
        .bind(ticket_id)
        .bind(url)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Ticket {ticket_id} was not found"
            )));
        }
        Ok(())
    }

    async fn search_tickets(
        &self,
        event_id: Uuid,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<Ticket>> {
        let needle = format!("%{}%", query.to_lowercase());
        Ok(sqlx::query_as::<_, Ticket>(
            "SELECT t.* FROM tickets t
             JOIN users u ON u.id = t.user_id
             WHERE t.event_id = $1
               AND (t.code ILIKE $2 OR t.id::text LIKE $2 OR u.email ILIKE $2)
             LIMIT $3",
        )
        .bind(event_id)
        .bind(needle)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn balance_of(&self, host_id: Uuid) -> AppResult<Decimal> {
        Ok(sqlx::query_scalar::<_, Decimal>(BALANCE_SQL)
            .bind(host_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn event_revenue(&self, host_id: Uuid) -> AppResult<Vec<EventRevenue>> {
        let rows = sqlx::query(
            "SELECT e.id AS event_id, e.title, COUNT(t.id) AS tickets_sold,
                    COALESCE(SUM(t.price), 0) AS gross
             FROM events e
             LEFT JOIN tickets t ON t.event_id = e.id
             WHERE e.host_id = $1
             GROUP BY e.id, e.title
             ORDER BY e.created_at",
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(EventRevenue {
                    event_id: row.try_get("event_id")?,
                    title: row.try_get("title")?,
                    tickets_sold: row.try_get("tickets_sold")?,
                    gross: row.try_get("gross")?,
                })
            })
            .collect()
    }

    async fn transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Transaction>> {
        Ok(sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_payout(&self, payout: NewPayout) -> AppResult<Payout> {
        let row = sqlx::query(
            "INSERT INTO payouts (id, host_id, event_id, amount, fee, net_amount, bank_name,
                                  bank_code, account_number, account_name, status,
                                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', now(), now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(payout.host_id)
        .bind(payout.event_id)
        .bind(payout.amount)
        .bind(payout.fee)
        .bind(payout.amount - payout.fee)
        .bind(payout.bank.bank_name)
        .bind(payout.bank.bank_code)
        .bind(payout.bank.account_number)
        .bind(payout.bank.account_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(payout_from_row(&row)?)
    }

    async fn get_payout(&self, id: Uuid) -> AppResult<Payout> {
        let row = sqlx::query("SELECT * FROM payouts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payout {id} was not found")))?;
        Ok(payout_from_row(&row)?)
    }

    async fn list_payouts(&self, host_id: Option<Uuid>) -> AppResult<Vec<Payout>> {
        let rows = match host_id {
            Some(host_id) => {
                sqlx::query("SELECT * FROM payouts WHERE host_id = $1 ORDER BY created_at")
                    .bind(host_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM payouts ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(|row| payout_from_row(row).map_err(AppError::from))
            .collect()
    }

    async fn approve_payout(
        &self,
        id: Uuid,
        approved_amount: Decimal,
        proof_of_payment: Option<String>,
        reviewer: Uuid,
    ) -> AppResult<Payout> {
        let mut tx = self.pool.begin().await?;
        // Row lock holds off a concurrent approval of the same payout; the
        // balance is recomputed inside the transaction so the check and the
        // transition commit together.
        let row = sqlx::query("SELECT * FROM payouts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(AppError::not_found(format!("Payout {id} was not found")));
        };
        let payout = payout_from_row(&row)?;
        if payout.status != PayoutStatus::Pending {
            tx.rollback().await?;
            return Err(ConflictError::AlreadyProcessed { payout: id }.into());
        }
        // Approvals for the same host serialize on the host row. The payout
        // row lock alone would let two transactions holding different payouts
        // each read the pre-commit balance and both complete.
        sqlx::query("SELECT id FROM hosts WHERE id = $1 FOR UPDATE")
            .bind(payout.host_id)
            .fetch_optional(&mut *tx)
            .await?;
        let balance = Self::balance_in(&mut tx, payout.host_id).await?;
        if approved_amount > balance {
            tx.rollback().await?;
            return Err(ConflictError::InsufficientBalance { balance }.into());
        }
        let row = sqlx::query(
            "UPDATE payouts
             SET status = 'completed', approved_amount = $2, net_amount = $2 - fee,
                 proof_of_payment = $3, reviewed_by = $4, reviewed_at = now(),
                 updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(approved_amount)
        .bind(proof_of_payment)
        .bind(reviewer)
        .fetch_one(&mut *tx)
        .await?;
        let payout = payout_from_row(&row)?;
        tx.commit().await?;
        Ok(payout)
    }

    async fn reject_payout(&self, id: Uuid, reason: String, reviewer: Uuid) -> AppResult<Payout> {
        let row = sqlx::query(
            "UPDATE payouts
             SET status = 'rejected', rejection_reason = $2, reviewed_by = $3,
                 reviewed_at = now(), updated_at = now()
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(id)
        .bind(reason)
        .bind(reviewer)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(payout_from_row(&row)?),
            None => {
                // Distinguish a missing payout from one already processed.
                self.get_payout(id).await?;
                Err(ConflictError::AlreadyProcessed { payout: id }.into())
            }
        }
    }
}
