//! Revenue ledger and payout workflow.
//!
//! The host balance is a view, derived on every read: gross ticket revenue
//! minus completed payouts. A pending payout does not debit the ledger; the
//! authoritative balance check happens when an admin approves, inside the
//! store's atomic approval operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::external::{Notifier, ObjectStorage};
use crate::fees::compute_fees;
use crate::models::{BankDetails, Host, Payout};
use crate::store::{EventRevenue, NewPayout, Store};
use crate::utils::error::{AppError, AppResult, ConflictError, FieldError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub balance: Decimal,
    pub events: Vec<EventRevenue>,
    pub payouts: Vec<Payout>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetailsDraft {
    pub bank_name: String,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Serialize)]
pub struct PayoutOutcome {
    pub payout: Payout,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

/// Platform revenue over one reporting window. Malformed transaction amounts
/// are skipped, not fatal.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub gross: Decimal,
    pub processor_fees: Decimal,
    pub platform_fees: Decimal,
    pub net: Decimal,
    pub transactions: u64,
    pub skipped: u64,
}

pub struct WalletService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    storage: Arc<dyn ObjectStorage>,
    /// Fixed fee charged on every withdrawal.
    payout_fee: Decimal,
}

impl WalletService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        storage: Arc<dyn ObjectStorage>,
        payout_fee: Decimal,
    ) -> Self {
        Self {
            store,
            notifier,
            storage,
            payout_fee,
        }
    }

    pub async fn wallet(&self, host_id: Uuid) -> AppResult<WalletView> {
        let balance = self.store.balance_of(host_id).await?;
        let events = self.store.event_revenue(host_id).await?;
        let payouts = self.store.list_payouts(Some(host_id)).await?;
        Ok(WalletView {
            balance,
            events,
            payouts,
        })
    }

    pub async fn set_bank_details(
        &self,
        host_id: Uuid,
        draft: BankDetailsDraft,
    ) -> AppResult<Host> {
        let bank = validate_bank_details(draft)?;
        self.store.set_bank_details(host_id, bank).await
    }

    /// Creates a `pending` payout. The balance is checked here as a
    /// courtesy, but funds are not reserved; approval re-verifies.
    pub async fn request_withdrawal(
        &self,
        host_id: Uuid,
        amount: Decimal,
    ) -> AppResult<PayoutOutcome> {
        let host = self.store.get_host(host_id).await?;
        if amount < self.payout_fee {
            return Err(AppError::validation(
                "amount",
                format!("Amount must cover the {} withdrawal fee", self.payout_fee),
            ));
        }
        let Some(bank) = host.bank_details else {
            return Err(ConflictError::MissingBankDetails.into());
        };
        let balance = self.store.balance_of(host_id).await?;
        if amount > balance {
            return Err(ConflictError::InsufficientBalance { balance }.into());
        }

        let payout = self
            .store
            .create_payout(NewPayout {
                host_id,
                event_id: None,
                amount,
                fee: self.payout_fee,
                bank,
            })
            .await?;

        let warnings = self
            .notify(
                &host.email,
                "payout_requested",
                json!({ "amount": amount, "net": payout.net_amount }),
            )
            .await;
        Ok(PayoutOutcome { payout, warnings })
    }

    /// `pending -> completed`. The store re-verifies the balance inside the
    /// same atomic scope as the transition. A proof-of-payment document, when
    /// supplied, is stored first so its reference lands in the approval entry.
    pub async fn approve_payout(
        &self,
        admin_id: Uuid,
        payout_id: Uuid,
        approved_amount: Decimal,
        proof_document: Option<Vec<u8>>,
    ) -> AppResult<PayoutOutcome> {
        if approved_amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "amount",
                "Approved amount must be positive",
            ));
        }
        let proof_key = format!("payouts/{payout_id}/proof");
        let proof_of_payment = match proof_document {
            Some(bytes) => Some(self.storage.put(&proof_key, bytes).await?),
            None => None,
        };
        let uploaded = proof_of_payment.is_some();
        let payout = match self
            .store
            .approve_payout(payout_id, approved_amount, proof_of_payment, admin_id)
            .await
        {
            Ok(payout) => payout,
            Err(err) => {
                // A refused approval must not strand the uploaded attachment.
                if uploaded {
                    if let Err(cleanup) = self.storage.delete(&proof_key).await {
                        warn!(key = %proof_key, error = %cleanup, "Failed to remove proof document after refused approval");
                    }
                }
                return Err(err);
            }
        };

        let host = self.store.get_host(payout.host_id).await?;
        let warnings = self
            .notify(
                &host.email,
                "payout_approved",
                json!({ "amount": approved_amount, "net": payout.net_amount }),
            )
            .await;
        Ok(PayoutOutcome { payout, warnings })
    }

    /// `pending -> rejected`; the ledger is unaffected.
    pub async fn reject_payout(
        &self,
        admin_id: Uuid,
        payout_id: Uuid,
        reason: String,
    ) -> AppResult<PayoutOutcome> {
        if reason.trim().is_empty() {
            return Err(AppError::validation(
                "reason",
                "A rejection reason is required",
            ));
        }
        let payout = self
            .store
            .reject_payout(payout_id, reason.clone(), admin_id)
            .await?;

        let host = self.store.get_host(payout.host_id).await?;
        let warnings = self
            .notify(&host.email, "payout_rejected", json!({ "reason": reason }))
            .await;
        Ok(PayoutOutcome { payout, warnings })
    }

    pub async fn list_payouts(&self, host_id: Option<Uuid>) -> AppResult<Vec<Payout>> {
        self.store.list_payouts(host_id).await
    }

    /// Platform-level revenue aggregate for a bounded window, applying the
    /// fee schedule per transaction.
    pub async fn revenue_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<RevenueSummary> {
        if to <= from {
            return Err(AppError::validation("to", "Window end must follow start"));
        }
        let transactions = self.store.transactions_between(from, to).await?;

        let mut gross = Decimal::ZERO;
        let mut processor_fees = Decimal::ZERO;
        let mut platform_fees = Decimal::ZERO;
        let mut counted = 0u64;
        let mut skipped = 0u64;
        for txn in &transactions {
            if txn.subtotal <= Decimal::ZERO {
                warn!(transaction = %txn.id, subtotal = %txn.subtotal, "Skipping malformed transaction amount");
                skipped += 1;
                continue;
            }
            let fees = compute_fees(txn.subtotal);
            gross += txn.subtotal;
            processor_fees += fees.processor_fee;
            platform_fees += fees.platform_fee;
            counted += 1;
        }
        Ok(RevenueSummary {
            from,
            to,
            gross,
            processor_fees,
            platform_fees,
            net: gross - processor_fees - platform_fees,
            transactions: counted,
            skipped,
        })
    }

    async fn notify(&self, recipient: &str, template: &str, data: serde_json::Value) -> Vec<String> {
        match self.notifier.send(recipient, template, data).await {
            Ok(()) => Vec::new(),
            Err(err) => {
                warn!(%recipient, %template, error = %err, "Notification failed");
                vec![format!("Notification to {recipient} was not sent")]
            }
        }
    }
}

fn validate_bank_details(draft: BankDetailsDraft) -> AppResult<BankDetails> {
    let mut errors = Vec::new();
    if draft.bank_name.trim().is_empty() {
        errors.push(FieldError::new("bankName", "Bank name is required"));
    }
    if draft.bank_code.trim().is_empty() {
        errors.push(FieldError::new("bankCode", "Bank code is required"));
    }
    if draft.account_name.trim().is_empty() {
        errors.push(FieldError::new("accountName", "Account name is required"));
    }
    if draft.account_number.len() != 10
        || !draft.account_number.chars().all(|c| c.is_ascii_digit())
    {
        errors.push(FieldError::new(
            "accountNumber",
            "Account number must be exactly 10 digits",
        ));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(BankDetails {
        bank_name: draft.bank_name,
        bank_code: draft.bank_code,
        account_number: draft.account_number,
        account_name: draft.account_name,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::external::{TracingNotifier, TracingStorage};
    use crate::models::{PayoutStatus, Ticket, TicketStatus, TierKind, TicketTier, Transaction, TransactionStatus};
    use crate::store::{MemoryStore, NewEvent, SaleRecord};

    struct FailingNotifier;

    /// Storage double that remembers which keys were deleted.
    #[derive(Default)]
    struct RecordingStorage {
        deleted: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStorage for RecordingStorage {
        async fn put(&self, key: &str, _bytes: Vec<u8>) -> AppResult<String> {
            Ok(format!("mem://{key}"))
        }

        async fn delete(&self, key: &str) -> AppResult<()> {
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(
            &self,
            _recipient: &str,
            _template: &str,
            _data: serde_json::Value,
        ) -> AppResult<()> {
            Err(AppError::Dependency("mail provider is down".to_string()))
        }
    }

    fn service(store: Arc<MemoryStore>) -> WalletService {
        WalletService::new(
            store,
            Arc::new(TracingNotifier),
            Arc::new(TracingStorage),
            Decimal::from(100),
        )
    }

    fn bank_draft() -> BankDetailsDraft {
        BankDetailsDraft {
            bank_name: "First Bank".to_string(),
            bank_code: "011".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "Ada".to_string(),
        }
    }

    /// Seeds a host with one event and `sold` tickets at 500 each.
    async fn seed(store: &MemoryStore, sold: u32) -> (Uuid, Uuid) {
        let host = store
            .create_host("Ada".to_string(), "ada@example.com".to_string())
            .await
            .unwrap();
        let event = store
            .create_event(NewEvent {
                host_id: host.id,
                title: "Launch Night".to_string(),
                description: None,
                venue: "Hall A".to_string(),
                starts_at: Utc::now(),
                ends_at: None,
            })
            .await
            .unwrap();
        if sold > 0 {
            sell(store, event.id, sold, "pay_seed", Decimal::from(500)).await;
        }
        (host.id, event.id)
    }

    async fn sell(store: &MemoryStore, event_id: Uuid, quantity: u32, reference: &str, price: Decimal) {
        let now = Utc::now();
        let tier_id = format!("tier-{reference}");
        store
            .insert_tier(TicketTier {
                event_id,
                tier_id: tier_id.clone(),
                name: tier_id.clone(),
                description: None,
                kind: TierKind::Individual,
                price,
                currency: "NGN".to_string(),
                group_size: None,
                purchase_limit: None,
                perks: Vec::new(),
                total_quantity: quantity as i32,
                remaining_quantity: quantity as i32,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        let token = store.reserve(event_id, &tier_id, quantity).await.unwrap();
        let buyer = store
            .upsert_buyer("Bola".to_string(), "bola@example.com".to_string())
            .await
            .unwrap();
        let txn_id = Uuid::new_v4();
        let subtotal = price * Decimal::from(quantity);
        let tickets = (0..quantity)
            .map(|_| {
                let id = Uuid::new_v4();
                Ticket {
                    id,
                    event_id,
                    tier_id: tier_id.clone(),
                    user_id: buyer.id,
                    transaction_id: txn_id,
                    code: format!("GP-{}", id.simple()),
                    price,
                    status: TicketStatus::Valid,
                    checked_in_at: None,
                    qr_code: None,
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect();
        store
            .record_sale(SaleRecord {
                reservations: vec![token],
                transaction: Transaction {
                    id: txn_id,
                    event_id,
                    payment_reference: reference.to_string(),
                    subtotal,
                    fees: Decimal::ZERO,
                    total: subtotal,
                    status: TransactionStatus::Completed,
                    created_at: now,
                },
                tickets,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn withdrawal_requires_bank_details_fee_cover_and_balance() {
        let store = Arc::new(MemoryStore::new());
        let (host_id, _) = seed(&store, 2).await; // balance 1000
        let svc = service(Arc::clone(&store));

        let err = svc
            .request_withdrawal(host_id, Decimal::from(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict(ConflictError::MissingBankDetails)
        ));

        svc.set_bank_details(host_id, bank_draft()).await.unwrap();

        let err = svc
            .request_withdrawal(host_id, Decimal::from(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = svc
            .request_withdrawal(host_id, Decimal::from(1500))
            .await
            .unwrap_err();
        match err {
            AppError::Conflict(ConflictError::InsufficientBalance { balance }) => {
                assert_eq!(balance, Decimal::from(1000));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let outcome = svc
            .request_withdrawal(host_id, Decimal::from(600))
            .await
            .unwrap();
        assert_eq!(outcome.payout.status, PayoutStatus::Pending);
        assert_eq!(outcome.payout.fee, Decimal::from(100));
        assert_eq!(outcome.payout.net_amount, Decimal::from(500));
        // Pending does not debit.
        assert_eq!(
            svc.wallet(host_id).await.unwrap().balance,
            Decimal::from(1000)
        );
    }

    #[tokio::test]
    async fn wallet_balance_is_gross_minus_completed_payouts() {
        let store = Arc::new(MemoryStore::new());
        let (host_id, _) = seed(&store, 4).await; // gross 2000
        let svc = service(Arc::clone(&store));
        svc.set_bank_details(host_id, bank_draft()).await.unwrap();

        let approved = svc
            .request_withdrawal(host_id, Decimal::from(700))
            .await
            .unwrap();
        let rejected = svc
            .request_withdrawal(host_id, Decimal::from(400))
            .await
            .unwrap();
        let pending = svc
            .request_withdrawal(host_id, Decimal::from(300))
            .await
            .unwrap();

        let admin = Uuid::new_v4();
        svc.approve_payout(admin, approved.payout.id, Decimal::from(700), None)
            .await
            .unwrap();
        svc.reject_payout(admin, rejected.payout.id, "Name mismatch".to_string())
            .await
            .unwrap();

        let wallet = svc.wallet(host_id).await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(1300));
        assert_eq!(wallet.events.len(), 1);
        assert_eq!(wallet.events[0].tickets_sold, 4);
        assert_eq!(wallet.events[0].gross, Decimal::from(2000));
        assert_eq!(wallet.payouts.len(), 3);
        let still_pending = wallet
            .payouts
            .iter()
            .find(|p| p.id == pending.payout.id)
            .unwrap();
        assert_eq!(still_pending.status, PayoutStatus::Pending);
    }

    #[tokio::test]
    async fn approval_records_proof_and_reviewer() {
        let store = Arc::new(MemoryStore::new());
        let (host_id, _) = seed(&store, 2).await;
        let svc = service(Arc::clone(&store));
        svc.set_bank_details(host_id, bank_draft()).await.unwrap();
        let requested = svc
            .request_withdrawal(host_id, Decimal::from(600))
            .await
            .unwrap();

        let admin = Uuid::new_v4();
        let outcome = svc
            .approve_payout(
                admin,
                requested.payout.id,
                Decimal::from(600),
                Some(b"receipt".to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(outcome.payout.status, PayoutStatus::Completed);
        assert_eq!(outcome.payout.reviewed_by, Some(admin));
        assert_eq!(
            outcome.payout.proof_of_payment.as_deref(),
            Some(format!("mem://payouts/{}/proof", requested.payout.id).as_str())
        );

        let err = svc
            .approve_payout(admin, requested.payout.id, Decimal::from(600), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict(ConflictError::AlreadyProcessed { .. })
        ));
    }

    #[tokio::test]
    async fn refused_approval_removes_the_uploaded_proof() {
        let store = Arc::new(MemoryStore::new());
        let (host_id, _) = seed(&store, 2).await;
        let storage = Arc::new(RecordingStorage::default());
        let svc = WalletService::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(TracingNotifier),
            Arc::clone(&storage) as Arc<dyn ObjectStorage>,
            Decimal::from(100),
        );
        svc.set_bank_details(host_id, bank_draft()).await.unwrap();
        let requested = svc
            .request_withdrawal(host_id, Decimal::from(600))
            .await
            .unwrap();

        let admin = Uuid::new_v4();
        svc.approve_payout(admin, requested.payout.id, Decimal::from(600), None)
            .await
            .unwrap();

        // The retry uploads its proof, is refused, and cleans the upload up.
        let err = svc
            .approve_payout(
                admin,
                requested.payout.id,
                Decimal::from(600),
                Some(b"receipt".to_vec()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict(ConflictError::AlreadyProcessed { .. })
        ));
        let deleted = storage.deleted.lock().unwrap();
        assert_eq!(
            *deleted,
            vec![format!("payouts/{}/proof", requested.payout.id)]
        );
    }

    #[tokio::test]
    async fn rejection_requires_a_reason_and_leaves_balance_alone() {
        let store = Arc::new(MemoryStore::new());
        let (host_id, _) = seed(&store, 2).await;
        let svc = service(Arc::clone(&store));
        svc.set_bank_details(host_id, bank_draft()).await.unwrap();
        let requested = svc
            .request_withdrawal(host_id, Decimal::from(600))
            .await
            .unwrap();

        let admin = Uuid::new_v4();
        let err = svc
            .reject_payout(admin, requested.payout.id, "  ".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        svc.reject_payout(admin, requested.payout.id, "Flagged account".to_string())
            .await
            .unwrap();
        assert_eq!(
            svc.wallet(host_id).await.unwrap().balance,
            Decimal::from(1000)
        );
    }

    #[tokio::test]
    async fn notification_failure_is_a_warning_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let (host_id, _) = seed(&store, 2).await;
        let svc = WalletService::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(FailingNotifier),
            Arc::new(TracingStorage),
            Decimal::from(100),
        );
        svc.set_bank_details(host_id, bank_draft()).await.unwrap();

        let outcome = svc
            .request_withdrawal(host_id, Decimal::from(600))
            .await
            .unwrap();
        assert_eq!(outcome.payout.status, PayoutStatus::Pending);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn bank_details_validation() {
        let store = Arc::new(MemoryStore::new());
        let (host_id, _) = seed(&store, 0).await;
        let svc = service(Arc::clone(&store));

        let mut bad = bank_draft();
        bad.account_number = "12345".to_string();
        bad.bank_name = String::new();
        let err = svc.set_bank_details(host_id, bad).await.unwrap_err();
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 2);
    }

    #[tokio::test]
    async fn revenue_summary_applies_the_schedule_and_skips_malformed_rows() {
        let store = Arc::new(MemoryStore::new());
        let (_, event_id) = seed(&store, 0).await;
        let svc = service(Arc::clone(&store));

        let window_start = Utc::now() - chrono::Duration::hours(1);
        sell(&store, event_id, 1, "pay_a", Decimal::from(2000)).await; // 30 + 40
        sell(&store, event_id, 1, "pay_b", Decimal::from(200_000)).await; // 2000 + 2000
        // A malformed legacy row with a non-positive amount.
        store
            .record_sale(SaleRecord {
                reservations: Vec::new(),
                transaction: Transaction {
                    id: Uuid::new_v4(),
                    event_id,
                    payment_reference: "pay_bad".to_string(),
                    subtotal: Decimal::from(-50),
                    fees: Decimal::ZERO,
                    total: Decimal::from(-50),
                    status: TransactionStatus::Completed,
                    created_at: Utc::now(),
                },
                tickets: Vec::new(),
            })
            .await
            .unwrap();

        let summary = svc
            .revenue_summary(window_start, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.gross, Decimal::from(202_000));
        assert_eq!(summary.processor_fees, Decimal::from(2030));
        assert_eq!(summary.platform_fees, Decimal::from(2040));
        assert_eq!(summary.net, Decimal::from(197_930));

        let err = svc
            .revenue_summary(Utc::now(), Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
