//! Voucher ledger: the accounting facade over the store.
//!
//! Owns every voucher-balance rule. Callers never touch voucher documents
//! directly; the conditional writes (settlement inflation guard, raise-only
//! staff edits) are enforced by the store primitives the ledger calls, so a
//! buggy caller cannot mint call time.

use crate::errors::BoothError;
use crate::models::{AuditLogEntry, Voucher, VoucherPackage};
use crate::observability::metrics;
use crate::store::{BoothStore, SettleOutcome};
use chrono::{DateTime, Utc};
use common::types::VoucherCode;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What `validate` tells the orchestrator about a redeemable voucher.
#[derive(Debug, Clone)]
pub struct VoucherQuote {
    /// Seconds of call time a new session would be seeded with.
    pub remaining_duration: u32,
    pub price: u32,
    pub expires_at: DateTime<Utc>,
}

/// Voucher ledger operations.
#[derive(Clone)]
pub struct VoucherLedger {
    store: Arc<dyn BoothStore>,
    /// Redemption window for freshly created vouchers, in days.
    voucher_ttl_days: i64,
}

impl VoucherLedger {
    #[must_use]
    pub fn new(store: Arc<dyn BoothStore>, voucher_ttl_days: i64) -> Self {
        Self {
            store,
            voucher_ttl_days,
        }
    }

    /// Check that a voucher can start a session right now.
    ///
    /// # Errors
    ///
    /// - `VoucherNotFound` - no record under this code
    /// - `VoucherExpired` - past the redemption deadline
    /// - `VoucherDepleted` - used with nothing left; a never-used voucher
    ///   with a full balance passes even if the `used` flag elsewhere is stale
    #[instrument(skip_all, fields(code = %code))]
    pub async fn validate(&self, code: &VoucherCode) -> Result<VoucherQuote, BoothError> {
        let voucher = self
            .store
            .get_voucher(code)
            .await?
            .ok_or_else(|| BoothError::VoucherNotFound(code.to_string()))?;

        let now = Utc::now();
        if voucher.is_expired(now) {
            return Err(BoothError::VoucherExpired(code.to_string()));
        }
        if voucher.is_depleted() {
            return Err(BoothError::VoucherDepleted(code.to_string()));
        }
        if voucher.remaining_duration == 0 {
            // Unused but zeroed (staff edit artifact): nothing to seed.
            return Err(BoothError::VoucherDepleted(code.to_string()));
        }

        Ok(VoucherQuote {
            remaining_duration: voucher.remaining_duration,
            price: voucher.price,
            expires_at: voucher.expires_at,
        })
    }

    /// Mark the voucher used at session start. Sticky and idempotent.
    #[instrument(skip_all, fields(code = %code))]
    pub async fn debit_on_start(&self, code: &VoucherCode) -> Result<(), BoothError> {
        let found = self.store.mark_voucher_used(code).await?;
        if !found {
            // The voucher was validated moments ago; deletion in between is
            // a staff action racing a booth. The session proceeds, there is
            // just no balance left to settle into.
            warn!(
                target: "booth.ledger",
                code = %code,
                "Voucher disappeared between validation and debit"
            );
        }
        Ok(())
    }

    /// Write the post-session balance. Called exactly once per termination.
    ///
    /// # Errors
    ///
    /// `InvalidAdjustment` if the supplied value would raise the balance
    /// (stale or hostile client); `VoucherNotFound` if the record is gone.
    #[instrument(skip_all, fields(code = %code, remaining = remaining))]
    pub async fn settle(&self, code: &VoucherCode, remaining: u32) -> Result<(), BoothError> {
        match self.store.settle_voucher(code, remaining).await? {
            SettleOutcome::Settled(voucher) => {
                info!(
                    target: "booth.ledger",
                    code = %code,
                    remaining = voucher.remaining_duration,
                    "Voucher settled"
                );
                Ok(())
            }
            SettleOutcome::WouldInflate { current, requested } => {
                warn!(
                    target: "booth.ledger",
                    code = %code,
                    current = current,
                    requested = requested,
                    "Settlement rejected: would inflate balance"
                );
                Err(BoothError::InvalidAdjustment(
                    "settlement cannot raise a voucher balance".to_string(),
                ))
            }
            SettleOutcome::NotFound => Err(BoothError::VoucherNotFound(code.to_string())),
        }
    }

    /// Staff edit: new total duration and price.
    ///
    /// The balance is raised to `max(current, new_total)`, never lowered.
    ///
    /// # Errors
    ///
    /// `InvalidAdjustment` for a zero duration; `VoucherNotFound` if no
    /// record exists.
    #[instrument(skip_all, fields(code = %code))]
    pub async fn adjust(
        &self,
        code: &VoucherCode,
        new_total: u32,
        new_price: u32,
        user_id: &str,
    ) -> Result<Voucher, BoothError> {
        if new_total == 0 {
            return Err(BoothError::InvalidAdjustment(
                "duration must be positive".to_string(),
            ));
        }

        let voucher = self
            .store
            .adjust_voucher(code, new_total, new_price)
            .await?
            .ok_or_else(|| BoothError::VoucherNotFound(code.to_string()))?;

        self.audit(user_id, &format!("Adjusted voucher {code}")).await;
        Ok(voucher)
    }

    /// Create a voucher from a package (admin surface).
    #[instrument(skip_all, fields(package = ?package))]
    pub async fn create(
        &self,
        package: VoucherPackage,
        user_id: &str,
    ) -> Result<Voucher, BoothError> {
        let voucher = Voucher::from_package(package, Utc::now(), self.voucher_ttl_days);
        self.store.put_voucher(&voucher).await?;
        metrics::record_voucher_created();

        info!(
            target: "booth.ledger",
            code = %voucher.code,
            total_duration = voucher.total_duration,
            "Voucher created"
        );
        self.audit(user_id, &format!("Created voucher {}", voucher.code))
            .await;
        Ok(voucher)
    }

    /// Delete a voucher (admin surface). Idempotent ack.
    #[instrument(skip_all, fields(code = %code))]
    pub async fn delete(&self, code: &VoucherCode, user_id: &str) -> Result<(), BoothError> {
        let existed = self.store.delete_voucher(code).await?;
        if existed {
            self.audit(user_id, &format!("Deleted voucher {code}")).await;
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Voucher>, BoothError> {
        self.store.list_vouchers().await
    }

    /// Append an audit entry. Fire-and-forget: failures are logged at warn
    /// level but never block the operation that produced them.
    pub async fn audit(&self, user_id: &str, action: &str) {
        let entry = AuditLogEntry {
            user_id: user_id.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.store.append_log(&entry).await {
            warn!(
                target: "booth.ledger",
                error = %e,
                action = %action,
                "Audit log write failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use chrono::Duration;

    fn ledger_with_store() -> (VoucherLedger, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = VoucherLedger::new(store.clone(), 14);
        (ledger, store)
    }

    #[tokio::test]
    async fn test_validate_unknown_code() {
        let (ledger, _store) = ledger_with_store();
        let err = ledger
            .validate(&VoucherCode::normalized("NOPE123"))
            .await
            .unwrap_err();
        assert!(matches!(err, BoothError::VoucherNotFound(_)));
    }

    #[tokio::test]
    async fn test_validate_expired() {
        let (ledger, store) = ledger_with_store();
        let mut v = Voucher::from_package(VoucherPackage::Min15, Utc::now(), 14);
        v.expires_at = Utc::now() - Duration::hours(1);
        store.put_voucher(&v).await.unwrap();

        let err = ledger.validate(&v.code).await.unwrap_err();
        assert!(matches!(err, BoothError::VoucherExpired(_)));
    }

    #[tokio::test]
    async fn test_validate_depleted_requires_use() {
        let (ledger, store) = ledger_with_store();

        // Used and empty: depleted.
        let mut used_up = Voucher::from_package(VoucherPackage::Min5, Utc::now(), 14);
        used_up.used = true;
        used_up.remaining_duration = 0;
        store.put_voucher(&used_up).await.unwrap();
        let err = ledger.validate(&used_up.code).await.unwrap_err();
        assert!(matches!(err, BoothError::VoucherDepleted(_)));

        // Used but with balance left: still valid.
        let mut partial = Voucher::from_package(VoucherPackage::Min15, Utc::now(), 14);
        partial.used = true;
        partial.remaining_duration = 300;
        store.put_voucher(&partial).await.unwrap();
        let quote = ledger.validate(&partial.code).await.unwrap();
        assert_eq!(quote.remaining_duration, 300);
    }

    #[tokio::test]
    async fn test_validate_quote_fields() {
        let (ledger, store) = ledger_with_store();
        let v = Voucher::from_package(VoucherPackage::Min30, Utc::now(), 14);
        store.put_voucher(&v).await.unwrap();

        let quote = ledger.validate(&v.code).await.unwrap();
        assert_eq!(quote.remaining_duration, 1800);
        assert_eq!(quote.price, 10_000);
        assert_eq!(quote.expires_at, v.expires_at);
    }

    #[tokio::test]
    async fn test_settle_rejects_inflation() {
        let (ledger, store) = ledger_with_store();
        let v = Voucher::from_package(VoucherPackage::Min15, Utc::now(), 14);
        store.put_voucher(&v).await.unwrap();

        let err = ledger.settle(&v.code, 1200).await.unwrap_err();
        assert!(matches!(err, BoothError::InvalidAdjustment(_)));

        ledger.settle(&v.code, 300).await.unwrap();
        let settled = store.get_voucher(&v.code).await.unwrap().unwrap();
        assert_eq!(settled.remaining_duration, 300);
    }

    #[tokio::test]
    async fn test_adjust_validation_and_raise_only() {
        let (ledger, store) = ledger_with_store();
        let mut v = Voucher::from_package(VoucherPackage::Min15, Utc::now(), 14);
        v.remaining_duration = 600;
        store.put_voucher(&v).await.unwrap();

        let err = ledger.adjust(&v.code, 0, 1000, "staff-1").await.unwrap_err();
        assert!(matches!(err, BoothError::InvalidAdjustment(_)));

        let adjusted = ledger.adjust(&v.code, 1800, 9000, "staff-1").await.unwrap();
        assert_eq!(adjusted.total_duration, 1800);
        assert_eq!(adjusted.remaining_duration, 1800);

        // Lowering the total never lowers the balance.
        let lowered = ledger.adjust(&v.code, 300, 2000, "staff-1").await.unwrap();
        assert_eq!(lowered.remaining_duration, 1800);
    }

    #[tokio::test]
    async fn test_create_and_delete_roundtrip() {
        let (ledger, store) = ledger_with_store();

        let created = ledger.create(VoucherPackage::Min60, "admin-1").await.unwrap();
        assert_eq!(created.total_duration, 3600);
        assert!(store.get_voucher(&created.code).await.unwrap().is_some());

        ledger.delete(&created.code, "admin-1").await.unwrap();
        assert!(store.get_voucher(&created.code).await.unwrap().is_none());

        // Deleting again is an idempotent ack.
        ledger.delete(&created.code, "admin-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_debit_is_idempotent() {
        let (ledger, store) = ledger_with_store();
        let v = Voucher::from_package(VoucherPackage::Min5, Utc::now(), 14);
        store.put_voucher(&v).await.unwrap();

        ledger.debit_on_start(&v.code).await.unwrap();
        ledger.debit_on_start(&v.code).await.unwrap();
        assert!(store.get_voucher(&v.code).await.unwrap().unwrap().used);
    }
}
