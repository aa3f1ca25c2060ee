//! Credit ledger for SMS billing units.
//!
//! Owns an organization's balance: sufficiency checks, debits on confirmed
//! sends, and idempotent credits on verified payments. The balance can only
//! grow through [`CreditLedger::credit`] and only shrink through
//! [`CreditLedger::debit`], and no operation may take it negative.
//!
//! # Example
//!
//! ```rust,ignore
//! use textledger::ledger::CreditLedger;
//!
//! let ledger = CreditLedger::new(org_store, txn_store);
//!
//! if ledger.has_sufficient("org_1", units).await? {
//!     // gateway call happens here, then:
//!     let new_balance = ledger.debit("org_1", units).await?;
//! }
//! ```

pub mod storage;

pub use storage::{
    Organization, OrganizationStore, TransactionRecord, TransactionStatus, TransactionStore,
};

#[cfg(any(test, feature = "test-support"))]
pub use storage::test::{InMemoryOrganizationStore, InMemoryTransactionStore};

use crate::error::{Result, SmsError};

/// Outcome of a credit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditOutcome {
    /// Whether the credit was applied (false on duplicate reference).
    pub applied: bool,
    /// Balance after the operation (unchanged when not applied).
    pub new_balance: u64,
}

/// Manager for an organization's credit balance.
///
/// Generic over the organization and transaction stores so the embedding
/// application chooses persistence. The debit path delegates the
/// balance-sufficiency race to the store's conditional update; the credit
/// path delegates replay protection to the store's combined
/// record-and-credit write.
pub struct CreditLedger<O, T> {
    orgs: O,
    transactions: T,
}

impl<O: OrganizationStore, T: TransactionStore> CreditLedger<O, T> {
    /// Create a new ledger over the given stores.
    #[must_use]
    pub fn new(orgs: O, transactions: T) -> Self {
        Self { orgs, transactions }
    }

    /// Current balance for an organization, 0 when unknown.
    pub async fn balance(&self, organization_id: &str) -> Result<u64> {
        Ok(self
            .orgs
            .find(organization_id)
            .await?
            .map(|o| o.sms_balance)
            .unwrap_or(0))
    }

    /// Whether the balance covers `units`.
    pub async fn has_sufficient(&self, organization_id: &str, units: u64) -> Result<bool> {
        Ok(self.balance(organization_id).await? >= units)
    }

    /// Debit `units` from the balance, returning the new balance.
    ///
    /// The decrement is a conditional update in the store, so two concurrent
    /// debits can never race the balance negative: one of them observes the
    /// reduced balance and fails.
    ///
    /// # Errors
    ///
    /// `SmsError::InsufficientBalance` with required/available/shortfall when
    /// the balance does not cover the debit.
    pub async fn debit(&self, organization_id: &str, units: u64) -> Result<u64> {
        match self.orgs.debit_if_sufficient(organization_id, units).await? {
            Some(new_balance) => {
                tracing::debug!(
                    target: "textledger::ledger",
                    organization_id,
                    units,
                    new_balance,
                    "debited balance"
                );
                Ok(new_balance)
            }
            None => {
                let available = self.balance(organization_id).await?;
                Err(SmsError::InsufficientBalance {
                    required: units,
                    available,
                    shortfall: units.saturating_sub(available),
                }
                .into())
            }
        }
    }

    /// Credit `record.units` to `record.organization_id`'s balance, keyed by
    /// the transaction's reference.
    ///
    /// The store writes the record and the credit as one transaction and is
    /// the sole idempotency arbiter: if the reference was already recorded
    /// the credit is a no-op and the current balance is returned with
    /// `applied = false`. Two concurrent credits for one reference resolve
    /// through the store's uniqueness constraint, so at most one applies.
    /// A store failure leaves no record behind, so the caller can retry.
    pub async fn credit(&self, record: TransactionRecord) -> Result<CreditOutcome> {
        let organization_id = record.organization_id.clone();
        let reference = record.reference.clone();
        let units = record.units;

        match self.orgs.credit_and_record(&record).await? {
            Some(new_balance) => {
                tracing::info!(
                    target: "textledger::ledger",
                    organization_id = %organization_id,
                    reference = %reference,
                    units,
                    new_balance,
                    "credited balance"
                );
                Ok(CreditOutcome {
                    applied: true,
                    new_balance,
                })
            }
            None => {
                let balance = self.balance(&organization_id).await?;
                tracing::info!(
                    target: "textledger::ledger",
                    organization_id = %organization_id,
                    reference = %reference,
                    "duplicate credit reference, balance unchanged"
                );
                Ok(CreditOutcome {
                    applied: false,
                    new_balance: balance,
                })
            }
        }
    }

    /// Access the underlying organization store.
    pub fn organizations(&self) -> &O {
        &self.orgs
    }

    /// Access the underlying transaction store.
    pub fn transactions(&self) -> &T {
        &self.transactions
    }
}
