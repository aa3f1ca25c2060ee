//! Storage traits for credit ledger data.
//!
//! Implement these traits to persist organizations and payment transactions
//! to your database. In-memory implementations are provided for testing.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An organization owning an SMS credit balance.
///
/// The balance is mutated only through [`OrganizationStore`] operations;
/// nothing else in the crate writes it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Opaque tenant id.
    pub id: String,
    /// Current credit balance in billing units.
    pub sms_balance: u64,
    /// Lifetime units purchased, reporting only.
    pub total_purchased: u64,
    /// Lifetime units spent, reporting only.
    pub total_spent: u64,
    /// Approved sender id shown by the SMS gateway (max 11 characters).
    pub sender_id: Option<String>,
}

impl Organization {
    /// Create a new organization with a zero balance, as at signup.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sms_balance: 0,
            total_purchased: 0,
            total_spent: 0,
            sender_id: None,
        }
    }

    /// Set the approved sender id.
    #[must_use]
    pub fn with_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }
}

/// Status of a recorded payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Payment verified and credited.
    Success,
    /// Payment observed but not credited.
    Failed,
    /// Checkout started, never completed.
    Abandoned,
}

impl TransactionStatus {
    /// Parse from a payment gateway status string.
    #[must_use]
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "success" => Self::Success,
            "abandoned" => Self::Abandoned,
            _ => Self::Failed,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An append-only payment record.
///
/// The unique `reference` doubles as the idempotency key: a reference already
/// present in the store marks the payment as reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Owning organization.
    pub organization_id: String,
    /// Unique payment reference from the payment gateway.
    pub reference: String,
    /// Credit bundle purchased.
    pub bundle_id: String,
    /// Amount paid in minor currency units.
    pub amount_minor: u64,
    /// Units granted by the bundle.
    pub units: u64,
    /// Final status.
    pub status: TransactionStatus,
    /// When the record was written.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for persisting organization records.
///
/// The two mutation methods are the crate's per-organization serialization
/// points. Implementations must make them atomic: a conditional update such
/// as `UPDATE orgs SET balance = balance - $n WHERE id = $1 AND balance >= $n
/// RETURNING balance` for [`Self::debit_if_sufficient`], or an equivalent
/// compare-and-swap in non-relational stores. A read-then-write in
/// application code is not an acceptable implementation.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Fetch an organization by id.
    async fn find(&self, organization_id: &str) -> Result<Option<Organization>>;

    /// Create or replace an organization record (signup/settings path).
    async fn save(&self, organization: &Organization) -> Result<()>;

    /// Atomically decrement the balance by `units` only if it covers them.
    ///
    /// Returns the new balance on success, `None` when the balance is
    /// insufficient. Also bumps `total_spent` on success.
    async fn debit_if_sufficient(
        &self,
        organization_id: &str,
        units: u64,
    ) -> Result<Option<u64>>;

    /// Atomically insert `record` and increment the balance by `record.units`,
    /// as one storage transaction.
    ///
    /// The contract is **insert-or-detect-duplicate by reference**: the record
    /// insert must rely on the backend's native uniqueness mechanism (unique
    /// index on `reference`, conditional put), and the record write and the
    /// balance update must commit or fail together, e.g.
    /// `BEGIN; INSERT INTO transactions ...; UPDATE orgs SET balance =
    /// balance + $n WHERE id = $1 RETURNING balance; COMMIT`. A partial state
    /// where the record exists but the balance was never credited (or vice
    /// versa) must be impossible.
    ///
    /// Returns the new balance, or `None` when the reference already exists
    /// (the balance is left unchanged). Also bumps `total_purchased` when the
    /// credit applies.
    async fn credit_and_record(&self, record: &TransactionRecord) -> Result<Option<u64>>;
}

/// Read-side trait for recorded payment transactions.
///
/// Records are only ever written through
/// [`OrganizationStore::credit_and_record`]; this trait serves replay
/// detection and reporting.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Look up a transaction by its payment reference.
    async fn find_by_reference(&self, reference: &str) -> Result<Option<TransactionRecord>>;

    /// List transactions for an organization, newest first.
    async fn list_for_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<TransactionRecord>>;
}

/// In-memory stores for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory organization store.
    ///
    /// Wraps data in Arc for cheap cloning. Mutations run under locks, so the
    /// conditional debit and the credit-plus-record write are atomic as the
    /// trait requires. Owns the transaction records too, since
    /// [`OrganizationStore::credit_and_record`] writes both tables; the
    /// matching [`InMemoryTransactionStore`] is obtained from
    /// [`Self::transaction_store`] and shares the same records.
    #[derive(Default, Clone)]
    pub struct InMemoryOrganizationStore {
        orgs: Arc<Mutex<HashMap<String, Organization>>>,
        records: Arc<Mutex<HashMap<String, TransactionRecord>>>,
    }

    impl InMemoryOrganizationStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A transaction store reading the records this store writes.
        #[must_use]
        pub fn transaction_store(&self) -> InMemoryTransactionStore {
            InMemoryTransactionStore {
                records: Arc::clone(&self.records),
            }
        }

        /// Seed an organization (for testing).
        pub fn seed(&self, organization: Organization) {
            self.orgs
                .lock()
                .unwrap()
                .insert(organization.id.clone(), organization);
        }

        /// Snapshot an organization (for testing).
        pub fn get(&self, organization_id: &str) -> Option<Organization> {
            self.orgs.lock().unwrap().get(organization_id).cloned()
        }
    }

    #[async_trait]
    impl OrganizationStore for InMemoryOrganizationStore {
        async fn find(&self, organization_id: &str) -> Result<Option<Organization>> {
            Ok(self.orgs.lock().unwrap().get(organization_id).cloned())
        }

        async fn save(&self, organization: &Organization) -> Result<()> {
            self.orgs
                .lock()
                .unwrap()
                .insert(organization.id.clone(), organization.clone());
            Ok(())
        }

        async fn debit_if_sufficient(
            &self,
            organization_id: &str,
            units: u64,
        ) -> Result<Option<u64>> {
            let mut orgs = self.orgs.lock().unwrap();
            let org = orgs.get_mut(organization_id).ok_or_else(|| {
                crate::error::TextLedgerError::NotFound(format!(
                    "organization '{}'",
                    organization_id
                ))
            })?;

            if org.sms_balance < units {
                return Ok(None);
            }

            org.sms_balance -= units;
            org.total_spent += units;
            Ok(Some(org.sms_balance))
        }

        async fn credit_and_record(&self, record: &TransactionRecord) -> Result<Option<u64>> {
            // Both locks held for the whole operation stands in for the DB
            // transaction the contract requires.
            let mut records = self.records.lock().unwrap();
            let mut orgs = self.orgs.lock().unwrap();

            if records.contains_key(&record.reference) {
                return Ok(None);
            }
            let org = orgs.get_mut(&record.organization_id).ok_or_else(|| {
                crate::error::TextLedgerError::NotFound(format!(
                    "organization '{}'",
                    record.organization_id
                ))
            })?;

            records.insert(record.reference.clone(), record.clone());
            org.sms_balance += record.units;
            org.total_purchased += record.units;
            Ok(Some(org.sms_balance))
        }
    }

    /// In-memory transaction store over the records written by an
    /// [`InMemoryOrganizationStore`].
    #[derive(Clone)]
    pub struct InMemoryTransactionStore {
        records: Arc<Mutex<HashMap<String, TransactionRecord>>>,
    }

    impl InMemoryTransactionStore {
        /// All stored records (for testing).
        pub fn all(&self) -> Vec<TransactionRecord> {
            self.records.lock().unwrap().values().cloned().collect()
        }
    }

    #[async_trait]
    impl TransactionStore for InMemoryTransactionStore {
        async fn find_by_reference(
            &self,
            reference: &str,
        ) -> Result<Option<TransactionRecord>> {
            Ok(self.records.lock().unwrap().get(reference).cloned())
        }

        async fn list_for_organization(
            &self,
            organization_id: &str,
        ) -> Result<Vec<TransactionRecord>> {
            let mut out: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.organization_id == organization_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::InMemoryOrganizationStore;
    use super::*;

    #[test]
    fn test_transaction_status_from_gateway() {
        assert_eq!(
            TransactionStatus::from_gateway("success"),
            TransactionStatus::Success
        );
        assert_eq!(
            TransactionStatus::from_gateway("abandoned"),
            TransactionStatus::Abandoned
        );
        assert_eq!(
            TransactionStatus::from_gateway("failed"),
            TransactionStatus::Failed
        );
        assert_eq!(
            TransactionStatus::from_gateway("pending"),
            TransactionStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_debit_if_sufficient() {
        let store = InMemoryOrganizationStore::new();
        let mut org = Organization::new("org_1");
        org.sms_balance = 5;
        store.seed(org);

        assert_eq!(store.debit_if_sufficient("org_1", 3).await.unwrap(), Some(2));
        assert_eq!(store.debit_if_sufficient("org_1", 3).await.unwrap(), None);
        assert_eq!(store.debit_if_sufficient("org_1", 2).await.unwrap(), Some(0));

        let org = store.get("org_1").unwrap();
        assert_eq!(org.sms_balance, 0);
        assert_eq!(org.total_spent, 5);
    }

    #[tokio::test]
    async fn test_debit_unknown_organization_is_fatal() {
        let store = InMemoryOrganizationStore::new();
        assert!(store.debit_if_sufficient("missing", 1).await.is_err());
    }

    fn record(reference: &str) -> TransactionRecord {
        TransactionRecord {
            organization_id: "org_1".to_string(),
            reference: reference.to_string(),
            bundle_id: "starter".to_string(),
            amount_minor: 1000,
            units: 50,
            status: TransactionStatus::Success,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_credit_and_record_detects_duplicate_reference() {
        let store = InMemoryOrganizationStore::new();
        store.seed(Organization::new("org_1"));
        let transactions = store.transaction_store();

        assert_eq!(
            store.credit_and_record(&record("ref-123")).await.unwrap(),
            Some(50)
        );
        assert_eq!(store.credit_and_record(&record("ref-123")).await.unwrap(), None);

        assert_eq!(transactions.all().len(), 1);
        let org = store.get("org_1").unwrap();
        assert_eq!(org.sms_balance, 50);
        assert_eq!(org.total_purchased, 50);
    }

    #[tokio::test]
    async fn test_credit_and_record_is_all_or_nothing() {
        // Unknown organization: the credit errors and the record must not
        // land either, so a corrected retry can still succeed.
        let store = InMemoryOrganizationStore::new();
        let transactions = store.transaction_store();

        assert!(store.credit_and_record(&record("ref-123")).await.is_err());
        assert!(transactions.all().is_empty());

        store.seed(Organization::new("org_1"));
        assert_eq!(
            store.credit_and_record(&record("ref-123")).await.unwrap(),
            Some(50)
        );
    }
}
