//! Payment reconciliation: converting verified payments into ledger credits,
//! exactly once per payment reference.
//!
//! A payment reference moves through `initiated -> verified -> reconciled`.
//! Reconciliation may be triggered twice for one payment (redirect callback
//! plus webhook); the store's atomic record-and-credit write guarantees only
//! one trigger credits the ledger.

pub mod bundles;
pub mod gateway;

pub use bundles::{BundleCatalog, BundleCatalogBuilder, CreditBundle};
pub use gateway::{
    CheckoutIntent, InvalidSecretKeyError, LivePaymentGateway, PaymentGatewayClient,
    PaymentGatewayConfig, PaymentVerification,
};

#[cfg(any(test, feature = "test-support"))]
pub use gateway::test::MockPaymentGateway;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmsError};
use crate::ledger::{
    CreditLedger, OrganizationStore, TransactionRecord, TransactionStatus, TransactionStore,
};

/// Outcome of reconciling one payment reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Whether this call applied a credit.
    pub credited: bool,
    /// Units credited by this call (0 on replay).
    pub units_credited: u64,
    /// Balance after the operation.
    pub new_balance: u64,
    /// True when the reference had already been reconciled.
    pub already_processed: bool,
}

/// Reconciles completed payments into ledger credits.
pub struct PaymentReconciler<P, O, T> {
    payment_gateway: P,
    ledger: CreditLedger<O, T>,
    catalog: BundleCatalog,
}

impl<P, O, T> PaymentReconciler<P, O, T>
where
    P: PaymentGatewayClient,
    O: OrganizationStore,
    T: TransactionStore,
{
    /// Create a reconciler over the given gateway, ledger, and catalog.
    #[must_use]
    pub fn new(payment_gateway: P, ledger: CreditLedger<O, T>, catalog: BundleCatalog) -> Self {
        Self {
            payment_gateway,
            ledger,
            catalog,
        }
    }

    /// Start a checkout for a bundle purchase.
    ///
    /// Embeds the bundle and organization ids in the gateway metadata so
    /// [`Self::reconcile`] can resolve them from the reference alone.
    ///
    /// # Errors
    ///
    /// `SmsError::UnknownBundle` when `bundle_id` is not in the catalog.
    pub async fn initialize_purchase(
        &self,
        organization_id: &str,
        email: &str,
        bundle_id: &str,
    ) -> Result<CheckoutIntent> {
        let bundle = self.catalog.get(bundle_id).ok_or_else(|| SmsError::UnknownBundle {
            bundle_id: bundle_id.to_string(),
        })?;

        let metadata = serde_json::json!({
            "bundle_id": bundle.id,
            "organization_id": organization_id,
        });

        let intent = self
            .payment_gateway
            .initialize_transaction(email, bundle.price_minor, metadata)
            .await?;

        tracing::info!(
            target: "textledger::payments",
            organization_id,
            bundle_id = %bundle.id,
            reference = %intent.reference,
            "checkout initialized"
        );

        Ok(intent)
    }

    /// Reconcile a payment reference into a ledger credit, exactly once.
    ///
    /// Verifies the payment with the gateway, resolves the bundle from the
    /// payment metadata against the catalog (the paid amount is never
    /// trusted for the unit grant), and credits through the ledger, whose
    /// combined record-and-credit write is the atomic arbiter against a
    /// concurrent reconciliation of the same reference.
    ///
    /// # Errors
    ///
    /// `SmsError::VerificationFailed` when the gateway reports non-success;
    /// `SmsError::UnknownBundle` when the metadata names no catalog bundle.
    /// Neither touches the ledger.
    pub async fn reconcile(&self, reference: &str) -> Result<ReconcileOutcome> {
        let verification = self.payment_gateway.verify_transaction(reference).await?;

        if !verification.is_success() {
            return Err(SmsError::VerificationFailed {
                reference: reference.to_string(),
                status: verification.status,
            }
            .into());
        }

        // Fast path for replays; the credit below remains the arbiter for
        // two reconciliations racing past this check.
        if let Some(existing) = self
            .ledger
            .transactions()
            .find_by_reference(reference)
            .await?
        {
            let balance = self.ledger.balance(&existing.organization_id).await?;
            tracing::info!(
                target: "textledger::payments",
                reference,
                organization_id = %existing.organization_id,
                "payment already reconciled"
            );
            return Ok(ReconcileOutcome {
                credited: false,
                units_credited: 0,
                new_balance: balance,
                already_processed: true,
            });
        }

        let bundle_id = verification
            .metadata
            .get("bundle_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SmsError::UnknownBundle {
                bundle_id: "<missing>".to_string(),
            })?;
        let bundle = self.catalog.get(bundle_id).ok_or_else(|| SmsError::UnknownBundle {
            bundle_id: bundle_id.to_string(),
        })?;

        let organization_id = verification
            .metadata
            .get("organization_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SmsError::Internal {
                message: format!("payment '{}' metadata missing organization id", reference),
            })?
            .to_string();

        if verification.amount_minor != bundle.price_minor {
            tracing::warn!(
                target: "textledger::payments",
                reference,
                bundle_id = %bundle.id,
                paid = verification.amount_minor,
                listed = bundle.price_minor,
                "paid amount differs from catalog price, crediting catalog units"
            );
        }

        let record = TransactionRecord {
            organization_id,
            reference: reference.to_string(),
            bundle_id: bundle.id.clone(),
            amount_minor: verification.amount_minor,
            units: bundle.units,
            status: TransactionStatus::Success,
            created_at: chrono::Utc::now(),
        };

        let outcome = self.ledger.credit(record).await?;

        Ok(ReconcileOutcome {
            credited: outcome.applied,
            units_credited: if outcome.applied { bundle.units } else { 0 },
            new_balance: outcome.new_balance,
            already_processed: !outcome.applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::gateway::test::MockPaymentGateway;
    use super::*;
    use crate::error::TextLedgerError;
    use crate::ledger::{
        InMemoryOrganizationStore, InMemoryTransactionStore, Organization,
    };
    use std::sync::Arc;

    type TestReconciler =
        PaymentReconciler<MockPaymentGateway, InMemoryOrganizationStore, InMemoryTransactionStore>;

    fn catalog() -> BundleCatalog {
        BundleCatalog::builder()
            .bundle("starter", 1_000, 50)
            .bundle("business", 5_000, 300)
            .build()
    }

    fn setup() -> (TestReconciler, MockPaymentGateway, InMemoryOrganizationStore) {
        let orgs = InMemoryOrganizationStore::new();
        orgs.seed(Organization::new("org_1"));
        let gateway = MockPaymentGateway::new();
        let ledger = CreditLedger::new(orgs.clone(), orgs.transaction_store());
        let reconciler = PaymentReconciler::new(gateway.clone(), ledger, catalog());
        (reconciler, gateway, orgs)
    }

    fn verification(status: &str, amount: u64, bundle_id: &str) -> PaymentVerification {
        PaymentVerification {
            status: status.to_string(),
            amount_minor: amount,
            metadata: serde_json::json!({
                "bundle_id": bundle_id,
                "organization_id": "org_1",
            }),
        }
    }

    #[tokio::test]
    async fn test_successful_reconciliation_credits_once() {
        let (reconciler, gateway, orgs) = setup();
        gateway.set_verification("ref-123", verification("success", 1_000, "starter"));

        let outcome = reconciler.reconcile("ref-123").await.unwrap();
        assert!(outcome.credited);
        assert_eq!(outcome.units_credited, 50);
        assert_eq!(outcome.new_balance, 50);
        assert!(!outcome.already_processed);

        let org = orgs.get("org_1").unwrap();
        assert_eq!(org.sms_balance, 50);
        assert_eq!(org.total_purchased, 50);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let (reconciler, gateway, orgs) = setup();
        gateway.set_verification("ref-123", verification("success", 1_000, "starter"));

        reconciler.reconcile("ref-123").await.unwrap();

        // Redirect callback and webhook both fire for one payment.
        let second = reconciler.reconcile("ref-123").await.unwrap();
        assert!(!second.credited);
        assert_eq!(second.units_credited, 0);
        assert_eq!(second.new_balance, 50);
        assert!(second.already_processed);

        assert_eq!(orgs.get("org_1").unwrap().sms_balance, 50);
    }

    #[tokio::test]
    async fn test_failed_verification_does_not_touch_ledger() {
        let (reconciler, gateway, orgs) = setup();
        gateway.set_verification("ref-bad", verification("abandoned", 1_000, "starter"));

        let err = reconciler.reconcile("ref-bad").await.unwrap_err();
        match err {
            TextLedgerError::Forbidden(msg) => {
                assert!(msg.contains("ref-bad"));
                assert!(msg.contains("abandoned"));
            }
            other => panic!("expected Forbidden, got {:?}", other),
        }
        assert_eq!(orgs.get("org_1").unwrap().sms_balance, 0);
    }

    #[tokio::test]
    async fn test_unknown_bundle_is_rejected() {
        let (reconciler, gateway, orgs) = setup();
        gateway.set_verification("ref-x", verification("success", 9_999, "mystery"));

        let err = reconciler.reconcile("ref-x").await.unwrap_err();
        assert!(matches!(err, TextLedgerError::BadRequest(_)));
        assert_eq!(orgs.get("org_1").unwrap().sms_balance, 0);
    }

    #[tokio::test]
    async fn test_missing_bundle_metadata_is_rejected() {
        let (reconciler, gateway, _) = setup();
        gateway.set_verification(
            "ref-y",
            PaymentVerification {
                status: "success".to_string(),
                amount_minor: 1_000,
                metadata: serde_json::json!({}),
            },
        );

        let err = reconciler.reconcile("ref-y").await.unwrap_err();
        assert!(matches!(err, TextLedgerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_catalog_units_trusted_over_paid_amount() {
        let (reconciler, gateway, _) = setup();
        // Paid far more than the starter price; units still come from the catalog.
        gateway.set_verification("ref-z", verification("success", 999_999, "starter"));

        let outcome = reconciler.reconcile("ref-z").await.unwrap();
        assert_eq!(outcome.units_credited, 50);
    }

    #[tokio::test]
    async fn test_initialize_purchase_embeds_metadata() {
        let (reconciler, gateway, _) = setup();

        let intent = reconciler
            .initialize_purchase("org_1", "owner@example.com", "business")
            .await
            .unwrap();
        assert!(intent.authorization_url.contains(&intent.reference));

        let calls = gateway.initialized();
        assert_eq!(calls.len(), 1);
        let (email, amount, metadata) = &calls[0];
        assert_eq!(email, "owner@example.com");
        assert_eq!(*amount, 5_000);
        assert_eq!(metadata["bundle_id"], "business");
        assert_eq!(metadata["organization_id"], "org_1");
    }

    #[tokio::test]
    async fn test_initialize_purchase_unknown_bundle() {
        let (reconciler, _, _) = setup();
        let err = reconciler
            .initialize_purchase("org_1", "owner@example.com", "mystery")
            .await
            .unwrap_err();
        assert!(matches!(err, TextLedgerError::BadRequest(_)));
    }

    /// Organization store whose combined record-and-credit write fails once,
    /// standing in for a dropped database connection.
    #[derive(Clone)]
    struct FlakyOrganizationStore {
        inner: InMemoryOrganizationStore,
        fail_next_credit: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait::async_trait]
    impl crate::ledger::OrganizationStore for FlakyOrganizationStore {
        async fn find(&self, organization_id: &str) -> crate::error::Result<Option<Organization>> {
            self.inner.find(organization_id).await
        }

        async fn save(&self, organization: &Organization) -> crate::error::Result<()> {
            self.inner.save(organization).await
        }

        async fn debit_if_sufficient(
            &self,
            organization_id: &str,
            units: u64,
        ) -> crate::error::Result<Option<u64>> {
            self.inner.debit_if_sufficient(organization_id, units).await
        }

        async fn credit_and_record(
            &self,
            record: &TransactionRecord,
        ) -> crate::error::Result<Option<u64>> {
            if self
                .fail_next_credit
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(TextLedgerError::Internal(
                    "connection reset by peer".to_string(),
                ));
            }
            self.inner.credit_and_record(record).await
        }
    }

    #[tokio::test]
    async fn test_transient_store_failure_does_not_lose_the_credit() {
        let orgs = InMemoryOrganizationStore::new();
        orgs.seed(Organization::new("org_1"));
        let flaky = FlakyOrganizationStore {
            inner: orgs.clone(),
            fail_next_credit: Arc::new(std::sync::atomic::AtomicBool::new(true)),
        };

        let gateway = MockPaymentGateway::new();
        gateway.set_verification("ref-123", verification("success", 1_000, "starter"));
        let ledger = CreditLedger::new(flaky, orgs.transaction_store());
        let reconciler = PaymentReconciler::new(gateway, ledger, catalog());

        // The first attempt fails in the store; since record and credit are
        // one write, no transaction record can be left behind.
        assert!(reconciler.reconcile("ref-123").await.is_err());
        assert_eq!(orgs.get("org_1").unwrap().sms_balance, 0);

        // The retry therefore credits the full bundle.
        let outcome = reconciler.reconcile("ref-123").await.unwrap();
        assert!(outcome.credited);
        assert!(!outcome.already_processed);
        assert_eq!(outcome.units_credited, 50);
        assert_eq!(outcome.new_balance, 50);
    }

    #[tokio::test]
    async fn test_concurrent_reconciliations_credit_once() {
        let (reconciler, gateway, orgs) = setup();
        gateway.set_verification("ref-race", verification("success", 1_000, "starter"));
        let reconciler = Arc::new(reconciler);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let reconciler = Arc::clone(&reconciler);
            handles.push(tokio::spawn(async move {
                reconciler.reconcile("ref-race").await.unwrap().credited
            }));
        }

        let mut credited = 0;
        for handle in handles {
            if handle.await.unwrap() {
                credited += 1;
            }
        }

        assert_eq!(credited, 1);
        assert_eq!(orgs.get("org_1").unwrap().sms_balance, 50);
    }
}
