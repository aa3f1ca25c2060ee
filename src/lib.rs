//! Textledger - SMS credit accounting and delivery core
//!
//! Textledger is the billing heart of a multi-tenant receipt-delivery SaaS:
//! it computes message cost in billing units, enforces balance sufficiency
//! before dispatch, talks to the external SMS gateway, and reconciles credit
//! purchases — with no double-charging, no negative balances, and idempotent
//! payment crediting.
//!
//! # Features
//!
//! - **Units**: deterministic segment/unit cost calculation and quoting
//! - **Ledger**: per-organization balance with atomic debit/credit contracts
//! - **Gateway**: SMS gateway client that always returns a result value
//! - **Dispatch**: balance check, gateway call, debit — in that order
//! - **Payments**: exactly-once reconciliation keyed by payment reference
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use textledger::dispatch::{DispatchRequest, SmsDispatcher};
//! use textledger::gateway::{LiveSmsGateway, SmsGatewayConfig};
//! use textledger::ledger::CreditLedger;
//!
//! #[tokio::main]
//! async fn main() {
//!     textledger::init_tracing();
//!
//!     let gateway = LiveSmsGateway::new(
//!         std::env::var("SMS_API_KEY").unwrap(),
//!         SmsGatewayConfig::new("https://sms.example.com/send"),
//!     );
//!     let ledger = CreditLedger::new(org_store, txn_store);
//!     let dispatcher = SmsDispatcher::new(ledger, gateway, log_store);
//!
//!     let outcome = dispatcher
//!         .dispatch(DispatchRequest {
//!             organization_id: "org_1".into(),
//!             context_id: "receipt_42".into(),
//!             recipients: vec!["0241234567".into()],
//!             message: "Thanks for your purchase!".into(),
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod dispatch;
mod error;
pub mod gateway;
pub mod ledger;
pub mod payments;
pub mod phone;
pub mod units;

// Re-exports for public API
pub use dispatch::{
    DeliveryStatus, DispatchOutcome, DispatchRequest, SmsDispatcher, SmsLogEntry, SmsLogStore,
    TracingSmsLogStore,
};
pub use error::{Result, SmsError, TextLedgerError};
pub use gateway::{
    GatewayResult, LiveSmsGateway, SmsBatch, SmsGatewayClient, SmsGatewayConfig,
};
pub use ledger::{
    CreditLedger, CreditOutcome, Organization, OrganizationStore, TransactionRecord,
    TransactionStatus, TransactionStore,
};
pub use payments::{
    BundleCatalog, CheckoutIntent, CreditBundle, LivePaymentGateway, PaymentGatewayClient,
    PaymentGatewayConfig, PaymentReconciler, PaymentVerification, ReconcileOutcome,
};
pub use phone::PhoneRules;
pub use units::{pages_for_message, quote, units_needed, SmsQuote, SEGMENT_SIZE};

// Test exports
#[cfg(any(test, feature = "test-support"))]
pub use dispatch::InMemorySmsLogStore;
#[cfg(any(test, feature = "test-support"))]
pub use gateway::test::MockSmsGateway;
#[cfg(any(test, feature = "test-support"))]
pub use ledger::{InMemoryOrganizationStore, InMemoryTransactionStore};
#[cfg(any(test, feature = "test-support"))]
pub use payments::MockPaymentGateway;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "textledger=debug")
/// - `TEXTLEDGER_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("TEXTLEDGER_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
