//! Dispatch orchestration for SMS sends.
//!
//! Ties the unit calculator, credit ledger, gateway client, and audit log
//! together. The load-bearing ordering lives here: balance check, then
//! gateway call, then debit — the ledger is only ever charged after the
//! gateway confirms acceptance.
//!
//! # Example
//!
//! ```rust,ignore
//! use textledger::dispatch::{SmsDispatcher, DispatchRequest};
//!
//! let dispatcher = SmsDispatcher::new(ledger, gateway, log_store);
//!
//! let outcome = dispatcher
//!     .dispatch(DispatchRequest {
//!         organization_id: "org_1".into(),
//!         context_id: "receipt_42".into(),
//!         recipients: vec!["0241234567".into()],
//!         message: "Thanks for your purchase!".into(),
//!     })
//!     .await?;
//! ```

pub mod audit;

pub use audit::{DeliveryStatus, SmsLogEntry, SmsLogStore, TracingSmsLogStore};

#[cfg(any(test, feature = "test-support"))]
pub use audit::test::InMemorySmsLogStore;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmsError};
use crate::gateway::{SmsBatch, SmsGatewayClient};
use crate::ledger::{CreditLedger, OrganizationStore, TransactionStore};
use crate::phone::PhoneRules;
use crate::units::{self, SmsQuote};

/// A request to send one message to a set of recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Tenant whose balance is charged.
    pub organization_id: String,
    /// Receipt or other caller context recorded in the audit trail.
    pub context_id: String,
    /// Raw recipient numbers as entered by the user.
    pub recipients: Vec<String>,
    /// Message body.
    pub message: String,
}

/// Structured outcome of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Whether the gateway accepted the batch.
    pub success: bool,
    /// Whether the balance was debited. False when the gateway rejected the
    /// batch, and in the rare case where a concurrent dispatch drained the
    /// balance while this batch was in flight.
    pub charged: bool,
    /// Recipients the batch was sent to (0 on failure).
    pub sent_count: usize,
    /// Units debited (0 when the balance was not charged).
    pub units_used: u64,
    /// Balance after the operation.
    pub remaining_balance: u64,
    /// Count of recipients dropped by phone validation, reported separately
    /// from delivery failures.
    pub invalid_numbers: usize,
    /// Gateway error detail on failure.
    pub error: Option<String>,
}

/// Orchestrates validation, balance enforcement, the gateway call, the debit,
/// and the audit trail for one send.
pub struct SmsDispatcher<O, T, G, L> {
    ledger: CreditLedger<O, T>,
    gateway: G,
    log: L,
    phone_rules: PhoneRules,
}

impl<O, T, G, L> SmsDispatcher<O, T, G, L>
where
    O: OrganizationStore,
    T: TransactionStore,
    G: SmsGatewayClient,
    L: SmsLogStore,
{
    /// Create a dispatcher with default phone rules.
    #[must_use]
    pub fn new(ledger: CreditLedger<O, T>, gateway: G, log: L) -> Self {
        Self {
            ledger,
            gateway,
            log,
            phone_rules: PhoneRules::default(),
        }
    }

    /// Override the phone normalization rules.
    #[must_use]
    pub fn with_phone_rules(mut self, rules: PhoneRules) -> Self {
        self.phone_rules = rules;
        self
    }

    /// Quote the cost of a send against the organization's live balance.
    pub async fn quote(
        &self,
        organization_id: &str,
        message: &str,
        recipient_count: u32,
    ) -> Result<SmsQuote> {
        let balance = self.ledger.balance(organization_id).await?;
        Ok(units::quote(message, recipient_count, balance))
    }

    /// Send a message to every valid recipient, charging the balance only on
    /// confirmed gateway success.
    ///
    /// # Errors
    ///
    /// Validation failures (`InvalidRequest`, `MissingSenderId`,
    /// `NoValidRecipients`) and `InsufficientBalance` are returned before any
    /// external call or audit entry. Gateway failures are not errors: they
    /// come back as an unsuccessful [`DispatchOutcome`]. Store failures
    /// propagate, since no consistent decision can be made without the store.
    ///
    /// When a concurrent dispatch drains the balance between the pre-check
    /// and the debit, the gateway has already accepted the batch: the audit
    /// trail still gets one entry per recipient and the outcome reports the
    /// send with `charged = false` rather than an error.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome> {
        // Fail fast before touching balance or gateway.
        if request.message.trim().is_empty() {
            return Err(SmsError::InvalidRequest {
                reason: "message must not be empty".to_string(),
            }
            .into());
        }
        if request.recipients.is_empty() {
            return Err(SmsError::InvalidRequest {
                reason: "at least one recipient is required".to_string(),
            }
            .into());
        }

        let organization = self
            .ledger
            .organizations()
            .find(&request.organization_id)
            .await?
            .ok_or_else(|| {
                crate::error::TextLedgerError::NotFound(format!(
                    "organization '{}'",
                    request.organization_id
                ))
            })?;

        let sender_id = organization
            .sender_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SmsError::MissingSenderId {
                organization_id: request.organization_id.clone(),
            })?
            .to_string();

        // Invalid numbers are dropped, not fatal to the batch.
        let supplied = request.recipients.len();
        let valid: Vec<String> = request
            .recipients
            .iter()
            .filter(|r| self.phone_rules.is_valid(r))
            .map(|r| self.phone_rules.normalize(r))
            .collect();
        let invalid_numbers = supplied - valid.len();

        if valid.is_empty() {
            return Err(SmsError::NoValidRecipients { supplied }.into());
        }

        let pages = u64::from(units::pages_for_message(&request.message));
        let recipient_count =
            u32::try_from(valid.len()).map_err(|_| SmsError::InvalidRequest {
                reason: format!("too many recipients: {}", valid.len()),
            })?;
        let units_needed = units::units_needed(&request.message, recipient_count);

        let available = self.ledger.balance(&request.organization_id).await?;
        if available < units_needed {
            return Err(SmsError::InsufficientBalance {
                required: units_needed,
                available,
                shortfall: units_needed - available,
            }
            .into());
        }

        tracing::debug!(
            target: "textledger::dispatch",
            organization_id = %request.organization_id,
            recipients = valid.len(),
            invalid_numbers,
            units_needed,
            "dispatching batch"
        );

        let batch = SmsBatch {
            recipients: valid.clone(),
            message: request.message.clone(),
            sender_id,
        };
        let gateway_result = self.gateway.send(&batch).await;

        let now = chrono::Utc::now();
        let sent_entries = |units_per_entry: u64| -> Vec<SmsLogEntry> {
            valid
                .iter()
                .map(|phone| SmsLogEntry {
                    context_id: request.context_id.clone(),
                    organization_id: request.organization_id.clone(),
                    phone_number: phone.clone(),
                    message: request.message.clone(),
                    units_used: units_per_entry,
                    status: DeliveryStatus::Sent,
                    gateway_response: gateway_result.raw_response.clone(),
                    created_at: now,
                })
                .collect()
        };

        if gateway_result.success {
            // Debit only after confirmed success. The store-side conditional
            // update keeps a concurrent dispatch from racing this one below
            // zero; the pre-check above makes that window narrow.
            let debit = self.ledger.debit(&request.organization_id, units_needed).await;
            let (charged, remaining_balance, error) = match debit {
                Ok(balance) => (true, balance, None),
                Err(crate::error::TextLedgerError::Forbidden(detail)) => {
                    // A concurrent dispatch drained the balance while this
                    // batch was in flight. The gateway already accepted it,
                    // so the send stands and goes uncharged.
                    tracing::error!(
                        target: "textledger::dispatch",
                        organization_id = %request.organization_id,
                        sent = valid.len(),
                        %detail,
                        "batch sent but the balance could not be charged"
                    );
                    let balance = self.ledger.balance(&request.organization_id).await?;
                    (
                        false,
                        balance,
                        Some(format!(
                            "batch sent but the balance could not be charged: {}",
                            detail
                        )),
                    )
                }
                Err(other) => {
                    // Store failure with the charge state unknown: the send
                    // still gets its audit entries before the error surfaces.
                    self.log.append_many(sent_entries(0)).await?;
                    return Err(other);
                }
            };

            let units_used = if charged { units_needed } else { 0 };
            self.log
                .append_many(sent_entries(if charged { pages } else { 0 }))
                .await?;

            if charged {
                tracing::info!(
                    target: "textledger::dispatch",
                    organization_id = %request.organization_id,
                    sent = valid.len(),
                    units_used,
                    remaining_balance,
                    "batch sent"
                );
            }

            Ok(DispatchOutcome {
                success: true,
                charged,
                sent_count: valid.len(),
                units_used,
                remaining_balance,
                invalid_numbers,
                error,
            })
        } else {
            // No debit on failure; record the attempt with zero units.
            let entries = valid
                .iter()
                .map(|phone| SmsLogEntry {
                    context_id: request.context_id.clone(),
                    organization_id: request.organization_id.clone(),
                    phone_number: phone.clone(),
                    message: request.message.clone(),
                    units_used: 0,
                    status: DeliveryStatus::Failed,
                    gateway_response: gateway_result.raw_response.clone(),
                    created_at: now,
                })
                .collect();
            self.log.append_many(entries).await?;

            let detail = gateway_result
                .error
                .unwrap_or_else(|| "gateway rejected the batch".to_string());
            tracing::warn!(
                target: "textledger::dispatch",
                organization_id = %request.organization_id,
                recipients = valid.len(),
                error = %detail,
                "batch failed, balance not charged"
            );

            Ok(DispatchOutcome {
                success: false,
                charged: false,
                sent_count: 0,
                units_used: 0,
                remaining_balance: available,
                invalid_numbers,
                error: Some(format!("{} (balance was not charged)", detail)),
            })
        }
    }
}
