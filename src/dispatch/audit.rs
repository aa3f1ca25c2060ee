//! Append-only audit trail for SMS delivery attempts.
//!
//! One entry per (recipient, send attempt); entries are never updated or
//! deleted. Implement [`SmsLogStore`] to persist entries to your database; a
//! tracing-backed logger and an in-memory store are provided.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Delivery status recorded for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The gateway accepted the batch containing this recipient.
    Sent,
    /// The gateway rejected the batch or the call failed.
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit entry for one recipient in one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsLogEntry {
    /// Receipt or other caller-supplied context identifier.
    pub context_id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Normalized recipient number.
    pub phone_number: String,
    /// Message body as sent.
    pub message: String,
    /// Units charged for this recipient (0 on failure).
    pub units_used: u64,
    /// Outcome of the attempt.
    pub status: DeliveryStatus,
    /// Raw gateway response for the batch.
    pub gateway_response: String,
    /// When the attempt happened.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for audit log persistence.
///
/// Implementations only ever append; there is no update or delete surface.
#[async_trait]
pub trait SmsLogStore: Send + Sync {
    /// Append a batch of entries.
    async fn append_many(&self, entries: Vec<SmsLogEntry>) -> Result<()>;
}

/// Audit store that emits entries as `tracing` events instead of persisting.
///
/// Useful in development, or alongside a persistent store in composition.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSmsLogStore;

#[async_trait]
impl SmsLogStore for TracingSmsLogStore {
    async fn append_many(&self, entries: Vec<SmsLogEntry>) -> Result<()> {
        for entry in entries {
            tracing::info!(
                target: "textledger::audit",
                organization_id = %entry.organization_id,
                phone_number = %entry.phone_number,
                status = %entry.status,
                units_used = entry.units_used,
                context_id = %entry.context_id,
                "sms delivery attempt"
            );
        }
        Ok(())
    }
}

/// In-memory audit store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Captures appended entries for assertions.
    #[derive(Default, Clone)]
    pub struct InMemorySmsLogStore {
        entries: Arc<Mutex<Vec<SmsLogEntry>>>,
    }

    impl InMemorySmsLogStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All appended entries, in order.
        pub fn entries(&self) -> Vec<SmsLogEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SmsLogStore for InMemorySmsLogStore {
        async fn append_many(&self, entries: Vec<SmsLogEntry>) -> Result<()> {
            self.entries.lock().unwrap().extend(entries);
            Ok(())
        }
    }
}
