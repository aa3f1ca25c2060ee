//! SMS gateway client abstraction.
//!
//! The gateway client performs exactly one outbound call per invocation (the
//! external API accepts a comma-joined recipient list) and always hands back
//! a [`GatewayResult`]: network errors, timeouts, and unparseable bodies are
//! captured as failure results, never raised as faults. Ledger and audit-log
//! updates are the dispatcher's job, not the client's.

pub mod live_client;

pub use live_client::{LiveSmsGateway, SmsGatewayConfig};

use async_trait::async_trait;

/// One outbound send: normalized recipients, message body, and the sender id
/// displayed by carriers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsBatch {
    /// Normalized international-form recipient numbers.
    pub recipients: Vec<String>,
    /// Message body.
    pub message: String,
    /// Approved sender id (max 11 characters).
    pub sender_id: String,
}

/// Normalized result of a gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResult {
    /// Whether the gateway accepted the batch.
    pub success: bool,
    /// Raw response body (or a synthesized description for transport errors).
    pub raw_response: String,
    /// Failure detail when `success` is false.
    pub error: Option<String>,
}

impl GatewayResult {
    /// Build a success result from a raw response body.
    #[must_use]
    pub fn ok(raw_response: impl Into<String>) -> Self {
        Self {
            success: true,
            raw_response: raw_response.into(),
            error: None,
        }
    }

    /// Build a failure result with a descriptive error.
    #[must_use]
    pub fn failed(raw_response: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            raw_response: raw_response.into(),
            error: Some(error.into()),
        }
    }
}

/// Trait for SMS gateway transports.
///
/// Implementations must not touch the ledger or audit log, and must convert
/// every transport-level problem into a failure [`GatewayResult`].
#[async_trait]
pub trait SmsGatewayClient: Send + Sync {
    /// Send one batch. Infallible at the type level by contract.
    async fn send(&self, batch: &SmsBatch) -> GatewayResult;
}

/// Mock gateway for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scripted mock gateway capturing every batch it is asked to send.
    #[derive(Clone)]
    pub struct MockSmsGateway {
        result: Arc<Mutex<GatewayResult>>,
        calls: Arc<Mutex<Vec<SmsBatch>>>,
    }

    impl MockSmsGateway {
        /// Mock that accepts every batch.
        #[must_use]
        pub fn succeeding() -> Self {
            Self {
                result: Arc::new(Mutex::new(GatewayResult::ok(r#"{"status":"success"}"#))),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Mock that fails every batch with the given detail.
        #[must_use]
        pub fn failing(detail: impl Into<String>) -> Self {
            let detail = detail.into();
            Self {
                result: Arc::new(Mutex::new(GatewayResult::failed(
                    detail.clone(),
                    detail,
                ))),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Replace the scripted result.
        pub fn set_result(&self, result: GatewayResult) {
            *self.result.lock().unwrap() = result;
        }

        /// All batches sent so far.
        pub fn calls(&self) -> Vec<SmsBatch> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SmsGatewayClient for MockSmsGateway {
        async fn send(&self, batch: &SmsBatch) -> GatewayResult {
            self.calls.lock().unwrap().push(batch.clone());
            self.result.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::MockSmsGateway;
    use super::*;

    #[tokio::test]
    async fn test_mock_gateway_captures_calls() {
        let gateway = MockSmsGateway::succeeding();
        let batch = SmsBatch {
            recipients: vec!["233241234567".to_string()],
            message: "hello".to_string(),
            sender_id: "RECEIPTLY".to_string(),
        };

        let result = gateway.send(&batch).await;
        assert!(result.success);

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], batch);
    }

    #[tokio::test]
    async fn test_mock_gateway_failure_carries_detail() {
        let gateway = MockSmsGateway::failing("connection timed out");
        let batch = SmsBatch {
            recipients: vec!["233241234567".to_string()],
            message: "hello".to_string(),
            sender_id: "RECEIPTLY".to_string(),
        };

        let result = gateway.send(&batch).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("connection timed out"));
    }
}
