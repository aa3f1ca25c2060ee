//! Payment gateway client.
//!
//! Covers the two calls the credit ledger depends on: initializing a checkout
//! for a bundle purchase and verifying a completed payment by reference. The
//! live client retries transient failures (429, 5xx, timeouts) with
//! exponential backoff.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, SmsError};

/// A started checkout: where to send the payer, and the reference that later
/// keys reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutIntent {
    /// URL the payer completes the purchase at.
    pub authorization_url: String,
    /// Unique payment reference, the idempotency key for reconciliation.
    pub reference: String,
}

/// Result of verifying a payment by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentVerification {
    /// Gateway-reported status ("success", "failed", "abandoned", ...).
    pub status: String,
    /// Amount paid in minor currency units.
    pub amount_minor: u64,
    /// Metadata echoed back from checkout initialization.
    pub metadata: serde_json::Value,
}

impl PaymentVerification {
    /// Whether the gateway reports the payment as successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Trait for payment gateway API operations.
#[async_trait]
pub trait PaymentGatewayClient: Send + Sync {
    /// Start a checkout for `amount_minor`, attaching `metadata` to be echoed
    /// back at verification time.
    async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: u64,
        metadata: serde_json::Value,
    ) -> Result<CheckoutIntent>;

    /// Verify a completed payment by its reference.
    async fn verify_transaction(&self, reference: &str) -> Result<PaymentVerification>;
}

// ============================================================================
// Live client
// ============================================================================

/// Error returned when the secret key fails format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSecretKeyError {
    /// Description of why the key is invalid.
    pub reason: String,
}

impl std::fmt::Display for InvalidSecretKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid payment gateway secret key: {}", self.reason)
    }
}

impl std::error::Error for InvalidSecretKeyError {}

fn validate_secret_key(key: &str) -> std::result::Result<(), InvalidSecretKeyError> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.is_empty() {
        return Err(InvalidSecretKeyError {
            reason: "secret key cannot be empty".to_string(),
        });
    }
    if key.len() < MIN_KEY_LENGTH {
        return Err(InvalidSecretKeyError {
            reason: format!("secret key too short (minimum {} characters)", MIN_KEY_LENGTH),
        });
    }
    if !key.starts_with("sk_test_") && !key.starts_with("sk_live_") {
        return Err(InvalidSecretKeyError {
            reason: "secret key must start with sk_test_ or sk_live_".to_string(),
        });
    }
    Ok(())
}

/// Configuration for the live payment gateway client.
#[derive(Debug, Clone)]
pub struct PaymentGatewayConfig {
    /// API base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Maximum retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for PaymentGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.paystack.co".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl PaymentGatewayConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set maximum retry attempts.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Live payment gateway client.
///
/// The secret key is validated on construction and stored as a
/// [`SecretString`], so it never appears in debug output.
#[derive(Clone)]
pub struct LivePaymentGateway {
    config: PaymentGatewayConfig,
    secret_key: SecretString,
    client: reqwest::Client,
}

impl LivePaymentGateway {
    /// Create a new live client.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret key format is invalid.
    pub fn new(
        secret_key: impl Into<SecretString>,
        config: PaymentGatewayConfig,
    ) -> std::result::Result<Self, InvalidSecretKeyError> {
        let secret_key: SecretString = secret_key.into();
        validate_secret_key(secret_key.expose_secret())?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("textledger")
            .build()
            .unwrap_or_default();

        Ok(Self {
            config,
            secret_key,
            client,
        })
    }

    /// Create a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret key format is invalid.
    pub fn with_default_config(
        secret_key: impl Into<SecretString>,
    ) -> std::result::Result<Self, InvalidSecretKeyError> {
        Self::new(secret_key, PaymentGatewayConfig::default())
    }

    /// Check if the client is using a test mode key.
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.expose_secret().starts_with("sk_test_")
    }

    async fn execute_with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
        T: for<'de> Deserialize<'de>,
    {
        let mut attempts = 0;

        loop {
            match call().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            SmsError::PaymentApiError {
                                operation: operation.to_string(),
                                message: format!("malformed response body: {}", e),
                                http_status: Some(status.as_u16()),
                            }
                            .into()
                        });
                    }

                    let retryable =
                        status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempts >= self.config.max_retries {
                        let body = response.text().await.unwrap_or_default();
                        return Err(SmsError::PaymentApiError {
                            operation: operation.to_string(),
                            message: body,
                            http_status: Some(status.as_u16()),
                        }
                        .into());
                    }

                    tracing::warn!(
                        target: "textledger::payments",
                        operation,
                        attempt = attempts + 1,
                        http_status = status.as_u16(),
                        "retrying payment gateway call"
                    );
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if !retryable || attempts >= self.config.max_retries {
                        return Err(SmsError::PaymentApiError {
                            operation: operation.to_string(),
                            message: e.to_string(),
                            http_status: e.status().map(|s| s.as_u16()),
                        }
                        .into());
                    }

                    tracing::warn!(
                        target: "textledger::payments",
                        operation,
                        attempt = attempts + 1,
                        error = %e,
                        "retrying payment gateway call"
                    );
                }
            }

            let delay = (self.config.base_delay_ms * 2u64.pow(attempts))
                .min(self.config.max_delay_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempts += 1;
        }
    }
}

impl std::fmt::Debug for LivePaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePaymentGateway")
            .field("config", &self.config)
            .field("is_test_mode", &self.is_test_mode())
            .finish_non_exhaustive()
    }
}

/// Gateway envelope: `{"status": bool, "message": ..., "data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: u64,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl<T> Envelope<T> {
    fn into_data(self, operation: &str) -> Result<T> {
        if !self.status {
            return Err(SmsError::PaymentApiError {
                operation: operation.to_string(),
                message: self.message,
                http_status: None,
            }
            .into());
        }
        self.data.ok_or_else(|| {
            SmsError::PaymentApiError {
                operation: operation.to_string(),
                message: "response envelope missing data".to_string(),
                http_status: None,
            }
            .into()
        })
    }
}

#[async_trait]
impl PaymentGatewayClient for LivePaymentGateway {
    async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: u64,
        metadata: serde_json::Value,
    ) -> Result<CheckoutIntent> {
        let url = format!("{}/transaction/initialize", self.config.base_url);
        let body = serde_json::json!({
            "email": email,
            "amount": amount_minor,
            "metadata": metadata,
        });

        let envelope: Envelope<InitializeData> = self
            .execute_with_retry("initialize_transaction", || {
                self.client
                    .post(&url)
                    .bearer_auth(self.secret_key.expose_secret())
                    .json(&body)
                    .send()
            })
            .await?;

        let data = envelope.into_data("initialize_transaction")?;
        Ok(CheckoutIntent {
            authorization_url: data.authorization_url,
            reference: data.reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> Result<PaymentVerification> {
        let url = format!("{}/transaction/verify/{}", self.config.base_url, reference);

        let envelope: Envelope<VerifyData> = self
            .execute_with_retry("verify_transaction", || {
                self.client
                    .get(&url)
                    .bearer_auth(self.secret_key.expose_secret())
                    .send()
            })
            .await?;

        let data = envelope.into_data("verify_transaction")?;
        Ok(PaymentVerification {
            status: data.status,
            amount_minor: data.amount,
            metadata: data.metadata,
        })
    }
}

/// Mock payment gateway for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Scripted mock payment gateway.
    #[derive(Default, Clone)]
    pub struct MockPaymentGateway {
        verifications: Arc<Mutex<HashMap<String, PaymentVerification>>>,
        initialized: Arc<Mutex<Vec<(String, u64, serde_json::Value)>>>,
    }

    impl MockPaymentGateway {
        /// Create an empty mock.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the verification result for a reference.
        pub fn set_verification(&self, reference: &str, verification: PaymentVerification) {
            self.verifications
                .lock()
                .unwrap()
                .insert(reference.to_string(), verification);
        }

        /// All initialize calls made so far.
        pub fn initialized(&self) -> Vec<(String, u64, serde_json::Value)> {
            self.initialized.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PaymentGatewayClient for MockPaymentGateway {
        async fn initialize_transaction(
            &self,
            email: &str,
            amount_minor: u64,
            metadata: serde_json::Value,
        ) -> Result<CheckoutIntent> {
            self.initialized.lock().unwrap().push((
                email.to_string(),
                amount_minor,
                metadata,
            ));
            let reference = format!("ref_{}", uuid::Uuid::new_v4());
            Ok(CheckoutIntent {
                authorization_url: format!("https://pay.example.com/{}", reference),
                reference,
            })
        }

        async fn verify_transaction(&self, reference: &str) -> Result<PaymentVerification> {
            self.verifications
                .lock()
                .unwrap()
                .get(reference)
                .cloned()
                .ok_or_else(|| {
                    SmsError::PaymentApiError {
                        operation: "verify_transaction".to_string(),
                        message: format!("unknown reference '{}'", reference),
                        http_status: Some(404),
                    }
                    .into()
                })
        }
    }
}
